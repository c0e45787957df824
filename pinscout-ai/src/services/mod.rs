//! Workflow services for pinscout-ai

pub mod batch_validator;
pub mod candidate_source;
pub mod classifier;
pub mod coordinator;
pub mod progress_log;
pub mod stage_runner;
pub mod verdict;
pub mod workflow_tasks;

pub use batch_validator::{BatchValidator, ValidationSummary};
pub use candidate_source::{CandidateSource, HttpCandidateSource};
pub use classifier::{Classifier, ClassifierError, OpenAiClassifier};
pub use coordinator::{PromptResults, RecoveryReport, WorkflowCoordinator, WorkflowSettings};
pub use progress_log::{ProgressLog, StageLog};
pub use stage_runner::{StageOutcome, StageReport, StageRunner};
pub use workflow_tasks::{RunHandle, RunOutcome, RunStatus, WorkflowTasks};
