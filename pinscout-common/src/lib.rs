//! # PinScout Common Library
//!
//! Shared code for the PinScout services:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - Workflow event types and the EventBus
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
