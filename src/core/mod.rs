//! Core types shared across APM subsystems.

pub mod error;

pub use error::{ApmError, ErrorContext, user_friendly_error};
