//! Command intake for the wake agent
//!
//! This module handles:
//! - Filtering inbound messages to the command topic
//! - Decoding and validating command documents
//! - Running each accepted command in its own background task

mod dispatcher;
pub mod handlers;

pub use dispatcher::{CommandDispatcher, CommandResult, DispatchOutcome};
