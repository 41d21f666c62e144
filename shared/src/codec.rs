//! JSON codec for the command and report channels
//!
//! Inbound documents are bounded by [`settings::MAX_COMMAND_SIZE`] and
//! outbound reports by [`settings::MAX_REPORT_PAYLOAD`], so neither side can
//! grow past the buffers the agent reserves for them.

use serde::Serialize;
use thiserror::Error;

use crate::command::Command;
use crate::settings;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {max})", max = settings::MAX_COMMAND_SIZE)]
    MessageTooLarge(usize),

    #[error("Report too large: {0} bytes (max: {max})", max = settings::MAX_REPORT_PAYLOAD)]
    ReportTooLarge(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("No integer command id")]
    MissingId,

    #[error("Command {id} is missing required field `{field}`")]
    MissingField { id: i64, field: &'static str },

    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Decode and validate an inbound command document
pub fn decode_command(payload: &[u8]) -> Result<Command, CodecError> {
    if payload.len() > settings::MAX_COMMAND_SIZE {
        return Err(CodecError::MessageTooLarge(payload.len()));
    }

    let value: serde_json::Value = serde_json::from_slice(payload)?;
    Command::from_value(value)
}

/// Serialize a report, refusing payloads that would not fit a report slot
pub fn encode_report<T: Serialize>(report: &T) -> Result<String, CodecError> {
    let payload = serde_json::to_string(report)?;

    if payload.len() > settings::MAX_REPORT_PAYLOAD {
        return Err(CodecError::ReportTooLarge(payload.len()));
    }

    Ok(payload)
}
