//! JSON codec for channel messages
//!
//! Each message travels as one text frame:
//! ```text
//! {"type": "<message kind>", ...fields}
//! ```
//!
//! Frames above [`MAX_MESSAGE_SIZE`] are refused in both directions.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::protocol::{ClientMessage, ServerMessage};

/// Maximum frame size (16 MB), large enough for a full-page screenshot
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("JSON decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("JSON encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encode a server message into a text frame
pub fn encode(message: &ServerMessage) -> Result<String, CodecError> {
    let text = serde_json::to_string(message).map_err(CodecError::Encode)?;
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(text.len()));
    }
    Ok(text)
}

/// Decode a client request from a text frame
pub fn decode(text: &str) -> Result<ClientMessage, CodecError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Decode a server message, used by clients and tests
pub fn decode_server(text: &str) -> Result<ServerMessage, CodecError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// base64 payload for a screenshot event
pub fn encode_image(png: &[u8]) -> String {
    STANDARD.encode(png)
}
