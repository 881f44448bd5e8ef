//! Error taxonomy (spec §7). Only [`CoreError::ConfigInvalid`] is fatal;
//! every other kind is caught by the event loop, converted, and logged —
//! processing continues on the next event.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid track/config: {0}")]
    ConfigInvalid(String),

    #[error("transient input rejected: {0}")]
    TransientInput(String),

    #[error("decoder session on {channel} desynchronised")]
    SessionDesync { channel: String },

    #[error("reorder buffer overflow")]
    QueueOverflow,

    #[error("reset rejected: authkey mismatch")]
    AuthFailure,

    #[error("raw input channel silent")]
    Restart,
}
