//! Client error types

use swb_proto::{RpcError, StatusCode};
use thiserror::Error;

/// Errors surfaced by the switch client and controller.
///
/// Transport and arbitration failures are normally consumed by the lifecycle
/// state machine (they become TRANSIENT_FAILURE and a reconnect); they only
/// reach the application through explicit calls like `write` and `read`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Codec(#[from] swb_entity::CodecError),

    #[error(transparent)]
    Schema(#[from] swb_schema::SchemaError),

    #[error("switch '{0}' is not ready")]
    NotReady(String),

    #[error("switch '{0}' has no schema configured")]
    NoSchema(String),

    #[error("failed to read device blob '{path}': {source}")]
    BlobIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("stream closed by peer")]
    StreamClosed,

    #[error("arbitration rejected: {code:?}: {message}")]
    ArbitrationRejected { code: StatusCode, message: String },

    #[error("pipeline cookie mismatch: pushed {pushed:#x}, device acknowledged {acked:#x}")]
    CookieMismatch { pushed: u64, acked: u64 },

    #[error("device has no pipeline config to verify against")]
    PipelineUnavailable,

    #[error("duplicate switch name '{0}'")]
    DuplicateSwitchName(String),

    #[error("gave up after {0} failed connection attempts")]
    RetriesExhausted(u32),

    #[error("switch task failed: {0}")]
    TaskFailed(String),
}
