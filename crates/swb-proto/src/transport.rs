//! The injected transport seam
//!
//! The client core is written against [`Transport`] and never touches a
//! socket. A production implementation wraps an RPC channel; `swb-sim`
//! provides an in-memory device for tests and demos.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::error::RpcError;
use crate::stream::{StreamRequest, StreamResponse, Uint128};
use crate::wire;

/// Channel connectivity as reported by the transport. The lifecycle state
/// machine owns its own state; this is only the raw signal that drives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

/// A batch of tagged entities to apply atomically.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteRequest {
    pub device_id: u64,
    pub role: Option<crate::stream::Role>,
    pub election_id: Option<Uint128>,
    pub updates: Vec<wire::Update>,
}

/// Wildcard-capable read template batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadRequest {
    pub device_id: u64,
    pub entities: Vec<wire::Entity>,
}

/// The forwarding-program artifact pushed to a device before programming it:
/// an opaque version cookie, the capability document the schema catalog is
/// built from, and the compiled device blob.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForwardingPipelineConfig {
    pub cookie: u64,
    pub document: String,
    pub device_data: Bytes,
}

/// Outbound sink plus inbound sequence for one open stream.
pub type StreamPair = (
    mpsc::Sender<StreamRequest>,
    mpsc::Receiver<StreamResponse>,
);

/// Bidirectional-streaming RPC transport to one device.
///
/// Unary calls return a result or a typed [`RpcError`]; `read` yields a lazy
/// sequence of entity batches; `open_stream` hands back the outbound sink and
/// the inbound frame sequence; `connectivity` is a watchable snapshot of the
/// underlying channel state.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the channel. Idempotent; returns once the channel is usable.
    async fn connect(&self) -> Result<(), RpcError>;

    /// Watch channel state changes.
    fn connectivity(&self) -> watch::Receiver<Connectivity>;

    /// Open the bidirectional stream. At most one stream is open per
    /// transport at a time; opening again after a drop replaces it.
    async fn open_stream(&self) -> Result<StreamPair, RpcError>;

    async fn write(&self, request: WriteRequest) -> Result<(), RpcError>;

    /// Issue a read; batches arrive on the returned channel until the
    /// device finishes the response stream.
    async fn read(
        &self,
        request: ReadRequest,
    ) -> Result<mpsc::Receiver<Result<Vec<wire::Entity>, RpcError>>, RpcError>;

    /// Push a pipeline config; returns the device's acknowledgement cookie.
    async fn set_pipeline_config(
        &self,
        device_id: u64,
        election_id: Uint128,
        config: ForwardingPipelineConfig,
    ) -> Result<u64, RpcError>;

    /// Fetch the active pipeline config, if the device has one.
    async fn get_pipeline_config(
        &self,
        device_id: u64,
    ) -> Result<Option<ForwardingPipelineConfig>, RpcError>;

    /// Protocol/API version advertised by the device.
    async fn capabilities(&self) -> Result<String, RpcError>;
}
