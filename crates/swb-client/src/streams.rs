//! Lazy inbound sequences handed to the application
//!
//! Decoding is pull-based: frames sit in the per-kind queue as wire messages
//! until the consumer asks for the next item.

use std::collections::VecDeque;
use std::sync::Arc;

use swb_entity::{DigestList, Entity, IdleTimeoutNotification, PacketIn};
use swb_proto::{stream, wire, RpcError};
use swb_schema::DeviceSchema;
use tokio::sync::mpsc;

use crate::error::ClientError;

/// Entities streamed back from a read RPC.
pub struct ReadStream {
    batches: mpsc::Receiver<Result<Vec<wire::Entity>, RpcError>>,
    pending: VecDeque<wire::Entity>,
    schema: Arc<DeviceSchema>,
}

impl ReadStream {
    pub(crate) fn new(
        batches: mpsc::Receiver<Result<Vec<wire::Entity>, RpcError>>,
        schema: Arc<DeviceSchema>,
    ) -> Self {
        Self {
            batches,
            pending: VecDeque::new(),
            schema,
        }
    }

    /// Next decoded entity, or `None` once the device finishes the response.
    pub async fn next(&mut self) -> Option<Result<Entity, ClientError>> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Some(Entity::decode(&entity, &self.schema).map_err(ClientError::from));
            }
            match self.batches.recv().await? {
                Ok(batch) => self.pending.extend(batch),
                Err(error) => return Some(Err(error.into())),
            }
        }
    }

    /// Drain the whole response into memory.
    pub async fn collect_all(mut self) -> Result<Vec<Entity>, ClientError> {
        let mut entities = Vec::new();
        while let Some(entity) = self.next().await {
            entities.push(entity?);
        }
        Ok(entities)
    }
}

/// Infinite sequence of packet-ins for the current session. Ends when the
/// session drops or a newer `read_packets` call replaces it.
pub struct PacketStream {
    frames: mpsc::UnboundedReceiver<stream::PacketIn>,
    schema: Arc<DeviceSchema>,
}

impl PacketStream {
    pub(crate) fn new(
        frames: mpsc::UnboundedReceiver<stream::PacketIn>,
        schema: Arc<DeviceSchema>,
    ) -> Self {
        Self { frames, schema }
    }

    pub async fn next(&mut self) -> Option<Result<PacketIn, ClientError>> {
        let frame = self.frames.recv().await?;
        Some(PacketIn::decode(&frame, &self.schema).map_err(ClientError::from))
    }
}

/// Infinite sequence of digest lists for the current session.
pub struct DigestStream {
    frames: mpsc::UnboundedReceiver<stream::DigestList>,
    schema: Arc<DeviceSchema>,
}

impl DigestStream {
    pub(crate) fn new(
        frames: mpsc::UnboundedReceiver<stream::DigestList>,
        schema: Arc<DeviceSchema>,
    ) -> Self {
        Self { frames, schema }
    }

    pub async fn next(&mut self) -> Option<Result<DigestList, ClientError>> {
        let frame = self.frames.recv().await?;
        Some(DigestList::decode(&frame, &self.schema).map_err(ClientError::from))
    }
}

/// Infinite sequence of idle-timeout notifications for the current session.
pub struct IdleTimeoutStream {
    frames: mpsc::UnboundedReceiver<stream::IdleTimeoutNotification>,
    schema: Arc<DeviceSchema>,
}

impl IdleTimeoutStream {
    pub(crate) fn new(
        frames: mpsc::UnboundedReceiver<stream::IdleTimeoutNotification>,
        schema: Arc<DeviceSchema>,
    ) -> Self {
        Self { frames, schema }
    }

    pub async fn next(&mut self) -> Option<Result<IdleTimeoutNotification, ClientError>> {
        let frame = self.frames.recv().await?;
        Some(IdleTimeoutNotification::decode(&frame, &self.schema).map_err(ClientError::from))
    }
}
