//! The application-facing switch surface
//!
//! A [`Switch`] pairs one device target with its options and transport.
//! `run` drives the connection lifecycle until cancelled; the read/write
//! surface is available while the lifecycle reports READY. Handles are cheap
//! clones sharing one state machine.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use swb_entity::{
    encode_entities, encode_updates, ActionProfileGroup, ActionProfileMember, CloneSessionEntry,
    DigestListAck, Entity, MulticastGroupEntry, PacketOut, ReadItem, TableEntry, Update,
    WriteItem,
};
use swb_proto::{stream, Transport, WriteRequest};
use swb_schema::DeviceSchema;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::events::{ChannelState, Mastership, SwitchEvent};
use crate::mux::StreamMux;
use crate::options::SwitchOptions;
use crate::streams::{DigestStream, IdleTimeoutStream, PacketStream, ReadStream};

const EVENT_CHANNEL_CAPACITY: usize = 256;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct SwitchInner {
    pub(crate) name: String,
    pub(crate) target: String,
    pub(crate) options: SwitchOptions,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) schema: Option<Arc<DeviceSchema>>,
    /// Raw capability document pushed with the pipeline config.
    pub(crate) document: Option<String>,
    pub(crate) device_blob: Bytes,
    pub(crate) state_tx: watch::Sender<ChannelState>,
    pub(crate) mastership_tx: watch::Sender<Mastership>,
    pub(crate) events_tx: broadcast::Sender<SwitchEvent>,
    /// Multiplexer of the current session, if one is open.
    pub(crate) mux: Mutex<Option<Arc<StreamMux>>>,
}

/// One switch's client handle. Clones share the same lifecycle.
#[derive(Clone)]
pub struct Switch {
    pub(crate) inner: Arc<SwitchInner>,
}

impl Switch {
    /// Build a switch client. Configuration problems (unreadable or
    /// malformed schema document, unreadable device blob) fail here, before
    /// any connection attempt.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        options: SwitchOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let document = match (&options.schema_path, &options.schema_json) {
            (Some(path), _) => Some(std::fs::read_to_string(path).map_err(|source| {
                ClientError::Schema(swb_schema::SchemaError::Io {
                    path: path.display().to_string(),
                    source,
                })
            })?),
            (None, Some(json)) => Some(json.clone()),
            (None, None) => None,
        };
        let schema = document
            .as_deref()
            .map(DeviceSchema::from_json)
            .transpose()?
            .map(Arc::new);
        let device_blob = match &options.device_blob_path {
            Some(path) => {
                Bytes::from(std::fs::read(path).map_err(|source| ClientError::BlobIo {
                    path: path.display().to_string(),
                    source,
                })?)
            }
            None => Bytes::new(),
        };

        let (state_tx, _) = watch::channel(ChannelState::Idle);
        let (mastership_tx, _) = watch::channel(Mastership::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(SwitchInner {
                name: name.into(),
                target: target.into(),
                options,
                transport,
                schema,
                document,
                device_blob,
                state_tx,
                mastership_tx,
                events_tx,
                mux: Mutex::new(None),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn target(&self) -> &str {
        &self.inner.target
    }

    pub fn device_id(&self) -> u64 {
        self.inner.options.device_id
    }

    /// Current lifecycle state snapshot.
    pub fn state(&self) -> ChannelState {
        *self.inner.state_tx.borrow()
    }

    /// Watch lifecycle state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    /// Current mastership snapshot.
    pub fn mastership(&self) -> Mastership {
        *self.inner.mastership_tx.borrow()
    }

    /// Watch mastership changes.
    pub fn watch_mastership(&self) -> watch::Receiver<Mastership> {
        self.inner.mastership_tx.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SwitchEvent> {
        self.inner.events_tx.subscribe()
    }

    /// The schema catalog, when one is configured.
    pub fn schema(&self) -> Option<Arc<DeviceSchema>> {
        self.inner.schema.clone()
    }

    /// Drive the connection lifecycle until `cancel` fires. Cancellation is
    /// safe to trigger concurrently from any task and transitions the
    /// lifecycle to SHUTDOWN.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ClientError> {
        self.inner.run_lifecycle(self.clone(), cancel).await
    }

    fn require_schema(&self) -> Result<Arc<DeviceSchema>, ClientError> {
        self.inner
            .schema
            .clone()
            .ok_or_else(|| ClientError::NoSchema(self.inner.name.clone()))
    }

    fn require_ready(&self) -> Result<(), ClientError> {
        if self.state() != ChannelState::Ready {
            return Err(ClientError::NotReady(self.inner.name.clone()));
        }
        Ok(())
    }

    fn current_mux(&self) -> Result<Arc<StreamMux>, ClientError> {
        lock(&self.inner.mux)
            .clone()
            .ok_or_else(|| ClientError::NotReady(self.inner.name.clone()))
    }

    /// Apply a batch of tagged updates.
    pub async fn write(
        &self,
        updates: impl IntoIterator<Item = impl Into<WriteItem>>,
    ) -> Result<(), ClientError> {
        self.require_ready()?;
        let schema = self.require_schema()?;
        let updates = encode_updates(updates, &schema)?;
        if updates.is_empty() {
            return Ok(());
        }
        self.inner
            .transport
            .write(WriteRequest {
                device_id: self.inner.options.device_id,
                role: self.inner.role(),
                election_id: Some(self.inner.options.election_id.to_wire()),
                updates,
            })
            .await?;
        Ok(())
    }

    /// INSERT each entity.
    pub async fn insert(
        &self,
        entities: impl IntoIterator<Item = impl Into<Entity>>,
    ) -> Result<(), ClientError> {
        self.write(entities.into_iter().map(|entity| Update::insert(entity.into())))
            .await
    }

    /// MODIFY each entity.
    pub async fn modify(
        &self,
        entities: impl IntoIterator<Item = impl Into<Entity>>,
    ) -> Result<(), ClientError> {
        self.write(entities.into_iter().map(|entity| Update::modify(entity.into())))
            .await
    }

    /// DELETE each entity.
    pub async fn delete(
        &self,
        entities: impl IntoIterator<Item = impl Into<Entity>>,
    ) -> Result<(), ClientError> {
        self.write(entities.into_iter().map(|entity| Update::delete(entity.into())))
            .await
    }

    /// Read entities matching the templates; results stream lazily.
    pub async fn read(
        &self,
        templates: impl IntoIterator<Item = impl Into<ReadItem>>,
    ) -> Result<ReadStream, ClientError> {
        self.require_ready()?;
        let schema = self.require_schema()?;
        let entities = encode_entities(templates, &schema)?;
        let batches = self
            .inner
            .transport
            .read(swb_proto::ReadRequest {
                device_id: self.inner.options.device_id,
                entities,
            })
            .await?;
        Ok(ReadStream::new(batches, schema))
    }

    /// Subscribe to packet-ins for the current session. Each call restarts
    /// the subscription; the sequence is infinite until the session drops.
    pub fn read_packets(&self) -> Result<PacketStream, ClientError> {
        let schema = self.require_schema()?;
        let mux = self.current_mux()?;
        Ok(PacketStream::new(mux.tap_packets(), schema))
    }

    /// Subscribe to digest lists for the current session.
    pub fn read_digests(&self) -> Result<DigestStream, ClientError> {
        let schema = self.require_schema()?;
        let mux = self.current_mux()?;
        Ok(DigestStream::new(mux.tap_digests(), schema))
    }

    /// Subscribe to idle-timeout notifications for the current session.
    pub fn read_idle_timeouts(&self) -> Result<IdleTimeoutStream, ClientError> {
        let schema = self.require_schema()?;
        let mux = self.current_mux()?;
        Ok(IdleTimeoutStream::new(mux.tap_idle_timeouts(), schema))
    }

    /// Inject a packet into the device's pipeline.
    pub async fn send(&self, packet: PacketOut) -> Result<(), ClientError> {
        let schema = self.require_schema()?;
        let mux = self.current_mux()?;
        mux.send(stream::StreamRequest::packet(packet.encode(&schema)?))
            .await
    }

    /// Acknowledge a received digest list.
    pub async fn ack_digest(&self, ack: DigestListAck) -> Result<(), ClientError> {
        let schema = self.require_schema()?;
        let mux = self.current_mux()?;
        mux.send(stream::StreamRequest::digest_ack(ack.encode(&schema)?))
            .await
    }

    /// Device capabilities (API version string).
    pub async fn capabilities(&self) -> Result<String, ClientError> {
        Ok(self.inner.transport.capabilities().await?)
    }

    /// Read back all programmable state and delete it: action profile
    /// groups, then members, then table entries (skipping default-action
    /// entries and const tables), then replication entries. Devices without
    /// selector support report UNIMPLEMENTED on the profile reads, which is
    /// treated as an empty result.
    pub async fn delete_all(&self) -> Result<(), ClientError> {
        let schema = self.require_schema()?;

        let groups = self
            .read_or_empty([Entity::from(ActionProfileGroup::default())])
            .await?;
        self.delete_batch(groups).await?;

        let members = self
            .read_or_empty([Entity::from(ActionProfileMember::default())])
            .await?;
        self.delete_batch(members).await?;

        let entries = self
            .read_or_empty([Entity::from(TableEntry::any())])
            .await?
            .into_iter()
            .filter(|entity| match entity {
                Entity::TableEntry(entry) => {
                    !entry.is_default_action
                        && schema
                            .tables
                            .by_name(&entry.table)
                            .map_or(true, |table| !table.is_const)
                }
                _ => true,
            })
            .collect();
        self.delete_batch(entries).await?;

        let groups = self
            .read_or_empty([Entity::from(MulticastGroupEntry::default())])
            .await?;
        self.delete_batch(groups).await?;

        let sessions = self
            .read_or_empty([Entity::from(CloneSessionEntry::default())])
            .await?;
        self.delete_batch(sessions).await?;

        Ok(())
    }

    async fn read_or_empty(
        &self,
        templates: impl IntoIterator<Item = impl Into<ReadItem>>,
    ) -> Result<Vec<Entity>, ClientError> {
        let stream = match self.read(templates).await {
            Ok(stream) => stream,
            Err(ClientError::Rpc(error)) if error.is_unimplemented() => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };
        match stream.collect_all().await {
            Ok(entities) => Ok(entities),
            Err(ClientError::Rpc(error)) if error.is_unimplemented() => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    async fn delete_batch(&self, entities: Vec<Entity>) -> Result<(), ClientError> {
        if entities.is_empty() {
            return Ok(());
        }
        self.write(entities.into_iter().map(Update::delete)).await
    }
}

impl SwitchInner {
    pub(crate) fn role(&self) -> Option<stream::Role> {
        self.options.role_name.as_ref().map(|name| stream::Role {
            name: name.clone(),
            config: self.options.role_config.clone(),
        })
    }
}

impl std::fmt::Debug for Switch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch")
            .field("name", &self.inner.name)
            .field("target", &self.inner.target)
            .field("state", &self.state())
            .finish()
    }
}
