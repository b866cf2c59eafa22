//! The simulated device
//!
//! A `SimSwitch` is one in-memory device: an entity store, a pipeline-config
//! slot, and an arbitration registry over the currently open streams. Every
//! behavior a test needs to provoke (unreachable targets, dropped
//! connections, devices without selector support, skewed config
//! acknowledgements) is a toggle on the device.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use swb_proto::stream::{
    DigestListAck, MasterArbitrationUpdate, PacketIn, PacketOut, Role, Status, StreamResponse,
    Uint128,
};
use swb_proto::{wire, ForwardingPipelineConfig, RpcError, StatusCode};
use tokio::sync::mpsc;
use tracing::debug;

pub(crate) const RESPONSE_CAPACITY: usize = 256;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ClientConn {
    pub id: u64,
    pub election_id: Option<u128>,
    pub role: Option<String>,
    pub sender: mpsc::Sender<StreamResponse>,
}

#[derive(Default)]
pub(crate) struct DeviceState {
    pub reachable: bool,
    pub selector_support: bool,
    pub ack_cookie_offset: u64,
    pub pipeline: Option<ForwardingPipelineConfig>,
    pub tables: Vec<wire::TableEntry>,
    pub members: Vec<wire::ActionProfileMember>,
    pub groups: Vec<wire::ActionProfileGroup>,
    pub multicast: Vec<wire::MulticastGroupEntry>,
    pub clones: Vec<wire::CloneSessionEntry>,
    pub digest_entries: Vec<wire::DigestEntry>,
    pub value_sets: Vec<wire::ValueSetEntry>,
    pub registers: Vec<wire::RegisterEntry>,
    pub packet_outs: Vec<PacketOut>,
    pub digest_acks: Vec<DigestListAck>,
    pub clients: Vec<ClientConn>,
    pub next_client: u64,
}

pub(crate) struct Shared {
    pub device_id: u64,
    pub state: Mutex<DeviceState>,
}

/// One simulated switch device. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct SimSwitch {
    pub(crate) shared: Arc<Shared>,
}

impl SimSwitch {
    pub fn new(device_id: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                device_id,
                state: Mutex::new(DeviceState {
                    reachable: true,
                    selector_support: true,
                    ..Default::default()
                }),
            }),
        }
    }

    pub fn device_id(&self) -> u64 {
        self.shared.device_id
    }

    /// A transport connected to this device. Each switch client gets its
    /// own transport.
    pub fn transport(&self) -> crate::SimTransport {
        crate::SimTransport::new(Arc::clone(&self.shared))
    }

    /// Toggle reachability: unreachable devices refuse connections and
    /// unary calls.
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.shared.state).reachable = reachable;
    }

    /// Devices without selector support answer action-profile reads with
    /// UNIMPLEMENTED.
    pub fn set_selector_support(&self, supported: bool) {
        lock(&self.shared.state).selector_support = supported;
    }

    /// Skew the pipeline acknowledgement cookie to provoke a mismatch.
    pub fn set_ack_cookie_offset(&self, offset: u64) {
        lock(&self.shared.state).ack_cookie_offset = offset;
    }

    /// Drop every open stream, as a mid-session transport loss would.
    pub fn drop_connections(&self) {
        let mut state = lock(&self.shared.state);
        debug!(clients = state.clients.len(), "dropping all connections");
        state.clients.clear();
    }

    /// Punt a packet to every connected client.
    pub fn inject_packet_in(&self, packet: PacketIn) {
        broadcast(&lock(&self.shared.state), StreamResponse::packet(packet));
    }

    /// Emit a digest list to every connected client.
    pub fn inject_digest(&self, digest: swb_proto::stream::DigestList) {
        broadcast(&lock(&self.shared.state), StreamResponse::digest(digest));
    }

    /// Emit an idle-timeout notification to every connected client.
    pub fn inject_idle_timeout(&self, notification: swb_proto::stream::IdleTimeoutNotification) {
        let frame = StreamResponse {
            idle_timeout_notification: Some(notification),
            ..Default::default()
        };
        broadcast(&lock(&self.shared.state), frame);
    }

    /// Snapshot of the programmed table entries.
    pub fn table_entries(&self) -> Vec<wire::TableEntry> {
        lock(&self.shared.state).tables.clone()
    }

    /// Packets injected by clients, in arrival order.
    pub fn packet_outs(&self) -> Vec<PacketOut> {
        lock(&self.shared.state).packet_outs.clone()
    }

    /// Digest acknowledgements received from clients.
    pub fn digest_acks(&self) -> Vec<DigestListAck> {
        lock(&self.shared.state).digest_acks.clone()
    }

    /// Cookie of the active pipeline config, if one was pushed.
    pub fn pipeline_cookie(&self) -> Option<u64> {
        lock(&self.shared.state)
            .pipeline
            .as_ref()
            .map(|config| config.cookie)
    }

    /// The election id of the current primary, if any client arbitrated.
    pub fn primary_election_id(&self) -> Option<u128> {
        primary_id(&lock(&self.shared.state))
    }
}

pub(crate) fn broadcast(state: &DeviceState, frame: StreamResponse) {
    for client in &state.clients {
        let _ = client.sender.try_send(frame.clone());
    }
}

pub(crate) fn primary_id(state: &DeviceState) -> Option<u128> {
    state
        .clients
        .iter()
        .filter_map(|client| client.election_id)
        .max()
}

/// Recompute mastership and notify every arbitrated client of the outcome.
pub(crate) fn arbitrate_and_broadcast(state: &DeviceState, device_id: u64) {
    let Some(primary) = primary_id(state) else {
        return;
    };
    for client in &state.clients {
        let Some(election_id) = client.election_id else {
            continue;
        };
        let is_primary = election_id == primary;
        let update = MasterArbitrationUpdate {
            device_id,
            role: client.role.as_ref().map(|name| Role {
                name: name.clone(),
                config: bytes::Bytes::new(),
            }),
            election_id: Some(uint128(primary)),
            status: Some(Status {
                code: if is_primary {
                    StatusCode::Ok.as_i32()
                } else {
                    StatusCode::AlreadyExists.as_i32()
                },
                message: if is_primary {
                    "is primary".to_string()
                } else {
                    "is backup".to_string()
                },
            }),
        };
        let _ = client.sender.try_send(StreamResponse::arbitration(update));
    }
}

pub(crate) fn uint128(value: u128) -> Uint128 {
    Uint128 {
        high: (value >> 64) as u64,
        low: value as u64,
    }
}

pub(crate) fn as_u128(value: Uint128) -> u128 {
    ((value.high as u128) << 64) | value.low as u128
}

// ---------------------------------------------------------------------------
// Entity store semantics
// ---------------------------------------------------------------------------

fn same_table_key(a: &wire::TableEntry, b: &wire::TableEntry) -> bool {
    a.table_id == b.table_id
        && a.match_fields == b.match_fields
        && a.priority == b.priority
        && a.is_default_action == b.is_default_action
}

pub(crate) fn apply_update(
    state: &mut DeviceState,
    update: &wire::Update,
) -> Result<(), RpcError> {
    let entity = &update.entity;
    if entity.populated() != 1 {
        return Err(RpcError::new(
            StatusCode::InvalidArgument,
            "update entity must populate exactly one field",
        ));
    }
    match update.kind {
        wire::UpdateKind::Insert => insert_entity(state, entity),
        wire::UpdateKind::Modify => modify_entity(state, entity),
        wire::UpdateKind::Delete => delete_entity(state, entity),
    }
}

fn insert_entity(state: &mut DeviceState, entity: &wire::Entity) -> Result<(), RpcError> {
    if let Some(entry) = &entity.table_entry {
        if state.tables.iter().any(|have| same_table_key(have, entry)) {
            return Err(already_exists("table entry"));
        }
        state.tables.push(entry.clone());
        return Ok(());
    }
    if let Some(member) = &entity.action_profile_member {
        if state
            .members
            .iter()
            .any(|have| (have.action_profile_id, have.member_id) == (member.action_profile_id, member.member_id))
        {
            return Err(already_exists("action profile member"));
        }
        state.members.push(member.clone());
        return Ok(());
    }
    if let Some(group) = &entity.action_profile_group {
        if state
            .groups
            .iter()
            .any(|have| (have.action_profile_id, have.group_id) == (group.action_profile_id, group.group_id))
        {
            return Err(already_exists("action profile group"));
        }
        state.groups.push(group.clone());
        return Ok(());
    }
    if let Some(replication) = &entity.packet_replication_engine_entry {
        if let Some(group) = &replication.multicast_group_entry {
            if state
                .multicast
                .iter()
                .any(|have| have.multicast_group_id == group.multicast_group_id)
            {
                return Err(already_exists("multicast group"));
            }
            state.multicast.push(group.clone());
            return Ok(());
        }
        if let Some(session) = &replication.clone_session_entry {
            if state
                .clones
                .iter()
                .any(|have| have.session_id == session.session_id)
            {
                return Err(already_exists("clone session"));
            }
            state.clones.push(session.clone());
            return Ok(());
        }
        return Err(malformed("packet replication entry"));
    }
    if let Some(digest) = &entity.digest_entry {
        if state
            .digest_entries
            .iter()
            .any(|have| have.digest_id == digest.digest_id)
        {
            return Err(already_exists("digest entry"));
        }
        state.digest_entries.push(digest.clone());
        return Ok(());
    }
    if let Some(value_set) = &entity.value_set_entry {
        state
            .value_sets
            .retain(|have| have.value_set_id != value_set.value_set_id);
        state.value_sets.push(value_set.clone());
        return Ok(());
    }
    if entity.register_entry.is_some() {
        return Err(RpcError::new(
            StatusCode::InvalidArgument,
            "register entries only support MODIFY",
        ));
    }
    Err(unsupported_entity())
}

fn modify_entity(state: &mut DeviceState, entity: &wire::Entity) -> Result<(), RpcError> {
    if let Some(entry) = &entity.table_entry {
        let Some(slot) = state
            .tables
            .iter_mut()
            .find(|have| same_table_key(have, entry))
        else {
            return Err(not_found("table entry"));
        };
        *slot = entry.clone();
        return Ok(());
    }
    if let Some(member) = &entity.action_profile_member {
        let Some(slot) = state.members.iter_mut().find(|have| {
            (have.action_profile_id, have.member_id) == (member.action_profile_id, member.member_id)
        }) else {
            return Err(not_found("action profile member"));
        };
        *slot = member.clone();
        return Ok(());
    }
    if let Some(group) = &entity.action_profile_group {
        let Some(slot) = state.groups.iter_mut().find(|have| {
            (have.action_profile_id, have.group_id) == (group.action_profile_id, group.group_id)
        }) else {
            return Err(not_found("action profile group"));
        };
        *slot = group.clone();
        return Ok(());
    }
    if let Some(register) = &entity.register_entry {
        state
            .registers
            .retain(|have| (have.register_id, have.index) != (register.register_id, register.index));
        state.registers.push(register.clone());
        return Ok(());
    }
    if let Some(digest) = &entity.digest_entry {
        let Some(slot) = state
            .digest_entries
            .iter_mut()
            .find(|have| have.digest_id == digest.digest_id)
        else {
            return Err(not_found("digest entry"));
        };
        *slot = digest.clone();
        return Ok(());
    }
    if let Some(value_set) = &entity.value_set_entry {
        state
            .value_sets
            .retain(|have| have.value_set_id != value_set.value_set_id);
        state.value_sets.push(value_set.clone());
        return Ok(());
    }
    if let Some(replication) = &entity.packet_replication_engine_entry {
        if let Some(group) = &replication.multicast_group_entry {
            let Some(slot) = state
                .multicast
                .iter_mut()
                .find(|have| have.multicast_group_id == group.multicast_group_id)
            else {
                return Err(not_found("multicast group"));
            };
            *slot = group.clone();
            return Ok(());
        }
        if let Some(session) = &replication.clone_session_entry {
            let Some(slot) = state
                .clones
                .iter_mut()
                .find(|have| have.session_id == session.session_id)
            else {
                return Err(not_found("clone session"));
            };
            *slot = session.clone();
            return Ok(());
        }
        return Err(malformed("packet replication entry"));
    }
    Err(unsupported_entity())
}

fn delete_entity(state: &mut DeviceState, entity: &wire::Entity) -> Result<(), RpcError> {
    if let Some(entry) = &entity.table_entry {
        let before = state.tables.len();
        state.tables.retain(|have| !same_table_key(have, entry));
        return removed(before, state.tables.len(), "table entry");
    }
    if let Some(member) = &entity.action_profile_member {
        let before = state.members.len();
        state.members.retain(|have| {
            (have.action_profile_id, have.member_id) != (member.action_profile_id, member.member_id)
        });
        return removed(before, state.members.len(), "action profile member");
    }
    if let Some(group) = &entity.action_profile_group {
        let before = state.groups.len();
        state.groups.retain(|have| {
            (have.action_profile_id, have.group_id) != (group.action_profile_id, group.group_id)
        });
        return removed(before, state.groups.len(), "action profile group");
    }
    if let Some(replication) = &entity.packet_replication_engine_entry {
        if let Some(group) = &replication.multicast_group_entry {
            let before = state.multicast.len();
            state
                .multicast
                .retain(|have| have.multicast_group_id != group.multicast_group_id);
            return removed(before, state.multicast.len(), "multicast group");
        }
        if let Some(session) = &replication.clone_session_entry {
            let before = state.clones.len();
            state
                .clones
                .retain(|have| have.session_id != session.session_id);
            return removed(before, state.clones.len(), "clone session");
        }
        return Err(malformed("packet replication entry"));
    }
    if let Some(digest) = &entity.digest_entry {
        let before = state.digest_entries.len();
        state
            .digest_entries
            .retain(|have| have.digest_id != digest.digest_id);
        return removed(before, state.digest_entries.len(), "digest entry");
    }
    if let Some(value_set) = &entity.value_set_entry {
        let before = state.value_sets.len();
        state
            .value_sets
            .retain(|have| have.value_set_id != value_set.value_set_id);
        return removed(before, state.value_sets.len(), "value set entry");
    }
    if entity.register_entry.is_some() {
        return Err(RpcError::new(
            StatusCode::InvalidArgument,
            "register entries only support MODIFY",
        ));
    }
    Err(unsupported_entity())
}

pub(crate) fn read_entities(
    state: &DeviceState,
    template: &wire::Entity,
) -> Result<Vec<wire::Entity>, RpcError> {
    if template.populated() != 1 {
        return Err(RpcError::new(
            StatusCode::InvalidArgument,
            "read template must populate exactly one field",
        ));
    }
    if let Some(wanted) = &template.table_entry {
        let exact = !wanted.match_fields.is_empty() || wanted.is_default_action;
        return Ok(state
            .tables
            .iter()
            .filter(|have| {
                if wanted.table_id != 0 && have.table_id != wanted.table_id {
                    return false;
                }
                !exact || same_table_key(have, wanted)
            })
            .map(|entry| wire::Entity {
                table_entry: Some(entry.clone()),
                ..Default::default()
            })
            .collect());
    }
    if let Some(wanted) = &template.action_profile_member {
        if !state.selector_support {
            return Err(RpcError::unimplemented(
                "action profile enumeration is not supported by this device",
            ));
        }
        return Ok(state
            .members
            .iter()
            .filter(|have| {
                wanted.action_profile_id == 0 || have.action_profile_id == wanted.action_profile_id
            })
            .map(|member| wire::Entity {
                action_profile_member: Some(member.clone()),
                ..Default::default()
            })
            .collect());
    }
    if let Some(wanted) = &template.action_profile_group {
        if !state.selector_support {
            return Err(RpcError::unimplemented(
                "action profile enumeration is not supported by this device",
            ));
        }
        return Ok(state
            .groups
            .iter()
            .filter(|have| {
                wanted.action_profile_id == 0 || have.action_profile_id == wanted.action_profile_id
            })
            .map(|group| wire::Entity {
                action_profile_group: Some(group.clone()),
                ..Default::default()
            })
            .collect());
    }
    if let Some(wanted) = &template.packet_replication_engine_entry {
        if let Some(group) = &wanted.multicast_group_entry {
            return Ok(state
                .multicast
                .iter()
                .filter(|have| {
                    group.multicast_group_id == 0
                        || have.multicast_group_id == group.multicast_group_id
                })
                .map(|entry| wire::Entity {
                    packet_replication_engine_entry: Some(wire::PacketReplicationEngineEntry {
                        multicast_group_entry: Some(entry.clone()),
                        clone_session_entry: None,
                    }),
                    ..Default::default()
                })
                .collect());
        }
        if let Some(session) = &wanted.clone_session_entry {
            return Ok(state
                .clones
                .iter()
                .filter(|have| session.session_id == 0 || have.session_id == session.session_id)
                .map(|entry| wire::Entity {
                    packet_replication_engine_entry: Some(wire::PacketReplicationEngineEntry {
                        multicast_group_entry: None,
                        clone_session_entry: Some(entry.clone()),
                    }),
                    ..Default::default()
                })
                .collect());
        }
        return Err(malformed("packet replication template"));
    }
    if let Some(wanted) = &template.digest_entry {
        return Ok(state
            .digest_entries
            .iter()
            .filter(|have| wanted.digest_id == 0 || have.digest_id == wanted.digest_id)
            .map(|entry| wire::Entity {
                digest_entry: Some(entry.clone()),
                ..Default::default()
            })
            .collect());
    }
    if let Some(wanted) = &template.value_set_entry {
        return Ok(state
            .value_sets
            .iter()
            .filter(|have| wanted.value_set_id == 0 || have.value_set_id == wanted.value_set_id)
            .map(|entry| wire::Entity {
                value_set_entry: Some(entry.clone()),
                ..Default::default()
            })
            .collect());
    }
    if let Some(wanted) = &template.register_entry {
        return Ok(state
            .registers
            .iter()
            .filter(|have| wanted.register_id == 0 || have.register_id == wanted.register_id)
            .map(|entry| wire::Entity {
                register_entry: Some(entry.clone()),
                ..Default::default()
            })
            .collect());
    }
    // Counter and meter state is not modeled; reads yield nothing.
    Ok(Vec::new())
}

fn already_exists(kind: &str) -> RpcError {
    RpcError::new(StatusCode::AlreadyExists, format!("{kind} already exists"))
}

fn not_found(kind: &str) -> RpcError {
    RpcError::new(StatusCode::NotFound, format!("{kind} not found"))
}

fn malformed(kind: &str) -> RpcError {
    RpcError::new(StatusCode::InvalidArgument, format!("malformed {kind}"))
}

fn unsupported_entity() -> RpcError {
    RpcError::new(
        StatusCode::InvalidArgument,
        "entity kind does not support writes",
    )
}

fn removed(before: usize, after: usize, kind: &str) -> Result<(), RpcError> {
    if before == after {
        Err(not_found(kind))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(table_id: u32, priority: i32) -> wire::Entity {
        wire::Entity {
            table_entry: Some(wire::TableEntry {
                table_id,
                priority,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn insert_then_duplicate_insert_fails() {
        let mut state = DeviceState::default();
        apply_update(
            &mut state,
            &wire::Update {
                kind: wire::UpdateKind::Insert,
                entity: entry(1, 0),
            },
        )
        .unwrap();
        let err = apply_update(
            &mut state,
            &wire::Update {
                kind: wire::UpdateKind::Insert,
                entity: entry(1, 0),
            },
        )
        .unwrap_err();
        assert_eq!(err.code, StatusCode::AlreadyExists);
    }

    #[test]
    fn delete_missing_entry_not_found() {
        let mut state = DeviceState::default();
        let err = apply_update(
            &mut state,
            &wire::Update {
                kind: wire::UpdateKind::Delete,
                entity: entry(1, 0),
            },
        )
        .unwrap_err();
        assert_eq!(err.code, StatusCode::NotFound);
    }

    #[test]
    fn wildcard_read_returns_every_table() {
        let mut state = DeviceState::default();
        for table_id in [1, 1, 2] {
            let mut item = entry(table_id, 0);
            // Distinguish duplicate keys by priority.
            if let Some(e) = item.table_entry.as_mut() {
                e.priority = state.tables.len() as i32;
            }
            apply_update(
                &mut state,
                &wire::Update {
                    kind: wire::UpdateKind::Insert,
                    entity: item,
                },
            )
            .unwrap();
        }
        let all = read_entities(&state, &entry(0, 0)).unwrap();
        assert_eq!(all.len(), 3);
        let scoped = read_entities(
            &state,
            &wire::Entity {
                table_entry: Some(wire::TableEntry {
                    table_id: 2,
                    priority: 2,
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(scoped.len(), 1);
    }

    #[test]
    fn empty_template_is_invalid() {
        let state = DeviceState::default();
        let err = read_entities(&state, &wire::Entity::default()).unwrap_err();
        assert_eq!(err.code, StatusCode::InvalidArgument);
    }
}
