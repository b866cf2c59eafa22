//! Wire representation of forwarding-plane entities
//!
//! These are the id-addressed messages a device understands. Field values are
//! minimum-width big-endian byte strings; names never appear here. Containers
//! that mirror a protobuf "oneof" keep every arm as an `Option` so decoders
//! can distinguish an empty container from an over-populated one and fail
//! loudly instead of guessing.

use bytes::Bytes;

/// Top-level entity container. Exactly one field is populated on a valid
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entity {
    pub table_entry: Option<TableEntry>,
    pub action_profile_member: Option<ActionProfileMember>,
    pub action_profile_group: Option<ActionProfileGroup>,
    pub meter_entry: Option<MeterEntry>,
    pub direct_meter_entry: Option<DirectMeterEntry>,
    pub counter_entry: Option<CounterEntry>,
    pub direct_counter_entry: Option<DirectCounterEntry>,
    pub packet_replication_engine_entry: Option<PacketReplicationEngineEntry>,
    pub register_entry: Option<RegisterEntry>,
    pub digest_entry: Option<DigestEntry>,
    pub value_set_entry: Option<ValueSetEntry>,
}

impl Entity {
    /// Number of populated arms; a valid entity has exactly one.
    pub fn populated(&self) -> usize {
        [
            self.table_entry.is_some(),
            self.action_profile_member.is_some(),
            self.action_profile_group.is_some(),
            self.meter_entry.is_some(),
            self.direct_meter_entry.is_some(),
            self.counter_entry.is_some(),
            self.direct_counter_entry.is_some(),
            self.packet_replication_engine_entry.is_some(),
            self.register_entry.is_some(),
            self.digest_entry.is_some(),
            self.value_set_entry.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// One match field of a table entry. `value: None` never appears on the wire;
/// wildcarded fields are omitted from the match list entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub field_id: u32,
    pub value: Option<FieldMatchValue>,
}

/// The five match kinds a field can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatchValue {
    Exact { value: Bytes },
    Ternary { value: Bytes, mask: Bytes },
    Lpm { value: Bytes, prefix_len: u32 },
    Range { low: Bytes, high: Bytes },
    Optional { value: Bytes },
}

/// The action slot of a table entry: a direct action, a member or group
/// reference, or a one-shot weighted action set. Mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryAction {
    pub action: Option<Action>,
    pub action_profile_member_id: Option<u32>,
    pub action_profile_group_id: Option<u32>,
    pub action_profile_action_set: Option<ActionSet>,
}

impl EntryAction {
    pub fn populated(&self) -> usize {
        [
            self.action.is_some(),
            self.action_profile_member_id.is_some(),
            self.action_profile_group_id.is_some(),
            self.action_profile_action_set.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Action {
    pub action_id: u32,
    pub params: Vec<ActionParam>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionParam {
    pub param_id: u32,
    pub value: Bytes,
}

/// One-shot action set for tables bound to a selector profile.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionSet {
    pub actions: Vec<WeightedAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedAction {
    pub action: Option<Action>,
    pub weight: i32,
    pub watch_port: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableEntry {
    pub table_id: u32,
    pub match_fields: Vec<FieldMatch>,
    pub action: Option<EntryAction>,
    pub priority: i32,
    pub metadata: Bytes,
    pub is_default_action: bool,
    pub idle_timeout_ns: i64,
    pub time_since_last_hit_ns: Option<i64>,
    pub meter_config: Option<MeterConfig>,
    pub counter_data: Option<CounterData>,
    pub meter_counter_data: Option<MeterCounterData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionProfileMember {
    pub action_profile_id: u32,
    pub member_id: u32,
    pub action: Option<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionProfileGroup {
    pub action_profile_id: u32,
    pub group_id: u32,
    pub members: Vec<GroupMember>,
    pub max_size: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub member_id: u32,
    pub weight: i32,
    pub watch_port: Bytes,
}

/// Two-rate three-color marker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeterConfig {
    pub cir: i64,
    pub cburst: i64,
    pub pir: i64,
    pub pburst: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterData {
    pub byte_count: i64,
    pub packet_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeterCounterData {
    pub green: CounterData,
    pub yellow: CounterData,
    pub red: CounterData,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeterEntry {
    pub meter_id: u32,
    pub index: Option<i64>,
    pub config: Option<MeterConfig>,
    pub counter_data: Option<MeterCounterData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectMeterEntry {
    pub table_entry: Option<TableEntry>,
    pub config: Option<MeterConfig>,
    pub counter_data: Option<MeterCounterData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterEntry {
    pub counter_id: u32,
    pub index: Option<i64>,
    pub data: Option<CounterData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectCounterEntry {
    pub table_entry: Option<TableEntry>,
    pub data: Option<CounterData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterEntry {
    pub register_id: u32,
    pub index: Option<i64>,
    pub data: Option<Bytes>,
}

/// One copy of a replicated packet: egress port plus replica instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Replica {
    pub egress_port: u32,
    pub instance: u32,
}

impl From<u32> for Replica {
    /// A bare port is shorthand for instance 0.
    fn from(egress_port: u32) -> Self {
        Replica {
            egress_port,
            instance: 0,
        }
    }
}

impl From<(u32, u32)> for Replica {
    fn from((egress_port, instance): (u32, u32)) -> Self {
        Replica {
            egress_port,
            instance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MulticastGroupEntry {
    pub multicast_group_id: u32,
    pub replicas: Vec<Replica>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloneSessionEntry {
    pub session_id: u32,
    pub replicas: Vec<Replica>,
    pub class_of_service: u32,
    pub packet_length_bytes: i32,
}

/// Replication-engine container: multicast or clone, never both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketReplicationEngineEntry {
    pub multicast_group_entry: Option<MulticastGroupEntry>,
    pub clone_session_entry: Option<CloneSessionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestEntry {
    pub digest_id: u32,
    pub config: Option<DigestConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestConfig {
    pub max_timeout_ns: i64,
    pub max_list_size: i32,
    pub ack_timeout_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueSetEntry {
    pub value_set_id: u32,
    pub members: Vec<ValueSetMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueSetMember {
    pub match_fields: Vec<FieldMatch>,
}

/// Write operation tag. A bare entity with no tag is not a valid write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    Insert,
    Modify,
    Delete,
}

/// A tagged entity, ready for a write RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub kind: UpdateKind,
    pub entity: Entity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entity_has_no_populated_arm() {
        assert_eq!(Entity::default().populated(), 0);
    }

    #[test]
    fn populated_counts_every_arm() {
        let entity = Entity {
            table_entry: Some(TableEntry::default()),
            register_entry: Some(RegisterEntry::default()),
            ..Default::default()
        };
        assert_eq!(entity.populated(), 2);
    }

    #[test]
    fn entry_action_counts_arms() {
        let action = EntryAction {
            action_profile_member_id: Some(1),
            ..Default::default()
        };
        assert_eq!(action.populated(), 1);
    }
}
