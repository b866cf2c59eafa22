//! Schema-driven entity codec for switchboard
//!
//! This crate maps between the name-addressed domain model an application
//! works with and the id-addressed wire representation a device understands.
//! Every conversion goes through an explicit [`swb_schema::DeviceSchema`]:
//! names resolve to ids on encode, ids resolve back to names on decode, and
//! any mismatch with the schema is a synchronous, descriptive
//! [`CodecError`], never a silent default.
//!
//! ```
//! use swb_entity::{Entity, TableAction, TableEntry, TableMatch, Update};
//! use swb_schema::DeviceSchema;
//!
//! # fn example(schema: &DeviceSchema) -> Result<(), swb_entity::CodecError> {
//! let entry = TableEntry::new("ipv4_lpm")
//!     .with_match(TableMatch::new().field("dstAddr", (0x0a00_0000u128, 24u32)))
//!     .with_action(TableAction::new("ipv4_forward").arg("port", 1u32));
//!
//! let updates = swb_entity::encode_updates([Update::insert(entry)], schema)?;
//! # let _ = updates;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod entry;
pub mod error;
pub mod match_field;
pub mod metering;
pub mod notify;
pub mod packet;
pub mod profile;
pub mod replication;
pub mod value_set;

mod value;

use swb_proto::wire;
use swb_schema::DeviceSchema;

pub use action::TableAction;
pub use entry::{
    CounterData, EntryAction, IndirectAction, MeterConfig, MeterCounterData, TableEntry,
    WeightedAction,
};
pub use error::CodecError;
pub use match_field::{MatchValue, TableMatch};
pub use metering::{
    CounterEntry, DirectCounterEntry, DirectMeterEntry, MeterEntry, RegisterEntry,
};
pub use notify::{DigestEntry, DigestList, DigestListAck, IdleTimeoutNotification};
pub use packet::{PacketIn, PacketOut};
pub use profile::{ActionProfileGroup, ActionProfileMember, GroupMember};
pub use replication::{CloneSessionEntry, MulticastGroupEntry, Replica};
pub use swb_proto::wire::UpdateKind;
pub use value_set::{ValueSetEntry, ValueSetMember};

/// Closed set of structured entities the codec understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    TableEntry(TableEntry),
    ActionProfileMember(ActionProfileMember),
    ActionProfileGroup(ActionProfileGroup),
    MeterEntry(MeterEntry),
    DirectMeterEntry(DirectMeterEntry),
    CounterEntry(CounterEntry),
    DirectCounterEntry(DirectCounterEntry),
    RegisterEntry(RegisterEntry),
    MulticastGroupEntry(MulticastGroupEntry),
    CloneSessionEntry(CloneSessionEntry),
    DigestEntry(DigestEntry),
    ValueSetEntry(ValueSetEntry),
}

macro_rules! impl_into_entity {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(impl From<$ty> for Entity {
            fn from(entity: $ty) -> Self {
                Entity::$variant(entity)
            }
        })+
    };
}

impl_into_entity!(
    TableEntry(TableEntry),
    ActionProfileMember(ActionProfileMember),
    ActionProfileGroup(ActionProfileGroup),
    MeterEntry(MeterEntry),
    DirectMeterEntry(DirectMeterEntry),
    CounterEntry(CounterEntry),
    DirectCounterEntry(DirectCounterEntry),
    RegisterEntry(RegisterEntry),
    MulticastGroupEntry(MulticastGroupEntry),
    CloneSessionEntry(CloneSessionEntry),
    DigestEntry(DigestEntry),
    ValueSetEntry(ValueSetEntry),
);

impl Entity {
    /// Encode to the wire container with exactly one arm populated.
    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::Entity, CodecError> {
        let mut encoded = wire::Entity::default();
        match self {
            Entity::TableEntry(entry) => encoded.table_entry = Some(entry.encode(schema)?),
            Entity::ActionProfileMember(member) => {
                encoded.action_profile_member = Some(member.encode(schema)?);
            }
            Entity::ActionProfileGroup(group) => {
                encoded.action_profile_group = Some(group.encode(schema)?);
            }
            Entity::MeterEntry(entry) => encoded.meter_entry = Some(entry.encode(schema)?),
            Entity::DirectMeterEntry(entry) => {
                encoded.direct_meter_entry = Some(entry.encode(schema)?);
            }
            Entity::CounterEntry(entry) => encoded.counter_entry = Some(entry.encode(schema)?),
            Entity::DirectCounterEntry(entry) => {
                encoded.direct_counter_entry = Some(entry.encode(schema)?);
            }
            Entity::RegisterEntry(entry) => encoded.register_entry = Some(entry.encode(schema)?),
            Entity::MulticastGroupEntry(entry) => {
                encoded.packet_replication_engine_entry = Some(entry.encode());
            }
            Entity::CloneSessionEntry(entry) => {
                encoded.packet_replication_engine_entry = Some(entry.encode());
            }
            Entity::DigestEntry(entry) => encoded.digest_entry = Some(entry.encode(schema)?),
            Entity::ValueSetEntry(entry) => {
                encoded.value_set_entry = Some(entry.encode(schema)?);
            }
        }
        Ok(encoded)
    }

    /// Decode a wire container, dispatching on the populated arm. Fails
    /// loudly when zero or more than one arm is populated.
    pub fn decode(encoded: &wire::Entity, schema: &DeviceSchema) -> Result<Self, CodecError> {
        match encoded.populated() {
            0 => return Err(CodecError::EmptyContainer("entity")),
            1 => {}
            _ => return Err(CodecError::AmbiguousContainer("entity")),
        }
        if let Some(entry) = &encoded.table_entry {
            return Ok(Entity::TableEntry(TableEntry::decode(entry, schema)?));
        }
        if let Some(member) = &encoded.action_profile_member {
            return Ok(Entity::ActionProfileMember(ActionProfileMember::decode(
                member, schema,
            )?));
        }
        if let Some(group) = &encoded.action_profile_group {
            return Ok(Entity::ActionProfileGroup(ActionProfileGroup::decode(
                group, schema,
            )?));
        }
        if let Some(entry) = &encoded.meter_entry {
            return Ok(Entity::MeterEntry(MeterEntry::decode(entry, schema)?));
        }
        if let Some(entry) = &encoded.direct_meter_entry {
            return Ok(Entity::DirectMeterEntry(DirectMeterEntry::decode(
                entry, schema,
            )?));
        }
        if let Some(entry) = &encoded.counter_entry {
            return Ok(Entity::CounterEntry(CounterEntry::decode(entry, schema)?));
        }
        if let Some(entry) = &encoded.direct_counter_entry {
            return Ok(Entity::DirectCounterEntry(DirectCounterEntry::decode(
                entry, schema,
            )?));
        }
        if let Some(entry) = &encoded.packet_replication_engine_entry {
            return Ok(match replication::decode_replication(entry)? {
                replication::ReplicationEntry::Multicast(entry) => {
                    Entity::MulticastGroupEntry(entry)
                }
                replication::ReplicationEntry::Clone(entry) => Entity::CloneSessionEntry(entry),
            });
        }
        if let Some(entry) = &encoded.register_entry {
            return Ok(Entity::RegisterEntry(RegisterEntry::decode(entry, schema)?));
        }
        if let Some(entry) = &encoded.digest_entry {
            return Ok(Entity::DigestEntry(DigestEntry::decode(entry, schema)?));
        }
        let Some(entry) = &encoded.value_set_entry else {
            return Err(CodecError::EmptyContainer("entity"));
        };
        Ok(Entity::ValueSetEntry(ValueSetEntry::decode(entry, schema)?))
    }
}

/// An entity tagged with its write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub kind: UpdateKind,
    pub entity: Entity,
}

impl Update {
    pub fn insert(entity: impl Into<Entity>) -> Self {
        Self {
            kind: UpdateKind::Insert,
            entity: entity.into(),
        }
    }

    pub fn modify(entity: impl Into<Entity>) -> Self {
        Self {
            kind: UpdateKind::Modify,
            entity: entity.into(),
        }
    }

    pub fn delete(entity: impl Into<Entity>) -> Self {
        Self {
            kind: UpdateKind::Delete,
            entity: entity.into(),
        }
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::Update, CodecError> {
        Ok(wire::Update {
            kind: self.kind,
            entity: self.entity.encode(schema)?,
        })
    }
}

/// Input to [`encode_updates`]: a tagged update, a bare entity (rejected at
/// encode time), or an already-encoded wire update (passed through
/// unchanged).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteItem {
    Update(Update),
    Entity(Entity),
    Wire(wire::Update),
}

impl From<Update> for WriteItem {
    fn from(update: Update) -> Self {
        WriteItem::Update(update)
    }
}

impl From<Entity> for WriteItem {
    fn from(entity: Entity) -> Self {
        WriteItem::Entity(entity)
    }
}

impl From<wire::Update> for WriteItem {
    fn from(update: wire::Update) -> Self {
        WriteItem::Wire(update)
    }
}

/// Encode a mixed batch of write items. Already-encoded updates pass through
/// unchanged; structured updates are encoded exactly once; an entity without
/// an INSERT/MODIFY/DELETE tag is a fatal validation failure.
pub fn encode_updates(
    items: impl IntoIterator<Item = impl Into<WriteItem>>,
    schema: &DeviceSchema,
) -> Result<Vec<wire::Update>, CodecError> {
    items
        .into_iter()
        .map(|item| match item.into() {
            WriteItem::Update(update) => update.encode(schema),
            WriteItem::Entity(_) => Err(CodecError::UnspecifiedUpdateKind),
            WriteItem::Wire(update) => Ok(update),
        })
        .collect()
}

/// Input to [`encode_entities`]: a structured entity or an already-encoded
/// wire entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadItem {
    Entity(Entity),
    Wire(wire::Entity),
}

impl From<Entity> for ReadItem {
    fn from(entity: Entity) -> Self {
        ReadItem::Entity(entity)
    }
}

impl From<wire::Entity> for ReadItem {
    fn from(entity: wire::Entity) -> Self {
        ReadItem::Wire(entity)
    }
}

/// Encode a mixed batch of read templates; wire entities pass through
/// unchanged.
pub fn encode_entities(
    items: impl IntoIterator<Item = impl Into<ReadItem>>,
    schema: &DeviceSchema,
) -> Result<Vec<wire::Entity>, CodecError> {
    items
        .into_iter()
        .map(|item| match item.into() {
            ReadItem::Entity(entity) => entity.encode(schema),
            ReadItem::Wire(entity) => Ok(entity),
        })
        .collect()
}
