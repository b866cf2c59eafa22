//! Table entries and their action slot

use std::collections::BTreeMap;

use bytes::Bytes;
use swb_proto::wire;
use swb_schema::DeviceSchema;

use crate::action::TableAction;
use crate::error::CodecError;
use crate::match_field::TableMatch;
use crate::value;

pub use wire::{CounterData, MeterConfig, MeterCounterData};

/// One weighted member of a one-shot action set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedAction {
    pub weight: i32,
    pub action: TableAction,
    pub watch_port: Option<u32>,
}

impl WeightedAction {
    pub fn new(weight: i32, action: TableAction) -> Self {
        Self {
            weight,
            action,
            watch_port: None,
        }
    }
}

/// Reference into an action profile, or an inline one-shot action set.
/// The three forms are mutually exclusive wire shapes for the same slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndirectAction {
    ActionSet(Vec<WeightedAction>),
    Member(u32),
    Group(u32),
}

/// The action slot of a table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryAction {
    Direct(TableAction),
    Indirect(IndirectAction),
}

impl From<TableAction> for EntryAction {
    fn from(action: TableAction) -> Self {
        EntryAction::Direct(action)
    }
}

impl From<IndirectAction> for EntryAction {
    fn from(action: IndirectAction) -> Self {
        EntryAction::Indirect(action)
    }
}

impl EntryAction {
    pub(crate) fn encode(&self, schema: &DeviceSchema) -> Result<wire::EntryAction, CodecError> {
        let mut encoded = wire::EntryAction::default();
        match self {
            EntryAction::Direct(action) => encoded.action = Some(action.encode(schema)?),
            EntryAction::Indirect(IndirectAction::Member(member_id)) => {
                encoded.action_profile_member_id = Some(*member_id);
            }
            EntryAction::Indirect(IndirectAction::Group(group_id)) => {
                encoded.action_profile_group_id = Some(*group_id);
            }
            EntryAction::Indirect(IndirectAction::ActionSet(actions)) => {
                let actions = actions
                    .iter()
                    .map(|weighted| {
                        Ok(wire::WeightedAction {
                            action: Some(weighted.action.encode(schema)?),
                            weight: weighted.weight,
                            watch_port: encode_watch_port(weighted.watch_port)?,
                        })
                    })
                    .collect::<Result<Vec<_>, CodecError>>()?;
                encoded.action_profile_action_set = Some(wire::ActionSet { actions });
            }
        }
        Ok(encoded)
    }

    pub(crate) fn decode(
        encoded: &wire::EntryAction,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        match encoded.populated() {
            0 => return Err(CodecError::EmptyContainer("table action type")),
            1 => {}
            _ => return Err(CodecError::AmbiguousContainer("table action")),
        }
        if let Some(action) = &encoded.action {
            return Ok(EntryAction::Direct(TableAction::decode(action, schema)?));
        }
        if let Some(member_id) = encoded.action_profile_member_id {
            return Ok(EntryAction::Indirect(IndirectAction::Member(member_id)));
        }
        if let Some(group_id) = encoded.action_profile_group_id {
            return Ok(EntryAction::Indirect(IndirectAction::Group(group_id)));
        }
        let Some(action_set) = &encoded.action_profile_action_set else {
            return Err(CodecError::EmptyContainer("table action type"));
        };
        let actions = action_set
            .actions
            .iter()
            .map(|weighted| {
                let action = weighted
                    .action
                    .as_ref()
                    .ok_or(CodecError::EmptyContainer("action set member action"))?;
                Ok(WeightedAction {
                    weight: weighted.weight,
                    action: TableAction::decode(action, schema)?,
                    watch_port: decode_watch_port(&weighted.watch_port)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(EntryAction::Indirect(IndirectAction::ActionSet(actions)))
    }
}

pub(crate) fn encode_watch_port(port: Option<u32>) -> Result<Bytes, CodecError> {
    match port {
        Some(port) => value::encode_checked("watch_port", port as u128, 32),
        None => Ok(Bytes::new()),
    }
}

pub(crate) fn decode_watch_port(data: &Bytes) -> Result<Option<u32>, CodecError> {
    if data.is_empty() {
        return Ok(None);
    }
    let port = value::from_canonical(data)?;
    if !value::fits(port, 32) {
        return Err(CodecError::ValueTooWide {
            name: "watch_port".to_string(),
            bitwidth: 32,
        });
    }
    Ok(Some(port as u32))
}

/// A table entry addressed by table name. An empty `table` is the wildcard
/// form used by read templates covering every table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableEntry {
    pub table: String,
    pub match_fields: TableMatch,
    pub action: Option<EntryAction>,
    pub is_default_action: bool,
    pub priority: i32,
    pub metadata: Bytes,
    pub idle_timeout_ns: i64,
    pub time_since_last_hit_ns: Option<i64>,
    pub meter_config: Option<MeterConfig>,
    pub counter_data: Option<CounterData>,
    pub meter_counter_data: Option<MeterCounterData>,
}

impl TableEntry {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Wildcard template matching every entry of every table.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, match_fields: TableMatch) -> Self {
        self.match_fields = match_fields;
        self
    }

    pub fn with_action(mut self, action: impl Into<EntryAction>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_default_action(mut self, is_default: bool) -> Self {
        self.is_default_action = is_default;
        self
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::TableEntry, CodecError> {
        let table = if self.table.is_empty() {
            if !self.match_fields.is_empty() || self.action.is_some() {
                return Err(CodecError::MissingTableName);
            }
            None
        } else {
            Some(
                schema
                    .tables
                    .by_name(&self.table)
                    .ok_or_else(|| CodecError::UnknownTable(self.table.clone()))?,
            )
        };

        let match_fields = match table {
            Some(table) => {
                if table.requires_priority()
                    && !self.match_fields.is_empty()
                    && self.priority == 0
                    && !self.is_default_action
                {
                    return Err(CodecError::MissingPriority(table.name.clone()));
                }
                self.match_fields
                    .encode_fields(&table.match_fields, &table.name)?
            }
            None => Vec::new(),
        };

        Ok(wire::TableEntry {
            table_id: table.map(|table| table.id).unwrap_or(0),
            match_fields,
            action: self
                .action
                .as_ref()
                .map(|action| action.encode(schema))
                .transpose()?,
            priority: self.priority,
            metadata: self.metadata.clone(),
            is_default_action: self.is_default_action,
            idle_timeout_ns: self.idle_timeout_ns,
            time_since_last_hit_ns: self.time_since_last_hit_ns,
            meter_config: self.meter_config,
            counter_data: self.counter_data,
            meter_counter_data: self.meter_counter_data,
        })
    }

    pub fn decode(
        encoded: &wire::TableEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let (table_name, match_fields) = if encoded.table_id == 0 {
            (String::new(), TableMatch::new())
        } else {
            let table = schema
                .tables
                .by_id(encoded.table_id)
                .ok_or(CodecError::UnknownId {
                    kind: "table",
                    id: encoded.table_id,
                })?;
            (
                table.name.clone(),
                TableMatch::decode_fields(&encoded.match_fields, &table.match_fields)?,
            )
        };

        Ok(Self {
            table: table_name,
            match_fields,
            action: encoded
                .action
                .as_ref()
                .map(|action| EntryAction::decode(action, schema))
                .transpose()?,
            priority: encoded.priority,
            metadata: encoded.metadata.clone(),
            is_default_action: encoded.is_default_action,
            idle_timeout_ns: encoded.idle_timeout_ns,
            time_since_last_hit_ns: encoded.time_since_last_hit_ns,
            meter_config: encoded.meter_config,
            counter_data: encoded.counter_data,
            meter_counter_data: encoded.meter_counter_data,
        })
    }

    /// Diagnostic view of the full match: every schema field mapped to its
    /// supplied value or the `*` wildcard placeholder.
    pub fn full_match(
        &self,
        schema: &DeviceSchema,
    ) -> Result<BTreeMap<String, String>, CodecError> {
        let table = schema
            .tables
            .by_name(&self.table)
            .ok_or_else(|| CodecError::UnknownTable(self.table.clone()))?;
        Ok(table
            .match_fields
            .iter()
            .map(|field| {
                let display = self
                    .match_fields
                    .get(&field.name)
                    .map(|value| value.display())
                    .unwrap_or_else(|| "*".to_string());
                (field.name.clone(), display)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DeviceSchema {
        DeviceSchema::from_json(
            r#"{
                "tables": [
                    {
                        "id": 37375156,
                        "name": "ipv4_lpm",
                        "match_fields": [
                            {"id": 1, "name": "dstAddr", "bitwidth": 32, "match_type": "lpm"}
                        ],
                        "actions": [28792405]
                    },
                    {
                        "id": 40000001,
                        "name": "acl",
                        "match_fields": [
                            {"id": 1, "name": "proto", "bitwidth": 8, "match_type": "ternary"}
                        ],
                        "actions": [28792405]
                    }
                ],
                "actions": [{
                    "id": 28792405,
                    "name": "ipv4_forward",
                    "params": [
                        {"id": 1, "name": "dstAddr", "bitwidth": 48},
                        {"id": 2, "name": "port", "bitwidth": 9}
                    ]
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn empty_entry_is_the_universal_wildcard() {
        let schema = schema();
        let entry = TableEntry::any();
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded, wire::TableEntry::default());
        assert_eq!(TableEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn full_entry_roundtrip() {
        let schema = schema();
        let entry = TableEntry::new("ipv4_lpm")
            .with_match(TableMatch::new().field("dstAddr", (167_772_160u128, 24u32)))
            .with_action(
                TableAction::new("ipv4_forward")
                    .arg("dstAddr", 0x0102_0304_0506u64)
                    .arg("port", 1u32),
            );
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.table_id, 37375156);
        assert_eq!(encoded.match_fields.len(), 1);
        let action = encoded.action.as_ref().unwrap().action.as_ref().unwrap();
        assert_eq!(action.action_id, 28792405);
        assert_eq!(action.params[0].value.as_ref(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(TableEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn indirect_forms_roundtrip() {
        let schema = schema();
        for indirect in [
            IndirectAction::Member(345),
            IndirectAction::Group(123),
            IndirectAction::ActionSet(vec![
                WeightedAction::new(
                    1,
                    TableAction::new("ipv4_forward")
                        .arg("dstAddr", 1u32)
                        .arg("port", 1u32),
                ),
                WeightedAction {
                    weight: 3,
                    action: TableAction::new("ipv4_forward")
                        .arg("dstAddr", 1u32)
                        .arg("port", 2u32),
                    watch_port: Some(9),
                },
            ]),
        ] {
            let entry = TableEntry::new("ipv4_lpm").with_action(indirect.clone());
            let encoded = entry.encode(&schema).unwrap();
            assert_eq!(TableEntry::decode(&encoded, &schema).unwrap(), entry);
        }
    }

    #[test]
    fn empty_action_slot_is_fatal_on_decode() {
        let schema = schema();
        let encoded = wire::TableEntry {
            table_id: 37375156,
            action: Some(wire::EntryAction::default()),
            ..Default::default()
        };
        let err = TableEntry::decode(&encoded, &schema).unwrap_err();
        assert_eq!(err.to_string(), "missing table action type");
    }

    #[test]
    fn ambiguous_action_slot_is_fatal_on_decode() {
        let schema = schema();
        let encoded = wire::TableEntry {
            table_id: 37375156,
            action: Some(wire::EntryAction {
                action_profile_member_id: Some(1),
                action_profile_group_id: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = TableEntry::decode(&encoded, &schema).unwrap_err();
        assert_eq!(err.to_string(), "multiple fields set in table action");
    }

    #[test]
    fn ternary_match_requires_priority() {
        let schema = schema();
        let entry = TableEntry::new("acl")
            .with_match(TableMatch::new().field("proto", 6u32));
        let err = entry.encode(&schema).unwrap_err();
        assert!(matches!(err, CodecError::MissingPriority(_)));

        let entry = entry.with_priority(10);
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.priority, 10);
    }

    #[test]
    fn full_match_uses_wildcard_placeholder() {
        let schema = schema();
        let entry = TableEntry::new("ipv4_lpm");
        let display = entry.full_match(&schema).unwrap();
        assert_eq!(display["dstAddr"], "*");

        let entry = entry.with_match(TableMatch::new().field("dstAddr", (10u128, 24u32)));
        let display = entry.full_match(&schema).unwrap();
        assert_eq!(display["dstAddr"], "10/24");
    }

    #[test]
    fn match_without_table_name_is_fatal() {
        let schema = schema();
        let entry = TableEntry::any()
            .with_match(TableMatch::new().field("dstAddr", 1u32));
        assert!(matches!(
            entry.encode(&schema),
            Err(CodecError::MissingTableName)
        ));
    }
}
