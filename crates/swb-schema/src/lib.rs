//! Schema catalog for switchboard
//!
//! A device describes its forwarding program in a capability document:
//! tables, actions, match fields, action profiles, counters, meters,
//! registers, digests and value sets, each with a stable numeric id, a
//! human name and type/bit-width metadata. This crate parses that document
//! and exposes it as an immutable catalog with name-to-object and id-to-object
//! lookup.
//!
//! The catalog is read-only after construction and is shared across a
//! switch's tasks behind an `Arc` without further synchronization. Ids are
//! only meaningful relative to the catalog instance they came from; callers
//! must never cache ids across catalogs.
//!
//! ```
//! use swb_schema::DeviceSchema;
//!
//! let schema = DeviceSchema::from_json(
//!     r#"{
//!         "pipeline": "demo",
//!         "tables": [{
//!             "id": 1, "name": "fwd",
//!             "match_fields": [
//!                 {"id": 1, "name": "port", "bitwidth": 9, "match_type": "exact"}
//!             ],
//!             "actions": [10]
//!         }],
//!         "actions": [{"id": 10, "name": "send", "params": []}]
//!     }"#,
//! )
//! .unwrap();
//!
//! let table = schema.tables.by_name("fwd").unwrap();
//! assert_eq!(table.id, 1);
//! assert_eq!(schema.actions.by_id(10).unwrap().name, "send");
//! ```

pub mod document;
pub mod error;

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use document::SchemaDocument;
pub use error::SchemaError;

/// The comparison semantics of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Ternary,
    Lpm,
    Range,
    Optional,
}

impl MatchKind {
    /// Entries with at least one field of these kinds carry a priority.
    pub fn requires_priority(self) -> bool {
        matches!(self, Self::Ternary | Self::Range | Self::Optional)
    }
}

/// Anything the catalog can index: has a stable id and a unique name.
pub trait SchemaObject {
    fn id(&self) -> u32;
    fn name(&self) -> &str;
}

macro_rules! impl_schema_object {
    ($($ty:ty),+) => {
        $(impl SchemaObject for $ty {
            fn id(&self) -> u32 {
                self.id
            }
            fn name(&self) -> &str {
                &self.name
            }
        })+
    };
}

/// An indexed, immutable collection of one schema object category.
#[derive(Debug)]
pub struct ObjectMap<T> {
    items: Vec<T>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
}

impl<T: SchemaObject> ObjectMap<T> {
    fn build(items: Vec<T>, kind: &'static str) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(items.len());
        let mut by_id = HashMap::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if by_name.insert(item.name().to_string(), index).is_some() {
                return Err(SchemaError::DuplicateName {
                    kind,
                    name: item.name().to_string(),
                });
            }
            if by_id.insert(item.id(), index).is_some() {
                return Err(SchemaError::DuplicateId {
                    kind,
                    id: item.id(),
                });
            }
        }
        Ok(Self {
            items,
            by_name,
            by_id,
        })
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.by_name.get(name).map(|&index| &self.items[index])
    }

    pub fn by_id(&self, id: u32) -> Option<&T> {
        self.by_id.get(&id).map(|&index| &self.items[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MatchField {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub id: u32,
    pub name: String,
    pub match_fields: Vec<MatchField>,
    pub action_ids: Vec<u32>,
    pub size: i64,
    pub is_const: bool,
    pub supports_idle_timeout: bool,
    pub action_profile_id: Option<u32>,
}

impl Table {
    pub fn match_field(&self, name: &str) -> Option<&MatchField> {
        self.match_fields.iter().find(|field| field.name == name)
    }

    pub fn match_field_by_id(&self, id: u32) -> Option<&MatchField> {
        self.match_fields.iter().find(|field| field.id == id)
    }

    /// True when any field is ternary/range/optional, which makes entry
    /// priority mandatory for non-wildcard entries.
    pub fn requires_priority(&self) -> bool {
        self.match_fields
            .iter()
            .any(|field| field.match_kind.requires_priority())
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub id: u32,
    pub name: String,
    pub params: Vec<Param>,
}

impl Action {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|param| param.name == name)
    }

    pub fn param_by_id(&self, id: u32) -> Option<&Param> {
        self.params.iter().find(|param| param.id == id)
    }
}

#[derive(Debug, Clone)]
pub struct ActionProfile {
    pub id: u32,
    pub name: String,
    pub with_selector: bool,
    pub size: i64,
    pub max_group_size: i32,
}

pub use document::{CounterUnit, MeterUnit};

#[derive(Debug, Clone)]
pub struct Counter {
    pub id: u32,
    pub name: String,
    pub unit: CounterUnit,
    pub size: i64,
    /// Set on direct counters: the table whose entries this counter follows.
    pub direct_table_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Meter {
    pub id: u32,
    pub name: String,
    pub unit: MeterUnit,
    pub size: i64,
    pub direct_table_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Register {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
}

#[derive(Debug, Clone)]
pub struct Digest {
    pub id: u32,
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct ValueSet {
    pub id: u32,
    pub name: String,
    pub fields: Vec<MatchField>,
    pub size: i64,
}

impl ValueSet {
    pub fn field(&self, name: &str) -> Option<&MatchField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_by_id(&self, id: u32) -> Option<&MatchField> {
        self.fields.iter().find(|field| field.id == id)
    }
}

/// Metadata fields prepended to punted/injected packets.
#[derive(Debug, Clone, Default)]
pub struct PacketIo {
    pub fields: Vec<Field>,
}

impl PacketIo {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_by_id(&self, id: u32) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }
}

impl_schema_object!(Table, Action, ActionProfile, Counter, Meter, Register, Digest, ValueSet);

/// The indexed catalog for one device's forwarding program.
#[derive(Debug)]
pub struct DeviceSchema {
    pub pipeline: String,
    pub arch: String,
    pub tables: ObjectMap<Table>,
    pub actions: ObjectMap<Action>,
    pub action_profiles: ObjectMap<ActionProfile>,
    pub counters: ObjectMap<Counter>,
    pub meters: ObjectMap<Meter>,
    pub registers: ObjectMap<Register>,
    pub digests: ObjectMap<Digest>,
    pub value_sets: ObjectMap<ValueSet>,
    pub packet_in: Option<PacketIo>,
    pub packet_out: Option<PacketIo>,
}

impl DeviceSchema {
    /// Load a capability document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parse a capability document from a JSON string.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_str(text)?;
        Self::from_document(document)
    }

    fn from_document(document: SchemaDocument) -> Result<Self, SchemaError> {
        let actions = ObjectMap::build(
            document
                .actions
                .into_iter()
                .map(|doc| Action {
                    id: doc.id,
                    name: doc.name,
                    params: doc
                        .params
                        .into_iter()
                        .map(|param| Param {
                            id: param.id,
                            name: param.name,
                            bitwidth: param.bitwidth,
                        })
                        .collect(),
                })
                .collect(),
            "action",
        )?;

        let tables = ObjectMap::build(
            document
                .tables
                .into_iter()
                .map(|doc| Table {
                    id: doc.id,
                    name: doc.name,
                    match_fields: doc
                        .match_fields
                        .into_iter()
                        .map(|field| MatchField {
                            id: field.id,
                            name: field.name,
                            bitwidth: field.bitwidth,
                            match_kind: field.match_type,
                        })
                        .collect(),
                    action_ids: doc.actions,
                    size: doc.size,
                    is_const: doc.is_const,
                    supports_idle_timeout: doc.supports_idle_timeout,
                    action_profile_id: doc.action_profile,
                })
                .collect(),
            "table",
        )?;

        for table in tables.iter() {
            for action_id in &table.action_ids {
                if actions.by_id(*action_id).is_none() {
                    return Err(SchemaError::UnknownActionRef {
                        table: table.name.clone(),
                        action_id: *action_id,
                    });
                }
            }
        }

        Ok(Self {
            pipeline: document.pipeline,
            arch: document.arch,
            tables,
            actions,
            action_profiles: ObjectMap::build(
                document
                    .action_profiles
                    .into_iter()
                    .map(|doc| ActionProfile {
                        id: doc.id,
                        name: doc.name,
                        with_selector: doc.with_selector,
                        size: doc.size,
                        max_group_size: doc.max_group_size,
                    })
                    .collect(),
                "action profile",
            )?,
            counters: ObjectMap::build(
                document
                    .counters
                    .into_iter()
                    .map(|doc| Counter {
                        id: doc.id,
                        name: doc.name,
                        unit: doc.unit,
                        size: doc.size,
                        direct_table_id: doc.table,
                    })
                    .collect(),
                "counter",
            )?,
            meters: ObjectMap::build(
                document
                    .meters
                    .into_iter()
                    .map(|doc| Meter {
                        id: doc.id,
                        name: doc.name,
                        unit: doc.unit,
                        size: doc.size,
                        direct_table_id: doc.table,
                    })
                    .collect(),
                "meter",
            )?,
            registers: ObjectMap::build(
                document
                    .registers
                    .into_iter()
                    .map(|doc| Register {
                        id: doc.id,
                        name: doc.name,
                        bitwidth: doc.bitwidth,
                        size: doc.size,
                    })
                    .collect(),
                "register",
            )?,
            digests: ObjectMap::build(
                document
                    .digests
                    .into_iter()
                    .map(|doc| Digest {
                        id: doc.id,
                        name: doc.name,
                        fields: doc
                            .fields
                            .into_iter()
                            .map(|field| Field {
                                id: field.id,
                                name: field.name,
                                bitwidth: field.bitwidth,
                            })
                            .collect(),
                    })
                    .collect(),
                "digest",
            )?,
            value_sets: ObjectMap::build(
                document
                    .value_sets
                    .into_iter()
                    .map(|doc| ValueSet {
                        id: doc.id,
                        name: doc.name,
                        fields: doc
                            .fields
                            .into_iter()
                            .map(|field| MatchField {
                                id: field.id,
                                name: field.name,
                                bitwidth: field.bitwidth,
                                match_kind: field.match_type,
                            })
                            .collect(),
                        size: doc.size,
                    })
                    .collect(),
                "value set",
            )?,
            packet_in: document.packet_in.map(|doc| PacketIo {
                fields: doc
                    .fields
                    .into_iter()
                    .map(|field| Field {
                        id: field.id,
                        name: field.name,
                        bitwidth: field.bitwidth,
                    })
                    .collect(),
            }),
            packet_out: document.packet_out.map(|doc| PacketIo {
                fields: doc
                    .fields
                    .into_iter()
                    .map(|field| Field {
                        id: field.id,
                        name: field.name,
                        bitwidth: field.bitwidth,
                    })
                    .collect(),
            }),
        })
    }

    /// The direct counter attached to a table, if any.
    pub fn direct_counter_of(&self, table_id: u32) -> Option<&Counter> {
        self.counters
            .iter()
            .find(|counter| counter.direct_table_id == Some(table_id))
    }

    /// The direct meter attached to a table, if any.
    pub fn direct_meter_of(&self, table_id: u32) -> Option<&Meter> {
        self.meters
            .iter()
            .find(|meter| meter.direct_table_id == Some(table_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "pipeline": "basic",
        "arch": "v1model",
        "tables": [{
            "id": 37375156,
            "name": "ipv4_lpm",
            "match_fields": [
                {"id": 1, "name": "dstAddr", "bitwidth": 32, "match_type": "lpm"}
            ],
            "actions": [28792405],
            "size": 1024
        }],
        "actions": [{
            "id": 28792405,
            "name": "ipv4_forward",
            "params": [
                {"id": 1, "name": "dstAddr", "bitwidth": 48},
                {"id": 2, "name": "port", "bitwidth": 9}
            ]
        }],
        "counters": [
            {"id": 307710742, "name": "other_counter", "size": 16},
            {"id": 302025528, "name": "ipv4_counter", "table": 37375156}
        ],
        "registers": [
            {"id": 369140025, "name": "counter_bloom_filter", "bitwidth": 32, "size": 4096}
        ],
        "packet_in": {
            "fields": [
                {"id": 1, "name": "ingress_port", "bitwidth": 9},
                {"id": 2, "name": "_pad", "bitwidth": 7}
            ]
        }
    }"#;

    #[test]
    fn lookups_by_name_and_id() {
        let schema = DeviceSchema::from_json(DOC).unwrap();
        let table = schema.tables.by_name("ipv4_lpm").unwrap();
        assert_eq!(table.id, 37375156);
        assert_eq!(
            schema.tables.by_id(37375156).unwrap().name,
            "ipv4_lpm"
        );
        let action = schema.actions.by_name("ipv4_forward").unwrap();
        assert_eq!(action.params.len(), 2);
        assert_eq!(action.param("port").unwrap().bitwidth, 9);
        assert!(schema.actions.by_name("missing").is_none());
    }

    #[test]
    fn match_field_metadata() {
        let schema = DeviceSchema::from_json(DOC).unwrap();
        let table = schema.tables.by_name("ipv4_lpm").unwrap();
        let field = table.match_field("dstAddr").unwrap();
        assert_eq!(field.bitwidth, 32);
        assert_eq!(field.match_kind, MatchKind::Lpm);
        assert!(!table.requires_priority());
    }

    #[test]
    fn direct_counter_link() {
        let schema = DeviceSchema::from_json(DOC).unwrap();
        let counter = schema.direct_counter_of(37375156).unwrap();
        assert_eq!(counter.name, "ipv4_counter");
        assert!(schema
            .counters
            .by_name("other_counter")
            .unwrap()
            .direct_table_id
            .is_none());
    }

    #[test]
    fn packet_in_metadata_fields() {
        let schema = DeviceSchema::from_json(DOC).unwrap();
        let io = schema.packet_in.as_ref().unwrap();
        assert_eq!(io.field("ingress_port").unwrap().id, 1);
        assert_eq!(io.field_by_id(2).unwrap().name, "_pad");
    }

    #[test]
    fn duplicate_table_name_rejected() {
        let doc = r#"{
            "tables": [
                {"id": 1, "name": "t"},
                {"id": 2, "name": "t"}
            ]
        }"#;
        let err = DeviceSchema::from_json(doc).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateName { kind: "table", .. }));
    }

    #[test]
    fn unknown_action_reference_rejected() {
        let doc = r#"{
            "tables": [{"id": 1, "name": "t", "actions": [99]}]
        }"#;
        let err = DeviceSchema::from_json(doc).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownActionRef { .. }));
    }
}
