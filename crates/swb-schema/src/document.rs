//! Raw serde model of the device capability document
//!
//! The document is JSON with one array per object category. This module is
//! purely mechanical: deserialization only, no indexing or validation beyond
//! what serde enforces. The catalog in `lib.rs` turns a parsed document into
//! indexed lookup tables.

use serde::Deserialize;

use crate::MatchKind;

#[derive(Debug, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub pipeline: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub tables: Vec<TableDoc>,
    #[serde(default)]
    pub actions: Vec<ActionDoc>,
    #[serde(default)]
    pub action_profiles: Vec<ActionProfileDoc>,
    #[serde(default)]
    pub counters: Vec<CounterDoc>,
    #[serde(default)]
    pub meters: Vec<MeterDoc>,
    #[serde(default)]
    pub registers: Vec<RegisterDoc>,
    #[serde(default)]
    pub digests: Vec<DigestDoc>,
    #[serde(default)]
    pub value_sets: Vec<ValueSetDoc>,
    pub packet_in: Option<PacketIoDoc>,
    pub packet_out: Option<PacketIoDoc>,
}

#[derive(Debug, Deserialize)]
pub struct TableDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub match_fields: Vec<MatchFieldDoc>,
    /// Ids of the actions this table may invoke.
    #[serde(default)]
    pub actions: Vec<u32>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_const: bool,
    #[serde(default)]
    pub supports_idle_timeout: bool,
    /// Action profile backing this table's action slot, if indirect.
    #[serde(default)]
    pub action_profile: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct MatchFieldDoc {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
    pub match_type: MatchKind,
}

#[derive(Debug, Deserialize)]
pub struct ActionDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDoc>,
}

#[derive(Debug, Deserialize)]
pub struct ParamDoc {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
}

#[derive(Debug, Deserialize)]
pub struct ActionProfileDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub with_selector: bool,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub max_group_size: i32,
}

#[derive(Debug, Deserialize)]
pub struct CounterDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub unit: CounterUnit,
    #[serde(default)]
    pub size: i64,
    /// Present on direct counters: the owning table's id.
    #[serde(default)]
    pub table: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CounterUnit {
    Bytes,
    Packets,
    #[default]
    Both,
}

#[derive(Debug, Deserialize)]
pub struct MeterDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub unit: MeterUnit,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub table: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeterUnit {
    #[default]
    Bytes,
    Packets,
}

#[derive(Debug, Deserialize)]
pub struct RegisterDoc {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct DigestDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDoc>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDoc {
    pub id: u32,
    pub name: String,
    pub bitwidth: u32,
}

#[derive(Debug, Deserialize)]
pub struct ValueSetDoc {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<MatchFieldDoc>,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct PacketIoDoc {
    #[serde(default)]
    pub fields: Vec<FieldDoc>,
}
