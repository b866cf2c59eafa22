//! Meter, counter and register entries

use swb_proto::wire;
use swb_schema::DeviceSchema;

use crate::entry::TableEntry;
use crate::error::CodecError;
use crate::value;

pub use wire::{CounterData, MeterConfig, MeterCounterData};

/// Indexed meter entry. Empty name and `index: None` form read wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeterEntry {
    pub meter: String,
    pub index: Option<i64>,
    pub config: Option<MeterConfig>,
    pub counter_data: Option<MeterCounterData>,
}

impl MeterEntry {
    pub fn new(meter: impl Into<String>) -> Self {
        Self {
            meter: meter.into(),
            ..Default::default()
        }
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::MeterEntry, CodecError> {
        let meter_id = if self.meter.is_empty() {
            0
        } else {
            schema
                .meters
                .by_name(&self.meter)
                .map(|meter| meter.id)
                .ok_or_else(|| CodecError::UnknownMeter(self.meter.clone()))?
        };
        Ok(wire::MeterEntry {
            meter_id,
            index: self.index,
            config: self.config,
            counter_data: self.counter_data,
        })
    }

    pub fn decode(
        encoded: &wire::MeterEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let meter = if encoded.meter_id == 0 {
            String::new()
        } else {
            schema
                .meters
                .by_id(encoded.meter_id)
                .map(|meter| meter.name.clone())
                .ok_or(CodecError::UnknownId {
                    kind: "meter",
                    id: encoded.meter_id,
                })?
        };
        Ok(Self {
            meter,
            index: encoded.index,
            config: encoded.config,
            counter_data: encoded.counter_data,
        })
    }
}

/// Meter attached directly to a table entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectMeterEntry {
    pub table_entry: Option<TableEntry>,
    pub config: Option<MeterConfig>,
    pub counter_data: Option<MeterCounterData>,
}

impl DirectMeterEntry {
    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::DirectMeterEntry, CodecError> {
        Ok(wire::DirectMeterEntry {
            table_entry: self
                .table_entry
                .as_ref()
                .map(|entry| entry.encode(schema))
                .transpose()?,
            config: self.config,
            counter_data: self.counter_data,
        })
    }

    pub fn decode(
        encoded: &wire::DirectMeterEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            table_entry: encoded
                .table_entry
                .as_ref()
                .map(|entry| TableEntry::decode(entry, schema))
                .transpose()?,
            config: encoded.config,
            counter_data: encoded.counter_data,
        })
    }
}

/// Indexed counter entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterEntry {
    pub counter: String,
    pub index: Option<i64>,
    pub data: Option<CounterData>,
}

impl CounterEntry {
    pub fn new(counter: impl Into<String>) -> Self {
        Self {
            counter: counter.into(),
            ..Default::default()
        }
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::CounterEntry, CodecError> {
        let counter_id = if self.counter.is_empty() {
            0
        } else {
            schema
                .counters
                .by_name(&self.counter)
                .map(|counter| counter.id)
                .ok_or_else(|| CodecError::UnknownCounter(self.counter.clone()))?
        };
        Ok(wire::CounterEntry {
            counter_id,
            index: self.index,
            data: self.data,
        })
    }

    pub fn decode(
        encoded: &wire::CounterEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let counter = if encoded.counter_id == 0 {
            String::new()
        } else {
            schema
                .counters
                .by_id(encoded.counter_id)
                .map(|counter| counter.name.clone())
                .ok_or(CodecError::UnknownId {
                    kind: "counter",
                    id: encoded.counter_id,
                })?
        };
        Ok(Self {
            counter,
            index: encoded.index,
            data: encoded.data,
        })
    }
}

/// Counter attached directly to a table entry. The wire form only carries
/// the table entry; naming the counter lets the codec derive the owning
/// table from the schema when no explicit entry is supplied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectCounterEntry {
    pub counter: String,
    pub table_entry: Option<TableEntry>,
    pub data: Option<CounterData>,
}

impl DirectCounterEntry {
    pub fn new(counter: impl Into<String>) -> Self {
        Self {
            counter: counter.into(),
            ..Default::default()
        }
    }

    pub fn encode(
        &self,
        schema: &DeviceSchema,
    ) -> Result<wire::DirectCounterEntry, CodecError> {
        let table_entry = match (&self.table_entry, self.counter.is_empty()) {
            (Some(entry), _) => Some(entry.encode(schema)?),
            (None, false) => {
                // Derive the owning table from the counter's schema entry.
                let counter = schema
                    .counters
                    .by_name(&self.counter)
                    .ok_or_else(|| CodecError::UnknownCounter(self.counter.clone()))?;
                counter
                    .direct_table_id
                    .map(|table_id| wire::TableEntry {
                        table_id,
                        ..Default::default()
                    })
            }
            (None, true) => Some(wire::TableEntry::default()),
        };
        Ok(wire::DirectCounterEntry {
            table_entry,
            data: self.data,
        })
    }

    pub fn decode(
        encoded: &wire::DirectCounterEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let table_entry = encoded
            .table_entry
            .as_ref()
            .map(|entry| TableEntry::decode(entry, schema))
            .transpose()?;
        // Recover the counter name from the owning table, when known.
        let counter = encoded
            .table_entry
            .as_ref()
            .filter(|entry| entry.table_id != 0)
            .and_then(|entry| schema.direct_counter_of(entry.table_id))
            .map(|counter| counter.name.clone())
            .unwrap_or_default();
        Ok(Self {
            counter,
            table_entry,
            data: encoded.data,
        })
    }
}

/// One cell (or the whole array, with `index: None`) of a register.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterEntry {
    pub register: String,
    pub index: Option<i64>,
    pub data: Option<u128>,
}

impl RegisterEntry {
    pub fn new(register: impl Into<String>) -> Self {
        Self {
            register: register.into(),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_data(mut self, data: u128) -> Self {
        self.data = Some(data);
        self
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::RegisterEntry, CodecError> {
        if self.register.is_empty() {
            return Ok(wire::RegisterEntry {
                register_id: 0,
                index: self.index,
                data: self.data.map(value::to_canonical),
            });
        }
        let register = schema
            .registers
            .by_name(&self.register)
            .ok_or_else(|| CodecError::UnknownRegister(self.register.clone()))?;
        Ok(wire::RegisterEntry {
            register_id: register.id,
            index: self.index,
            data: self
                .data
                .map(|data| value::encode_checked(&register.name, data, register.bitwidth))
                .transpose()?,
        })
    }

    pub fn decode(
        encoded: &wire::RegisterEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let register = if encoded.register_id == 0 {
            String::new()
        } else {
            schema
                .registers
                .by_id(encoded.register_id)
                .map(|register| register.name.clone())
                .ok_or(CodecError::UnknownId {
                    kind: "register",
                    id: encoded.register_id,
                })?
        };
        Ok(Self {
            register,
            index: encoded.index,
            data: encoded
                .data
                .as_ref()
                .map(|data| value::from_canonical(data))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_field::TableMatch;

    fn schema() -> DeviceSchema {
        DeviceSchema::from_json(
            r#"{
                "tables": [{
                    "id": 37375156,
                    "name": "ipv4_lpm",
                    "match_fields": [
                        {"id": 1, "name": "dstAddr", "bitwidth": 32, "match_type": "lpm"}
                    ]
                }],
                "counters": [
                    {"id": 307710742, "name": "other_counter", "size": 16},
                    {"id": 302025528, "name": "ipv4_counter", "table": 37375156}
                ],
                "meters": [{"id": 341473317, "name": "other_meter", "size": 16}],
                "registers": [
                    {"id": 369140025, "name": "counter_bloom_filter", "bitwidth": 32, "size": 4096}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn meter_entry_roundtrip() {
        let schema = schema();
        let entry = MeterEntry {
            meter: "other_meter".to_string(),
            index: Some(2),
            config: Some(MeterConfig {
                cir: 1,
                cburst: 2,
                pir: 3,
                pburst: 4,
            }),
            counter_data: Some(MeterCounterData::default()),
        };
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.meter_id, 341473317);
        assert_eq!(MeterEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn register_entry_roundtrip() {
        let schema = schema();
        let entry = RegisterEntry::new("counter_bloom_filter")
            .with_index(1)
            .with_data(1);
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.register_id, 369140025);
        assert_eq!(encoded.data.as_ref().unwrap().as_ref(), &[1]);
        assert_eq!(RegisterEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn register_wildcard_index() {
        let schema = schema();
        let entry = RegisterEntry::new("counter_bloom_filter").with_data(1);
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.index, None);
        assert_eq!(RegisterEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn register_value_width_checked() {
        let schema = schema();
        let entry = RegisterEntry::new("counter_bloom_filter").with_data(1u128 << 40);
        assert!(matches!(
            entry.encode(&schema),
            Err(CodecError::ValueTooWide { .. })
        ));
    }

    #[test]
    fn direct_counter_derives_table_from_name() {
        let schema = schema();
        let entry = DirectCounterEntry::new("ipv4_counter");
        let encoded = entry.encode(&schema).unwrap();
        let wire_entry = encoded.table_entry.as_ref().unwrap();
        assert_eq!(wire_entry.table_id, 37375156);

        // Decode recovers both the table entry and the counter name.
        let decoded = DirectCounterEntry::decode(&encoded, &schema).unwrap();
        assert_eq!(decoded.counter, "ipv4_counter");
        assert_eq!(decoded.table_entry.as_ref().unwrap().table, "ipv4_lpm");
    }

    #[test]
    fn direct_counter_with_explicit_entry() {
        let schema = schema();
        let table_entry = TableEntry::new("ipv4_lpm")
            .with_match(TableMatch::new().field("dstAddr", (167_772_160u128, 24u32)));
        let entry = DirectCounterEntry {
            counter: "ipv4_counter".to_string(),
            table_entry: Some(table_entry.clone()),
            data: Some(CounterData {
                byte_count: 1,
                packet_count: 2,
            }),
        };
        let encoded = entry.encode(&schema).unwrap();
        let decoded = DirectCounterEntry::decode(&encoded, &schema).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn unknown_counter_named() {
        let schema = schema();
        let err = CounterEntry::new("bogus").encode(&schema).unwrap_err();
        assert_eq!(err.to_string(), "no counter named 'bogus'");
    }
}
