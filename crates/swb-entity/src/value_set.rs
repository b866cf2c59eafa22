//! Value set entries

use swb_proto::wire;
use swb_schema::DeviceSchema;

use crate::error::CodecError;
use crate::match_field::TableMatch;

/// One member of a value set: a match-set over the set's declared fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueSetMember {
    pub fields: TableMatch,
}

impl ValueSetMember {
    pub fn new(fields: TableMatch) -> Self {
        Self { fields }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueSetEntry {
    pub value_set: String,
    pub members: Vec<ValueSetMember>,
}

impl ValueSetEntry {
    pub fn new(value_set: impl Into<String>) -> Self {
        Self {
            value_set: value_set.into(),
            members: Vec::new(),
        }
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = ValueSetMember>) -> Self {
        self.members = members.into_iter().collect();
        self
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::ValueSetEntry, CodecError> {
        if self.value_set.is_empty() {
            return Ok(wire::ValueSetEntry::default());
        }
        let value_set = schema
            .value_sets
            .by_name(&self.value_set)
            .ok_or_else(|| CodecError::UnknownValueSet(self.value_set.clone()))?;
        let members = self
            .members
            .iter()
            .map(|member| {
                Ok(wire::ValueSetMember {
                    match_fields: member
                        .fields
                        .encode_fields(&value_set.fields, &value_set.name)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(wire::ValueSetEntry {
            value_set_id: value_set.id,
            members,
        })
    }

    pub fn decode(
        encoded: &wire::ValueSetEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        if encoded.value_set_id == 0 {
            return Ok(Self::default());
        }
        let value_set = schema
            .value_sets
            .by_id(encoded.value_set_id)
            .ok_or(CodecError::UnknownId {
                kind: "value set",
                id: encoded.value_set_id,
            })?;
        let members = encoded
            .members
            .iter()
            .map(|member| {
                Ok(ValueSetMember {
                    fields: TableMatch::decode_fields(&member.match_fields, &value_set.fields)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self {
            value_set: value_set.name.clone(),
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DeviceSchema {
        DeviceSchema::from_json(
            r#"{
                "value_sets": [{
                    "id": 56033750,
                    "name": "pvs",
                    "fields": [
                        {"id": 1, "name": "value", "bitwidth": 16, "match_type": "exact"}
                    ],
                    "size": 4
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn value_set_roundtrip() {
        let schema = schema();
        let entry = ValueSetEntry::new("pvs").with_members([
            ValueSetMember::new(TableMatch::new().field("value", 1u32)),
            ValueSetMember::new(TableMatch::new().field("value", 2u32)),
        ]);
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.value_set_id, 56033750);
        assert_eq!(encoded.members.len(), 2);
        assert_eq!(
            encoded.members[0].match_fields[0].value,
            Some(wire::FieldMatchValue::Exact {
                value: bytes::Bytes::from_static(&[1]),
            })
        );
        assert_eq!(ValueSetEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn unknown_value_set_named() {
        let schema = schema();
        let err = ValueSetEntry::new("nope").encode(&schema).unwrap_err();
        assert_eq!(err.to_string(), "no value set named 'nope'");
    }
}
