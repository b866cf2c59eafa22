//! Digests, digest lists and idle-timeout notifications

use std::collections::BTreeMap;

use swb_proto::{stream, wire};
use swb_schema::DeviceSchema;

use crate::entry::TableEntry;
use crate::error::CodecError;
use crate::value;

/// Digest subscription configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestEntry {
    pub digest: String,
    pub max_list_size: i32,
    pub max_timeout_ns: i64,
    pub ack_timeout_ns: i64,
}

impl DigestEntry {
    pub fn new(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            ..Default::default()
        }
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<wire::DigestEntry, CodecError> {
        let digest_id = if self.digest.is_empty() {
            0
        } else {
            schema
                .digests
                .by_name(&self.digest)
                .map(|digest| digest.id)
                .ok_or_else(|| CodecError::UnknownDigest(self.digest.clone()))?
        };
        let config = (self.max_list_size != 0 || self.max_timeout_ns != 0 || self.ack_timeout_ns != 0)
            .then_some(wire::DigestConfig {
                max_timeout_ns: self.max_timeout_ns,
                max_list_size: self.max_list_size,
                ack_timeout_ns: self.ack_timeout_ns,
            });
        Ok(wire::DigestEntry { digest_id, config })
    }

    pub fn decode(
        encoded: &wire::DigestEntry,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let digest = if encoded.digest_id == 0 {
            String::new()
        } else {
            schema
                .digests
                .by_id(encoded.digest_id)
                .map(|digest| digest.name.clone())
                .ok_or(CodecError::UnknownId {
                    kind: "digest",
                    id: encoded.digest_id,
                })?
        };
        let config = encoded.config.unwrap_or_default();
        Ok(Self {
            digest,
            max_list_size: config.max_list_size,
            max_timeout_ns: config.max_timeout_ns,
            ack_timeout_ns: config.ack_timeout_ns,
        })
    }
}

/// One batched digest notification, decoded to name-to-value maps using the
/// digest's declared field list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestList {
    pub digest: String,
    pub list_id: u64,
    pub timestamp: u64,
    pub data: Vec<BTreeMap<String, u128>>,
}

impl DigestList {
    pub fn decode(
        encoded: &stream::DigestList,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let digest = schema
            .digests
            .by_id(encoded.digest_id)
            .ok_or(CodecError::UnknownId {
                kind: "digest",
                id: encoded.digest_id,
            })?;
        let data = encoded
            .data
            .iter()
            .map(|item| {
                if item.members.len() != digest.fields.len() {
                    return Err(CodecError::DigestArity {
                        digest: digest.name.clone(),
                        got: item.members.len(),
                        want: digest.fields.len(),
                    });
                }
                digest
                    .fields
                    .iter()
                    .zip(&item.members)
                    .map(|(field, member)| {
                        Ok((field.name.clone(), value::from_canonical(member)?))
                    })
                    .collect()
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(Self {
            digest: digest.name.clone(),
            list_id: encoded.list_id,
            timestamp: encoded.timestamp,
            data,
        })
    }

    /// The acknowledgement for this list.
    pub fn ack(&self) -> DigestListAck {
        DigestListAck {
            digest: self.digest.clone(),
            list_id: self.list_id,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Acknowledgement for a received digest list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestListAck {
    pub digest: String,
    pub list_id: u64,
}

impl DigestListAck {
    pub fn new(digest: impl Into<String>, list_id: u64) -> Self {
        Self {
            digest: digest.into(),
            list_id,
        }
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<stream::DigestListAck, CodecError> {
        let digest = schema
            .digests
            .by_name(&self.digest)
            .ok_or_else(|| CodecError::UnknownDigest(self.digest.clone()))?;
        Ok(stream::DigestListAck {
            digest_id: digest.id,
            list_id: self.list_id,
        })
    }
}

/// Device notification that table entries idled out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdleTimeoutNotification {
    pub table_entries: Vec<TableEntry>,
    pub timestamp: u64,
}

impl IdleTimeoutNotification {
    pub fn decode(
        encoded: &stream::IdleTimeoutNotification,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            table_entries: encoded
                .table_entry
                .iter()
                .map(|entry| TableEntry::decode(entry, schema))
                .collect::<Result<Vec<_>, CodecError>>()?,
            timestamp: encoded.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_field::TableMatch;
    use bytes::Bytes;

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
                "digests": [{
                    "id": 401827287,
                    "name": "Digest_t",
                    "fields": [
                        {"id": 1, "name": "srcAddr", "bitwidth": 48},
                        {"id": 2, "name": "ingress_port", "bitwidth": 9}
                    ]
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn digest_entry_roundtrip() {
        let schema = schema();
        let entry = DigestEntry {
            digest: "Digest_t".to_string(),
            max_list_size: 1,
            max_timeout_ns: 2,
            ack_timeout_ns: 3,
        };
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded.digest_id, 401827287);
        assert_eq!(DigestEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn empty_digest_entry_is_wildcard() {
        let schema = schema();
        let entry = DigestEntry::default();
        let encoded = entry.encode(&schema).unwrap();
        assert_eq!(encoded, wire::DigestEntry::default());
        assert_eq!(DigestEntry::decode(&encoded, &schema).unwrap(), entry);
    }

    #[test]
    fn digest_list_resolves_field_names() {
        let schema = schema();
        let encoded = stream::DigestList {
            digest_id: 401827287,
            list_id: 2,
            timestamp: 3,
            data: vec![stream::DigestItem {
                members: vec![Bytes::from_static(&[0xaa]), Bytes::from_static(&[7])],
            }],
        };
        let list = DigestList::decode(&encoded, &schema).unwrap();
        assert_eq!(list.digest, "Digest_t");
        assert_eq!(list.data[0]["srcAddr"], 0xaa);
        assert_eq!(list.data[0]["ingress_port"], 7);
        assert_eq!(list.ack().encode(&schema).unwrap().digest_id, 401827287);
    }

    #[test]
    fn digest_arity_mismatch_is_fatal() {
        let schema = schema();
        let encoded = stream::DigestList {
            digest_id: 401827287,
            data: vec![stream::DigestItem {
                members: vec![Bytes::from_static(&[1])],
            }],
            ..Default::default()
        };
        assert!(matches!(
            DigestList::decode(&encoded, &schema),
            Err(CodecError::DigestArity { got: 1, want: 2, .. })
        ));
    }

    #[test]
    fn idle_timeout_decodes_entries() {
        let schema = schema();
        let entry = TableEntry::new("ipv4_lpm")
            .with_match(TableMatch::new().field("dstAddr", (167_772_160u128, 24u32)));
        let encoded = stream::IdleTimeoutNotification {
            table_entry: vec![entry.encode(&schema).unwrap()],
            timestamp: 1000,
        };
        let notification = IdleTimeoutNotification::decode(&encoded, &schema).unwrap();
        assert_eq!(notification.timestamp, 1000);
        assert_eq!(notification.table_entries, vec![entry]);
    }
}
