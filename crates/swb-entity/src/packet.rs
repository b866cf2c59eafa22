//! Packet I/O with named metadata
//!
//! Packets punted to or injected by the controller carry a metadata prefix
//! described by the schema's packet-in/packet-out field lists. The codec
//! validates packet-out metadata the same way it validates action arguments:
//! missing and extra names are distinct, named failures.

use std::collections::BTreeMap;

use bytes::Bytes;
use swb_proto::stream;
use swb_schema::DeviceSchema;

use crate::error::CodecError;
use crate::value;

/// Packet injected into the device's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketOut {
    pub payload: Bytes,
    pub metadata: BTreeMap<String, u128>,
}

impl PacketOut {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style metadata field.
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<u128>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn encode(&self, schema: &DeviceSchema) -> Result<stream::PacketOut, CodecError> {
        let io = schema
            .packet_out
            .as_ref()
            .ok_or(CodecError::NoPacketIo {
                direction: "packet-out",
            })?;

        let extra: Vec<String> = self
            .metadata
            .keys()
            .filter(|name| io.field(name).is_none())
            .cloned()
            .collect();
        if !extra.is_empty() {
            return Err(CodecError::ExtraMetadata {
                direction: "packet-out",
                names: extra,
            });
        }

        let metadata = io
            .fields
            .iter()
            .map(|field| {
                let supplied =
                    self.metadata
                        .get(&field.name)
                        .ok_or_else(|| CodecError::MissingMetadata {
                            direction: "packet-out",
                            name: field.name.clone(),
                        })?;
                Ok(stream::PacketMetadata {
                    metadata_id: field.id,
                    value: value::encode_checked(&field.name, *supplied, field.bitwidth)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        Ok(stream::PacketOut {
            payload: self.payload.clone(),
            metadata,
        })
    }
}

/// Packet punted from the device, with metadata resolved to names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketIn {
    pub payload: Bytes,
    pub metadata: BTreeMap<String, u128>,
}

impl PacketIn {
    pub fn decode(
        encoded: &stream::PacketIn,
        schema: &DeviceSchema,
    ) -> Result<Self, CodecError> {
        let mut metadata = BTreeMap::new();
        if !encoded.metadata.is_empty() {
            let io = schema
                .packet_in
                .as_ref()
                .ok_or(CodecError::NoPacketIo {
                    direction: "packet-in",
                })?;
            for field in &encoded.metadata {
                let declared =
                    io.field_by_id(field.metadata_id)
                        .ok_or(CodecError::UnknownId {
                            kind: "packet-in metadata field",
                            id: field.metadata_id,
                        })?;
                metadata.insert(declared.name.clone(), value::from_canonical(&field.value)?);
            }
        }
        Ok(Self {
            payload: encoded.payload.clone(),
            metadata,
        })
    }

    pub fn field(&self, name: &str) -> Option<u128> {
        self.metadata.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> DeviceSchema {
        DeviceSchema::from_json(
            r#"{
                "packet_in": {
                    "fields": [
                        {"id": 1, "name": "ingress_port", "bitwidth": 9},
                        {"id": 2, "name": "_pad", "bitwidth": 7}
                    ]
                },
                "packet_out": {
                    "fields": [
                        {"id": 1, "name": "egress_port", "bitwidth": 9},
                        {"id": 2, "name": "_pad", "bitwidth": 7}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn packet_out_encodes_metadata_in_schema_order() {
        let schema = schema();
        let packet = PacketOut::new(&b"abc"[..])
            .meta("egress_port", 1u32)
            .meta("_pad", 0u32);
        let encoded = packet.encode(&schema).unwrap();
        assert_eq!(encoded.payload.as_ref(), b"abc");
        assert_eq!(encoded.metadata.len(), 2);
        assert_eq!(encoded.metadata[0].metadata_id, 1);
        assert_eq!(encoded.metadata[0].value.as_ref(), &[1]);
        assert_eq!(encoded.metadata[1].metadata_id, 2);
        assert_eq!(encoded.metadata[1].value.as_ref(), &[0]);
    }

    #[test]
    fn packet_out_missing_metadata_named() {
        let schema = schema();
        let packet = PacketOut::new(&b"abc"[..]).meta("egress_port", 1u32);
        let err = packet.encode(&schema).unwrap_err();
        assert_eq!(err.to_string(), "packet-out missing metadata field '_pad'");
    }

    #[test]
    fn packet_out_misnamed_metadata() {
        let schema = schema();
        let packet = PacketOut::new(&b"abc"[..])
            .meta("ingress_port", 1u32)
            .meta("_pad", 0u32);
        let err = packet.encode(&schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"packet-out has extra metadata fields ["ingress_port"]"#
        );
    }

    #[test]
    fn packet_out_extra_metadata_named() {
        let schema = schema();
        let packet = PacketOut::new(&b"abc"[..])
            .meta("egress_port", 1u32)
            .meta("_pad", 0u32)
            .meta("extra", 1u32);
        let err = packet.encode(&schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"packet-out has extra metadata fields ["extra"]"#
        );
    }

    #[test]
    fn packet_in_without_metadata() {
        let schema = schema();
        let encoded = stream::PacketIn {
            payload: Bytes::from_static(b"abc"),
            metadata: vec![],
        };
        let packet = PacketIn::decode(&encoded, &schema).unwrap();
        assert_eq!(packet.payload.as_ref(), b"abc");
        assert!(packet.metadata.is_empty());
    }

    #[test]
    fn packet_in_resolves_metadata_names() {
        let schema = schema();
        let encoded = stream::PacketIn {
            payload: Bytes::from_static(b"abc"),
            metadata: vec![
                stream::PacketMetadata {
                    metadata_id: 1,
                    value: Bytes::from_static(&[97]),
                },
                stream::PacketMetadata {
                    metadata_id: 2,
                    value: Bytes::from_static(&[98]),
                },
            ],
        };
        let packet = PacketIn::decode(&encoded, &schema).unwrap();
        assert_eq!(packet.field("ingress_port"), Some(97));
        assert_eq!(packet.field("_pad"), Some(98));
    }
}
