//! Multicast groups and clone sessions
//!
//! Both live inside the packet-replication-engine container on the wire;
//! the domain model keeps them as separate entities and the codec dispatches
//! on which sub-case is populated.

use swb_proto::wire;

use crate::error::CodecError;

pub use wire::Replica;

/// Multicast group: replicate to each (egress port, instance) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MulticastGroupEntry {
    pub group_id: u32,
    pub replicas: Vec<Replica>,
}

impl MulticastGroupEntry {
    pub fn new(group_id: u32) -> Self {
        Self {
            group_id,
            replicas: Vec::new(),
        }
    }

    pub fn with_replicas(mut self, replicas: impl IntoIterator<Item = impl Into<Replica>>) -> Self {
        self.replicas = replicas.into_iter().map(Into::into).collect();
        self
    }

    pub fn encode(&self) -> wire::PacketReplicationEngineEntry {
        wire::PacketReplicationEngineEntry {
            multicast_group_entry: Some(wire::MulticastGroupEntry {
                multicast_group_id: self.group_id,
                replicas: self.replicas.clone(),
            }),
            clone_session_entry: None,
        }
    }

    pub(crate) fn decode(encoded: &wire::MulticastGroupEntry) -> Self {
        Self {
            group_id: encoded.multicast_group_id,
            replicas: encoded.replicas.clone(),
        }
    }
}

/// Clone session: mirror packets to the session's replicas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloneSessionEntry {
    pub session_id: u32,
    pub replicas: Vec<Replica>,
    pub class_of_service: u32,
    pub packet_length_bytes: i32,
}

impl CloneSessionEntry {
    pub fn new(session_id: u32) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    pub fn with_replicas(mut self, replicas: impl IntoIterator<Item = impl Into<Replica>>) -> Self {
        self.replicas = replicas.into_iter().map(Into::into).collect();
        self
    }

    pub fn encode(&self) -> wire::PacketReplicationEngineEntry {
        wire::PacketReplicationEngineEntry {
            multicast_group_entry: None,
            clone_session_entry: Some(wire::CloneSessionEntry {
                session_id: self.session_id,
                replicas: self.replicas.clone(),
                class_of_service: self.class_of_service,
                packet_length_bytes: self.packet_length_bytes,
            }),
        }
    }

    pub(crate) fn decode(encoded: &wire::CloneSessionEntry) -> Self {
        Self {
            session_id: encoded.session_id,
            replicas: encoded.replicas.clone(),
            class_of_service: encoded.class_of_service,
            packet_length_bytes: encoded.packet_length_bytes,
        }
    }
}

/// Decoded replication entity, one of the two sub-cases.
#[derive(Debug)]
pub(crate) enum ReplicationEntry {
    Multicast(MulticastGroupEntry),
    Clone(CloneSessionEntry),
}

pub(crate) fn decode_replication(
    encoded: &wire::PacketReplicationEngineEntry,
) -> Result<ReplicationEntry, CodecError> {
    match (&encoded.multicast_group_entry, &encoded.clone_session_entry) {
        (Some(multicast), None) => Ok(ReplicationEntry::Multicast(
            MulticastGroupEntry::decode(multicast),
        )),
        (None, Some(clone)) => Ok(ReplicationEntry::Clone(CloneSessionEntry::decode(clone))),
        (None, None) => Err(CodecError::EmptyContainer("packet_replication_engine type")),
        (Some(_), Some(_)) => Err(CodecError::AmbiguousContainer(
            "packet_replication_engine entry",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_shorthand() {
        assert_eq!(
            Replica::from(1),
            Replica {
                egress_port: 1,
                instance: 0
            }
        );
        assert_eq!(
            Replica::from((1, 2)),
            Replica {
                egress_port: 1,
                instance: 2
            }
        );
    }

    #[test]
    fn multicast_roundtrip() {
        let entry = MulticastGroupEntry::new(7).with_replicas([(1u32, 1u32), (2, 1)]);
        let encoded = entry.encode();
        match decode_replication(&encoded).unwrap() {
            ReplicationEntry::Multicast(decoded) => assert_eq!(decoded, entry),
            ReplicationEntry::Clone(_) => panic!("wrong sub-case"),
        }
    }

    #[test]
    fn empty_container_is_fatal() {
        let err = decode_replication(&wire::PacketReplicationEngineEntry::default()).unwrap_err();
        assert_eq!(err.to_string(), "missing packet_replication_engine type");
    }

    #[test]
    fn double_container_is_fatal() {
        let both = wire::PacketReplicationEngineEntry {
            multicast_group_entry: Some(Default::default()),
            clone_session_entry: Some(Default::default()),
        };
        assert!(matches!(
            decode_replication(&both),
            Err(CodecError::AmbiguousContainer(_))
        ));
    }
}
