//! Wire model and transport boundary for the switchboard control-plane client
//!
//! This crate defines the messages that travel between a controller and a
//! programmable switch:
//!
//! - **Wire entities** ([`wire`]): the compact, id-addressed representation of
//!   forwarding-plane state (table entries, meters, counters, replication
//!   groups, digests, value sets). Containers that carry a protobuf-style
//!   "oneof" are modeled as structs of `Option` fields so a decoder can tell
//!   apart "none populated" from "more than one populated".
//! - **Stream frames** ([`stream`]): the heterogeneous payloads multiplexed
//!   over the single bidirectional stream per switch (arbitration, packet
//!   I/O, digest lists, idle-timeout notifications, stream errors).
//! - **The transport seam** ([`Transport`]): the injected dependency that
//!   actually moves these messages. The client core never opens sockets; it
//!   drives whatever transport it is handed.
//!
//! Translation between wire entities and the name-addressed domain model
//! lives in `swb-entity`; this crate is deliberately schema-free.

pub mod error;
pub mod stream;
pub mod transport;
pub mod wire;

pub use error::{RpcError, StatusCode};
pub use stream::{StreamRequest, StreamResponse, Uint128};
pub use transport::{
    Connectivity, ForwardingPipelineConfig, ReadRequest, StreamPair, Transport, WriteRequest,
};

/// A client-proposed election ordinal, 128 bits wide.
///
/// Each controller instance for a given (device, role) proposes an election
/// id; the device arbitrates and the highest id wins primary. Uniqueness per
/// client is the application's responsibility; the arbitration reply carries
/// the winning id, so a stale proposal is always detectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ElectionId(pub u128);

impl ElectionId {
    /// Split into the wire (high, low) pair.
    pub fn to_wire(self) -> Uint128 {
        Uint128 {
            high: (self.0 >> 64) as u64,
            low: self.0 as u64,
        }
    }
}

impl From<u128> for ElectionId {
    fn from(value: u128) -> Self {
        ElectionId(value)
    }
}

impl From<Uint128> for ElectionId {
    fn from(value: Uint128) -> Self {
        ElectionId(((value.high as u128) << 64) | value.low as u128)
    }
}

impl std::fmt::Display for ElectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn election_id_wire_roundtrip() {
        let id = ElectionId(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210);
        let wire = id.to_wire();
        assert_eq!(wire.high, 0x0123_4567_89ab_cdef);
        assert_eq!(wire.low, 0xfedc_ba98_7654_3210);
        assert_eq!(ElectionId::from(wire), id);
    }

    #[test]
    fn election_id_orders_numerically() {
        assert!(ElectionId(2) > ElectionId(1));
        assert!(ElectionId(1 << 64) > ElectionId(u64::MAX as u128));
    }
}
