//! Frames multiplexed over the per-switch bidirectional stream
//!
//! A single stream carries heterogeneous payloads in both directions. Like
//! the entity container, the request/response frames keep each payload kind
//! as an `Option`; exactly one is populated per frame.

use bytes::Bytes;

use crate::wire::TableEntry;

/// Wire form of a 128-bit election id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uint128 {
    pub high: u64,
    pub low: u64,
}

/// Optional named role with an opaque device-interpreted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Role {
    pub name: String,
    pub config: Bytes,
}

/// Status carried inside an arbitration reply: `Ok` means this client is
/// primary, `AlreadyExists` means backup, anything else is a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

/// Mastership arbitration, sent by the client as a proposal and by the
/// device as the authoritative reply. The reply's `election_id` is always
/// the current primary's id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterArbitrationUpdate {
    pub device_id: u64,
    pub role: Option<Role>,
    pub election_id: Option<Uint128>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketMetadata {
    pub metadata_id: u32,
    pub value: Bytes,
}

/// Packet injected by the controller into the device's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketOut {
    pub payload: Bytes,
    pub metadata: Vec<PacketMetadata>,
}

/// Packet punted from the device to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketIn {
    pub payload: Bytes,
    pub metadata: Vec<PacketMetadata>,
}

/// One batched digest notification. `data` members are positional byte
/// strings matching the digest's declared field list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestList {
    pub digest_id: u32,
    pub list_id: u64,
    pub timestamp: u64,
    pub data: Vec<DigestItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestItem {
    pub members: Vec<Bytes>,
}

/// Client acknowledgement of a received digest list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestListAck {
    pub digest_id: u32,
    pub list_id: u64,
}

/// Device notification that table entries aged out.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdleTimeoutNotification {
    pub table_entry: Vec<TableEntry>,
    pub timestamp: u64,
}

/// Device-reported stream-level error (for example, a write on a stream
/// that lost arbitration).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamError {
    pub canonical_code: i32,
    pub message: String,
}

/// Client to device frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamRequest {
    pub arbitration: Option<MasterArbitrationUpdate>,
    pub packet: Option<PacketOut>,
    pub digest_ack: Option<DigestListAck>,
}

impl StreamRequest {
    pub fn arbitration(update: MasterArbitrationUpdate) -> Self {
        Self {
            arbitration: Some(update),
            ..Default::default()
        }
    }

    pub fn packet(packet: PacketOut) -> Self {
        Self {
            packet: Some(packet),
            ..Default::default()
        }
    }

    pub fn digest_ack(ack: DigestListAck) -> Self {
        Self {
            digest_ack: Some(ack),
            ..Default::default()
        }
    }
}

/// Device to client frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamResponse {
    pub arbitration: Option<MasterArbitrationUpdate>,
    pub packet: Option<PacketIn>,
    pub digest: Option<DigestList>,
    pub idle_timeout_notification: Option<IdleTimeoutNotification>,
    pub error: Option<StreamError>,
}

impl StreamResponse {
    pub fn arbitration(update: MasterArbitrationUpdate) -> Self {
        Self {
            arbitration: Some(update),
            ..Default::default()
        }
    }

    pub fn packet(packet: PacketIn) -> Self {
        Self {
            packet: Some(packet),
            ..Default::default()
        }
    }

    pub fn digest(digest: DigestList) -> Self {
        Self {
            digest: Some(digest),
            ..Default::default()
        }
    }
}
