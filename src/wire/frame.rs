use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Property key carrying the source-cluster position of a replicated message.
pub const REPL_SOURCE_POSITION_KEY: &str = "__repl.source.position";

/// Marker-type range reserved for replication markers.
pub const REPLICATION_MARKER_MIN: i32 = 10;
pub const REPLICATION_MARKER_MAX: i32 = 19;

/// Upper bound on the serialized header, guarding against corrupt length words.
const MAX_HEADER_BYTES: usize = 1 << 20;

/// Returns true when the marker type denotes a replication marker.
pub fn is_replication_marker(marker_type: i32) -> bool {
    (REPLICATION_MARKER_MIN..=REPLICATION_MARKER_MAX).contains(&marker_type)
}

/// String key/value property attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    /// Builds a property pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Wire-level metadata carried in every entry's frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub producer_name: String,
    pub sequence_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highest_sequence_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<KeyValue>,
}

impl MessageMetadata {
    /// Creates metadata for a plain message.
    pub fn new(producer_name: impl Into<String>, sequence_id: u64) -> Self {
        Self {
            producer_name: producer_name.into(),
            sequence_id,
            highest_sequence_id: None,
            chunk_id: None,
            num_chunks: None,
            marker_type: None,
            properties: Vec::new(),
        }
    }

    /// Declares the batch upper bound.
    pub fn with_highest_sequence_id(mut self, highest: u64) -> Self {
        self.highest_sequence_id = Some(highest);
        self
    }

    /// Declares chunk coordinates for one chunk of a chunked message.
    pub fn with_chunk(mut self, chunk_id: u32, num_chunks: u32) -> Self {
        self.chunk_id = Some(chunk_id);
        self.num_chunks = Some(num_chunks);
        self
    }

    /// Stamps a marker type.
    pub fn with_marker_type(mut self, marker_type: i32) -> Self {
        self.marker_type = Some(marker_type);
        self
    }

    /// Appends a string property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(KeyValue::new(key, value));
        self
    }

    /// Returns the value of the named property, if present.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
    }

    /// Effective upper bound of the sequence-id range covered by the message.
    pub fn effective_highest_sequence_id(&self) -> u64 {
        self.highest_sequence_id
            .map_or(self.sequence_id, |highest| highest.max(self.sequence_id))
    }

    /// True when the message is a broker-generated marker.
    pub fn is_marker(&self) -> bool {
        self.marker_type.is_some()
    }

    /// True when the message is a replication marker.
    pub fn is_replication_marker(&self) -> bool {
        self.marker_type.is_some_and(is_replication_marker)
    }

    /// Parses the `__repl.source.position` property into a `(lid, eid)` pair.
    /// Returns `None` when the property is absent or malformed.
    pub fn repl_source_position(&self) -> Option<(u64, u64)> {
        let raw = self.property(REPL_SOURCE_POSITION_KEY)?;
        let (lid, eid) = raw.split_once(':')?;
        Some((lid.parse().ok()?, eid.parse().ok()?))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameHeader {
    metadata: MessageMetadata,
    payload_len: u64,
    payload_sha256: String,
}

/// Errors surfaced while decoding an entry frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame header truncated")]
    TruncatedHeader,
    #[error("frame header exceeds {MAX_HEADER_BYTES} bytes")]
    Oversized,
    #[error("frame header malformed: {0}")]
    Header(#[from] serde_json::Error),
    #[error("frame payload truncated (expected {expected} bytes, found {found})")]
    TruncatedPayload { expected: u64, found: u64 },
    #[error("frame payload checksum mismatch")]
    ChecksumMismatch,
}

/// Encodes metadata and payload into a self-describing entry frame:
/// a big-endian header length, the JSON header, then the raw payload.
pub fn encode_frame(metadata: &MessageMetadata, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        metadata: metadata.clone(),
        payload_len: payload.len() as u64,
        payload_sha256: checksum_hex(payload),
    };
    let header_bytes =
        serde_json::to_vec(&header).expect("frame header serialization must succeed");
    let mut frame = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    frame.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(payload);
    frame
}

/// Decodes an entry frame, validating payload length and checksum.
pub fn decode_frame(frame: &[u8]) -> Result<(MessageMetadata, Vec<u8>), FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::TruncatedHeader);
    }
    let header_len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    if header_len > MAX_HEADER_BYTES {
        return Err(FrameError::Oversized);
    }
    if frame.len() < 4 + header_len {
        return Err(FrameError::TruncatedHeader);
    }
    let header: FrameHeader = serde_json::from_slice(&frame[4..4 + header_len])?;
    let payload = &frame[4 + header_len..];
    if payload.len() as u64 != header.payload_len {
        return Err(FrameError::TruncatedPayload {
            expected: header.payload_len,
            found: payload.len() as u64,
        });
    }
    if checksum_hex(payload) != header.payload_sha256 {
        return Err(FrameError::ChecksumMismatch);
    }
    Ok((header.metadata, payload.to_vec()))
}

/// Decodes only the metadata header of an entry frame.
pub fn peek_metadata(frame: &[u8]) -> Result<MessageMetadata, FrameError> {
    decode_frame(frame).map(|(metadata, _)| metadata)
}

fn checksum_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut encoded = String::with_capacity(digest.len() * 2);
    for byte in digest {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded
}
