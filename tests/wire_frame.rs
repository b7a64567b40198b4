use pelago::{
    decode_frame, encode_frame, is_replication_marker, peek_metadata, FrameError, MessageMetadata,
    REPL_SOURCE_POSITION_KEY,
};

#[test]
fn frames_carry_metadata_and_payload() {
    let metadata = MessageMetadata::new("alpha", 42)
        .with_highest_sequence_id(45)
        .with_chunk(1, 3)
        .with_property("origin", "west");
    let frame = encode_frame(&metadata, b"payload bytes");

    let (decoded, payload) = decode_frame(&frame).expect("frame decodes");
    assert_eq!(decoded, metadata);
    assert_eq!(payload, b"payload bytes");
    assert_eq!(decoded.effective_highest_sequence_id(), 45);
}

#[test]
fn empty_payloads_are_valid() {
    let metadata = MessageMetadata::new("alpha", 0);
    let frame = encode_frame(&metadata, b"");
    let (decoded, payload) = decode_frame(&frame).expect("frame decodes");
    assert_eq!(decoded.sequence_id, 0);
    assert!(payload.is_empty());
}

#[test]
fn corrupted_payload_is_detected() {
    let metadata = MessageMetadata::new("alpha", 7);
    let mut frame = encode_frame(&metadata, b"payload");
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    assert!(matches!(
        decode_frame(&frame),
        Err(FrameError::ChecksumMismatch)
    ));
}

#[test]
fn truncated_frames_are_rejected() {
    let metadata = MessageMetadata::new("alpha", 7);
    let frame = encode_frame(&metadata, b"payload");

    assert!(matches!(
        decode_frame(&frame[..2]),
        Err(FrameError::TruncatedHeader)
    ));
    assert!(matches!(
        decode_frame(&frame[..frame.len() - 3]),
        Err(FrameError::TruncatedPayload { .. })
    ));
}

#[test]
fn oversized_header_length_is_rejected() {
    let mut frame = vec![0xffu8, 0xff, 0xff, 0xff];
    frame.extend_from_slice(b"junk");
    assert!(matches!(decode_frame(&frame), Err(FrameError::Oversized)));
}

#[test]
fn garbage_header_is_rejected() {
    let mut frame = Vec::new();
    frame.extend_from_slice(&4u32.to_be_bytes());
    frame.extend_from_slice(b"junk");
    assert!(matches!(decode_frame(&frame), Err(FrameError::Header(_))));
}

#[test]
fn peek_reads_only_the_metadata() {
    let metadata = MessageMetadata::new("alpha", 9).with_marker_type(12);
    let frame = encode_frame(&metadata, b"marker body");
    let peeked = peek_metadata(&frame).expect("peek decodes");
    assert_eq!(peeked.producer_name, "alpha");
    assert!(peeked.is_replication_marker());
}

#[test]
fn replication_marker_range_is_closed() {
    assert!(is_replication_marker(10));
    assert!(is_replication_marker(19));
    assert!(!is_replication_marker(9));
    assert!(!is_replication_marker(20));
    assert!(!is_replication_marker(-1));
}

#[test]
fn source_position_property_parses_strictly() {
    let valid = MessageMetadata::new("p", 0).with_property(REPL_SOURCE_POSITION_KEY, "10:5");
    assert_eq!(valid.repl_source_position(), Some((10, 5)));

    for raw in ["", "10", ":5", "10:", "a:5", "10:b", "-1:5", "1:2:3"] {
        let metadata = MessageMetadata::new("p", 0).with_property(REPL_SOURCE_POSITION_KEY, raw);
        assert_eq!(metadata.repl_source_position(), None, "raw value {raw:?}");
    }

    let absent = MessageMetadata::new("p", 0);
    assert_eq!(absent.repl_source_position(), None);
}

#[test]
fn highest_sequence_id_defaults_to_sequence_id() {
    let metadata = MessageMetadata::new("alpha", 8);
    assert_eq!(metadata.effective_highest_sequence_id(), 8);
    // A declared bound below the sequence id is clamped up.
    let inverted = MessageMetadata::new("alpha", 8).with_highest_sequence_id(3);
    assert_eq!(inverted.effective_highest_sequence_id(), 8);
}
