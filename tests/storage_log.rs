use pelago::{AppendLog, InMemoryLog, LogError, Position, SEGMENT_ROLL_INTERVAL};
use std::collections::BTreeMap;

#[test]
fn positions_are_monotonic_and_roll_segments() {
    let log = InMemoryLog::new();
    let mut previous = None;
    for idx in 0..(SEGMENT_ROLL_INTERVAL + 5) {
        let position = log.append(vec![idx as u8]).expect("append");
        if let Some(previous) = previous {
            assert!(position > previous);
        }
        previous = Some(position);
    }
    assert_eq!(
        log.last_confirmed_position(),
        Some(Position::new(1, 4)),
        "positions roll into the next segment"
    );
}

#[test]
fn replay_starts_after_the_watermark() {
    let log = InMemoryLog::new();
    log.open_cursor("replay").expect("open cursor");
    let mut positions = Vec::new();
    for idx in 0..5u8 {
        positions.push(log.append(vec![idx]).expect("append"));
    }
    log.mark_delete("replay", positions[2], BTreeMap::new())
        .expect("mark delete");

    let mut seen = Vec::new();
    let last = log
        .replay_range("replay", &mut |position, payload| {
            seen.push((position, payload.to_vec()));
        })
        .expect("replay");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].1, vec![3]);
    assert_eq!(last, Some(positions[4]));
}

#[test]
fn replay_of_an_empty_range_returns_none() {
    let log = InMemoryLog::new();
    log.open_cursor("replay").expect("open cursor");
    let last = log
        .replay_range("replay", &mut |_, _| panic!("nothing to replay"))
        .expect("replay");
    assert_eq!(last, None);
}

#[test]
fn cursors_persist_properties_across_reopen() {
    let log = InMemoryLog::new();
    log.open_cursor("dedup").expect("open cursor");
    let position = log.append(b"entry".to_vec()).expect("append");
    let mut properties = BTreeMap::new();
    properties.insert("alpha".to_string(), 7i64);
    log.mark_delete("dedup", position, properties.clone())
        .expect("mark delete");

    let reopened = log.open_cursor("dedup").expect("reopen cursor");
    assert_eq!(reopened.properties, properties);
    assert_eq!(reopened.mark_delete_position, Some(position));
}

#[test]
fn mark_delete_never_regresses() {
    let log = InMemoryLog::new();
    log.open_cursor("dedup").expect("open cursor");
    let first = log.append(b"one".to_vec()).expect("append");
    let second = log.append(b"two".to_vec()).expect("append");

    log.mark_delete("dedup", second, BTreeMap::new())
        .expect("advance");
    log.mark_delete("dedup", first, BTreeMap::new())
        .expect("stale advance is absorbed");
    assert_eq!(
        log.mark_delete_position("dedup").expect("watermark"),
        Some(second)
    );
}

#[test]
fn deleting_a_missing_cursor_reports_not_found() {
    let log = InMemoryLog::new();
    log.open_cursor("dedup").expect("open cursor");
    log.delete_cursor("dedup").expect("delete");
    assert!(matches!(
        log.delete_cursor("dedup"),
        Err(LogError::CursorNotFound(_))
    ));
}

#[test]
fn fault_switches_cover_each_operation() {
    let log = InMemoryLog::new();
    log.open_cursor("dedup").expect("open cursor");

    log.fail_appends(true);
    assert!(matches!(
        log.append(b"entry".to_vec()),
        Err(LogError::Append(_))
    ));
    log.fail_appends(false);
    let position = log.append(b"entry".to_vec()).expect("append");

    log.fail_mark_delete(true);
    assert!(matches!(
        log.mark_delete("dedup", position, BTreeMap::new()),
        Err(LogError::MarkDelete(_))
    ));
    log.fail_mark_delete(false);

    log.fail_cursor_ops(true);
    assert!(matches!(log.open_cursor("other"), Err(LogError::Cursor(_))));
}
