use pelago::InFlightWindow;

#[test]
fn reservations_are_bounded_by_capacity() {
    let window = InFlightWindow::new(2);
    let first = window.reserve().expect("first slot");
    let _second = window.reserve().expect("second slot");
    assert_eq!(window.in_flight(), 2);

    let err = window.reserve().expect_err("window saturated");
    assert_eq!(err.capacity, 2);

    drop(first);
    assert_eq!(window.in_flight(), 1);
    window.reserve().expect("slot freed by drop");
}

#[test]
fn clones_share_the_same_slots() {
    let window = InFlightWindow::new(1);
    let clone = window.clone();
    let _held = window.reserve().expect("slot");
    assert!(clone.reserve().is_err());
    assert_eq!(clone.in_flight(), 1);
}
