mod support;

use isapnp::error::IsaPnpError;
use isapnp::isolation::try_isolate;
use support::{card_identifier, MockBus};

#[test]
fn isolates_single_card() {
    support::init_logger();
    let card = card_identifier(0x4304, 0x0a03, 0xdead_beef);
    let mut bus = MockBus::new(vec![card]);
    let count = try_isolate(&mut bus).expect("isolation should succeed");
    assert_eq!(count, 1);
    assert_eq!(bus.isolated, vec![card]);
}

#[test]
fn isolates_two_distinct_cards() {
    let card_a = card_identifier(0x4304, 0x0a03, 0x0000_0001);
    let card_b = card_identifier(0x0021, 0x1234, 0x0000_0002);
    let mut bus = MockBus::new(vec![card_a, card_b]);
    let count = try_isolate(&mut bus).expect("isolation should succeed");
    assert_eq!(count, 2);
    assert_eq!(bus.isolated.len(), 2);
}

#[test]
fn no_cards_present_isolates_zero() {
    let mut bus = MockBus::new(Vec::new());
    let count = try_isolate(&mut bus).expect("isolation should succeed with no cards");
    assert_eq!(count, 0);
}

#[test]
fn read_port_conflict_reports_resource_conflict() {
    let mut bus = MockBus::with_phantom_life();
    let result = try_isolate(&mut bus);
    assert_eq!(result, Err(IsaPnpError::ResourceConflict));
}

#[test]
fn checksum_mismatch_reports_checksum_mismatch() {
    let mut card = card_identifier(0x4304, 0x0a03, 0xdead_beef);
    card[8] ^= 0xff;
    let mut bus = MockBus::new(vec![card]);
    let result = try_isolate(&mut bus);
    assert_eq!(result, Err(IsaPnpError::ChecksumMismatch));
}
