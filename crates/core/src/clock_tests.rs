// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn fake_clock_advances_both_instant_and_epoch() {
    let clock = FakeClock::new();
    let before = clock.now();
    let before_ms = clock.epoch_ms();

    clock.advance(Duration::from_millis(500));

    assert_eq!(clock.now(), before + Duration::from_millis(500));
    assert_eq!(clock.epoch_ms(), before_ms + 500);
}

#[test]
fn fake_clock_set_epoch_ms_is_absolute() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let clone = clock.clone();
    clock.advance(Duration::from_secs(1));
    assert_eq!(clock.epoch_ms(), clone.epoch_ms());
}

#[test]
fn system_clock_epoch_ms_is_monotonic_nondecreasing() {
    let clock = SystemClock;
    let a = clock.epoch_ms();
    let b = clock.epoch_ms();
    assert!(b >= a);
}
