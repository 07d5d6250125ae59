// SPDX-License-Identifier: MIT

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn define_id_hash_map_lookup() {
    let id = TestId::from_string("tst-k");
    let mut map = HashMap::new();
    map.insert(id, 42);
    assert_eq!(map.get("tst-k"), Some(&42));
}

#[test]
fn define_id_new_has_prefix_and_is_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert!(a.as_str().starts_with("tst-"));
    assert_ne!(a, b);
}

#[test]
fn define_id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abcdefgh");
    assert_eq!(id.suffix(), "abcdefgh");
}

#[test]
fn define_id_short_truncates_suffix() {
    let id = TestId::from_string("tst-abcdefghijklmnop");
    assert_eq!(id.short(4), "abcd");
}

#[test]
fn define_id_short_returns_full_when_shorter() {
    let id = TestId::from_string("tst-ab");
    assert_eq!(id.short(8), "ab");
}

#[test]
fn define_id_display_roundtrips_through_string() {
    let id = TestId::from_string("tst-xyz");
    let roundtripped = TestId::from(id.to_string());
    assert_eq!(id, roundtripped);
}

#[test]
fn define_id_serde_roundtrip() {
    let id = TestId::from_string("tst-abc123");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"tst-abc123\"");
    let parsed: TestId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn define_id_rejects_oversized_string_on_deserialize() {
    let too_long = "x".repeat(ID_MAX_LEN + 1);
    let json = format!("\"{}\"", too_long);
    let parsed: Result<TestId, _> = serde_json::from_str(&json);
    assert!(parsed.is_err());
}

// --- short() free function ---

#[test]
fn short_fn_on_str() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
    assert_eq!(short(s, 100), s);
    assert_eq!(short("abc", 8), "abc");
}
