//! Property-based tests for webhook signatures

use proptest::prelude::*;

use ripple::webhooks::signature::{canonical_json, sign, verify};

fn json_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[ -~]{0,16}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4)
                .prop_map(serde_json::Value::Array),
            proptest::collection::hash_map("[a-z]{1,8}", inner, 0..4).prop_map(|map| {
                serde_json::Value::Object(map.into_iter().collect())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn round_trip_verifies(secret in "[ -~]{1,32}", payload in json_value_strategy()) {
        let signature = sign(&secret, &payload);
        prop_assert!(verify(&secret, &payload, &signature));
    }

    #[test]
    fn different_secret_fails(
        secret_a in "[a-z]{8,16}",
        secret_b in "[A-Z]{8,16}",
        payload in json_value_strategy(),
    ) {
        // Disjoint alphabets guarantee the secrets differ
        let signature = sign(&secret_a, &payload);
        prop_assert!(!verify(&secret_b, &payload, &signature));
    }

    #[test]
    fn canonical_form_is_parseable_and_equivalent(payload in json_value_strategy()) {
        let canonical = canonical_json(&payload);
        let reparsed: serde_json::Value = serde_json::from_str(&canonical).unwrap();
        prop_assert_eq!(reparsed, payload);
    }

    #[test]
    fn canonical_form_has_no_extraneous_whitespace(payload in json_value_strategy()) {
        let canonical = canonical_json(&payload);
        // Compact rendering: no separators followed by spaces outside strings
        let reparsed: serde_json::Value = serde_json::from_str(&canonical).unwrap();
        let compact = serde_json::to_string(&reparsed).unwrap();
        prop_assert_eq!(canonical.len(), compact.len());
    }
}
