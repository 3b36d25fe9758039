//! The fixed, compile-time-known vocabulary of `/v1/data/<key>` resources.

/// All keys the service will read or write. Order is insignificant; membership is everything.
pub const DATA_KEYS: &[&str] = &[
    "activities",
    "activity_metric_insights",
    "meal_plans",
    "custom_foods",
    "workouts",
    "events",
    "profile",
    "lactate_history_records",
];

/// Whether `key` belongs to the fixed vocabulary.
#[inline]
pub fn is_valid_key(key: &str) -> bool {
    DATA_KEYS.contains(&key)
}

/// The JSON document a key is seeded with at bootstrap, and served back if
/// somehow missing from the store afterward.
#[inline]
pub fn default_json(key: &str) -> &'static str {
    if key == "profile" {
        "{}"
    } else {
        "[]"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_fixed_key() {
        for key in DATA_KEYS {
            assert!(is_valid_key(key));
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(!is_valid_key("unknown"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("Profile"));
    }

    #[test]
    fn profile_defaults_to_object_others_to_array() {
        assert_eq!(default_json("profile"), "{}");
        for key in DATA_KEYS.iter().filter(|k| **k != "profile") {
            assert_eq!(default_json(key), "[]");
        }
    }
}
