//! Random primary keys for domain records.
//!
//! Keys carry no uniqueness check: with 62^16 possible values a collision
//! is improbable, and an upsert on a colliding key merges into the existing
//! record.

use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;

const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 4;

static GENERATED_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]{4}(-[A-Za-z0-9]{4}){3}$").expect("valid generated key regex")
});

/// Returns `size` random `[A-Za-z0-9]` characters (at least one).
pub fn random_string(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size.max(1))
        .map(char::from)
        .collect()
}

/// Returns a new `xxxx-xxxx-xxxx-xxxx` key.
pub fn generate_key() -> String {
    (0..KEY_GROUPS)
        .map(|_| random_string(KEY_GROUP_LEN))
        .collect::<Vec<_>>()
        .join("-")
}

/// Whether `key` has the shape produced by `generate_key`.
pub fn is_generated_key(key: &str) -> bool {
    GENERATED_KEY_RE.is_match(key)
}

#[cfg(test)]
mod tests {
    use super::{generate_key, is_generated_key, random_string};
    use std::collections::HashSet;

    #[test]
    fn random_string_never_returns_empty() {
        assert_eq!(random_string(0).len(), 1);
        assert_eq!(random_string(7).len(), 7);
        assert!(random_string(64).chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_keys_match_shape_and_do_not_repeat() {
        let keys: HashSet<String> = (0..100).map(|_| generate_key()).collect();
        assert_eq!(keys.len(), 100);
        assert!(keys.iter().all(|key| is_generated_key(key)));
    }

    #[test]
    fn shape_check_rejects_other_forms() {
        assert!(is_generated_key("aB3d-0000-zzzz-Q1w2"));
        assert!(!is_generated_key("aB3d-0000-zzzz"));
        assert!(!is_generated_key("aB3d_0000_zzzz_Q1w2"));
        assert!(!is_generated_key("aB3-d0000-zzzz-Q1w2"));
    }
}
