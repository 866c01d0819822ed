//! Unique endpoint name generation for the named-pipe transport.
//!
//! Names look like `\\.\pipe\<product>-<rand>` where `<rand>` is 18 random
//! bytes, base64-encoded with the URL-safe alphabet so the result never
//! contains a path separator.

use base64::Engine;
use rand::RngCore;

const PIPE_PREFIX: &str = r"\\.\pipe\";
const RANDOM_BYTES: usize = 18;
const MAX_NAME_LEN: usize = 256;

/// Generate a unique named-pipe endpoint name for `product`.
pub fn generate(product: &str) -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    format!("{PIPE_PREFIX}{product}-{encoded}")
}

/// Validate the invariants a generated name must hold, for use in tests and
/// as a defensive check before a name is handed to the OS binding layer.
pub fn is_well_formed(name: &str) -> bool {
    let Some(body) = name.strip_prefix(PIPE_PREFIX) else {
        return false;
    };
    !body.is_empty() && name.len() <= MAX_NAME_LEN && !body.contains('/') && !body.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_names_are_well_formed() {
        for _ in 0..300 {
            let name = generate("gpii-service");
            assert!(name.starts_with(PIPE_PREFIX));
            assert!(is_well_formed(&name), "malformed name: {name}");
        }
    }

    #[test]
    fn generated_names_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..300 {
            let name = generate("gpii-service");
            assert!(seen.insert(name), "duplicate pipe name generated");
        }
        assert_eq!(seen.len(), 300);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(!is_well_formed(r"C:\not\a\pipe"));
    }

    #[test]
    fn rejects_empty_body() {
        assert!(!is_well_formed(PIPE_PREFIX));
    }

    #[test]
    fn rejects_body_with_separators() {
        assert!(!is_well_formed(&format!("{PIPE_PREFIX}bad/name")));
        assert!(!is_well_formed(&format!("{PIPE_PREFIX}bad\\name")));
    }
}
