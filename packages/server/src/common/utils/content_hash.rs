use sha2::{Digest, Sha256};

/// Normalize text for hashing: lowercase, punctuation dropped, whitespace
/// collapsed.
pub fn normalize_for_hash(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 (hex) of normalized text.
///
/// Robust against case, punctuation and spacing differences while still
/// changing when the words change.
pub fn generate_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_for_hash(text).as_bytes());
    hex::encode(hasher.finalize())
}

/// Dedupe key for a job posting.
///
/// The same role re-posted on another board, or re-sent in a second alert
/// email, produces the same fingerprint. Fields are separated with a unit
/// separator so that ("ab", "c") and ("a", "bc") differ.
pub fn job_fingerprint(company: &str, title: &str, location: Option<&str>) -> String {
    let key = format!(
        "{}\u{1f}{}\u{1f}{}",
        normalize_for_hash(company),
        normalize_for_hash(title),
        normalize_for_hash(location.unwrap_or(""))
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_punctuation_ignored() {
        assert_eq!(
            generate_content_hash("Senior Rust Engineer!"),
            generate_content_hash("senior   rust-engineer")
        );
    }

    #[test]
    fn test_word_order_matters() {
        assert_ne!(
            generate_content_hash("rust backend engineer"),
            generate_content_hash("backend rust engineer")
        );
    }

    #[test]
    fn test_hash_format() {
        let hash = generate_content_hash("Test content");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_formatting() {
        assert_eq!(
            job_fingerprint("Acme, Inc.", "Staff Engineer", Some("Berlin")),
            job_fingerprint("acme inc", "staff  engineer", Some("BERLIN"))
        );
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        assert_ne!(
            job_fingerprint("ab", "c", None),
            job_fingerprint("a", "bc", None)
        );
        assert_ne!(
            job_fingerprint("Acme", "Engineer", Some("Berlin")),
            job_fingerprint("Acme", "Engineer", None)
        );
    }
}
