// ids.rs — Content-derived identifiers for board rows.
//
// Ids are a short type prefix plus the first 10 hex digits of a SHA-256 over
// the fields that make a row unique. Two rigs posting the same title at the
// same instant still get distinct ids because the poster is hashed too.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const HASH_LEN: usize = 10;

fn short_hash(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", prefix, &digest[..HASH_LEN])
}

/// Id of a wanted item: `w-<hash>`.
pub fn item_id(title: &str, posted_by: &str, at: DateTime<Utc>) -> String {
    short_hash("w", &[title, posted_by, &at.to_rfc3339()])
}

/// Id of a completion record: `c-<hash>`.
pub fn completion_id(wanted_id: &str, completed_by: &str, at: DateTime<Utc>) -> String {
    short_hash("c", &[wanted_id, completed_by, &at.to_rfc3339()])
}

/// Id of a stamp: `s-<hash>`.
pub fn stamp_id(author: &str, subject: &str, context_id: &str, at: DateTime<Utc>) -> String {
    short_hash("s", &[author, subject, context_id, &at.to_rfc3339()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic_and_prefixed() {
        let at = Utc::now();
        let a = item_id("Title", "alice", at);
        let b = item_id("Title", "alice", at);
        assert_eq!(a, b);
        assert!(a.starts_with("w-"));
        assert_eq!(a.len(), 2 + HASH_LEN);
        assert_ne!(a, item_id("Title", "bob", at));
    }
}
