//! Canonical channel naming and the private-channel access guard.
//!
//! A private two-party channel is named `private_<a>_<b>` where the two
//! usernames are sorted case-insensitively but keep their original casing.
//! Any other channel name is public and needs no guard.

use crate::constants::PRIVATE_CHANNEL_PREFIX;

/// Build the canonical private channel name for two users.
///
/// The result is identical regardless of argument order:
/// `private_channel_name("Bob", "alice")` and
/// `private_channel_name("alice", "Bob")` both yield `private_alice_Bob`.
pub fn private_channel_name(a: &str, b: &str) -> String {
    let (first, second) = if a.to_lowercase() <= b.to_lowercase() {
        (a, b)
    } else {
        (b, a)
    };
    format!("{PRIVATE_CHANNEL_PREFIX}{first}_{second}")
}

/// Whether a channel name refers to a private two-party channel.
pub fn is_private(channel: &str) -> bool {
    channel.starts_with(PRIVATE_CHANNEL_PREFIX)
}

/// Check whether `user` may read a private channel.
///
/// Returns `true` only for a well-formed `private_<a>_<b>` name where the
/// user matches one of the embedded names case-insensitively.  Malformed
/// and non-private names yield `false`; callers gate public channels
/// separately (they are open to everyone).
pub fn can_access(user: &str, channel: &str) -> bool {
    let parts: Vec<&str> = channel.split('_').collect();
    if parts.len() != 3 || parts[0] != "private" {
        return false;
    }
    if parts[1].is_empty() || parts[2].is_empty() {
        return false;
    }

    user.eq_ignore_ascii_case(parts[1]) || user.eq_ignore_ascii_case(parts[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_order_independent() {
        assert_eq!(
            private_channel_name("alice", "bob"),
            private_channel_name("bob", "alice")
        );
        assert_eq!(private_channel_name("alice", "bob"), "private_alice_bob");
    }

    #[test]
    fn name_sorts_case_insensitively_but_keeps_casing() {
        assert_eq!(private_channel_name("Bob", "alice"), "private_alice_Bob");
        assert_eq!(private_channel_name("alice", "Bob"), "private_alice_Bob");
    }

    #[test]
    fn access_granted_to_both_members_only() {
        let channel = private_channel_name("alice", "bob");
        assert!(can_access("alice", &channel));
        assert!(can_access("bob", &channel));
        assert!(can_access("ALICE", &channel));
        assert!(!can_access("carol", &channel));
    }

    #[test]
    fn access_denied_for_malformed_and_public_names() {
        assert!(!can_access("alice", "general"));
        assert!(!can_access("alice", "private_alice"));
        assert!(!can_access("alice", "private__bob"));
        assert!(!can_access("alice", "private_alice_bob_extra"));
    }

    #[test]
    fn private_prefix_detection() {
        assert!(is_private("private_alice_bob"));
        assert!(!is_private("general"));
    }
}
