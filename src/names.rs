//! Channel and group naming rules.
//!
//! Names are plain ASCII identifiers: letters, digits, `-`, `_` and `.`.
//! Channel names may additionally carry a single `!` separating a routing
//! prefix from a process-local suffix, which is how [`new_channel_name`]
//! builds reply channels. Both kinds are bounded in length so a caller
//! cannot grow the store's key space without limit.

use uuid::Uuid;

use crate::{LayerError, Result};

/// Upper bound (exclusive) on channel and group name length.
pub const MAX_NAME_LENGTH: usize = 100;

/// Prefix used by [`new_channel_name`] when the caller supplies none.
pub const DEFAULT_CHANNEL_PREFIX: &str = "specific.";

/// Marker between the caller's prefix and the random suffix of a generated
/// channel name.
const GENERATED_TAG: &str = "layer!";

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Check a channel name, returning it unchanged when valid.
pub fn validate_channel_name(name: &str) -> Result<&str> {
    // ---
    let invalid = || LayerError::InvalidChannelName(name.to_string());

    if name.is_empty() || name.len() >= MAX_NAME_LENGTH {
        return Err(invalid());
    }

    let (head, tail) = match name.split_once('!') {
        Some((head, tail)) => (head, Some(tail)),
        None => (name, None),
    };

    if head.is_empty() || !head.chars().all(is_name_char) {
        return Err(invalid());
    }
    if let Some(tail) = tail {
        // a second `!` lands in the tail and fails here
        if !tail.chars().all(is_name_char) {
            return Err(invalid());
        }
    }
    Ok(name)
}

/// Check a group name, returning it unchanged when valid.
pub fn validate_group_name(name: &str) -> Result<&str> {
    // ---
    if name.is_empty() || name.len() >= MAX_NAME_LENGTH || !name.chars().all(is_name_char) {
        return Err(LayerError::InvalidGroupName(name.to_string()));
    }
    Ok(name)
}

/// Generate a unique channel name under `prefix`.
///
/// The channel itself is not created; that happens lazily on first use.
pub fn new_channel_name(prefix: &str) -> Result<String> {
    // ---
    if prefix.contains('!') {
        return Err(LayerError::InvalidChannelName(prefix.to_string()));
    }
    let name = format!("{prefix}{GENERATED_TAG}{}", Uuid::new_v4().simple());
    validate_channel_name(&name).map_err(|_| LayerError::InvalidChannelName(prefix.to_string()))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_accepts_plain_and_process_local_names() {
        // ---
        assert!(validate_channel_name("chat.room-1_a").is_ok());
        assert!(validate_channel_name("specific.layer!abc123").is_ok());
        assert!(validate_channel_name("reply!").is_ok());
    }

    #[test]
    fn test_rejects_bad_channel_names() {
        // ---
        for name in ["", "has space", "two!bangs!here", "!leading", "uni\u{e9}"] {
            assert!(
                matches!(validate_channel_name(name), Err(LayerError::InvalidChannelName(_))),
                "accepted {name:?}"
            );
        }
        let long = "a".repeat(MAX_NAME_LENGTH);
        assert!(validate_channel_name(&long).is_err());
        assert!(validate_channel_name(&long[1..]).is_ok());
    }

    #[test]
    fn test_group_names_reject_separator() {
        // ---
        assert!(validate_group_name("lobby").is_ok());
        assert!(matches!(
            validate_group_name("lobby!x"),
            Err(LayerError::InvalidGroupName(_))
        ));
    }

    #[test]
    fn test_generated_names_are_unique_and_valid() {
        // ---
        let a = new_channel_name(DEFAULT_CHANNEL_PREFIX).unwrap();
        let b = new_channel_name(DEFAULT_CHANNEL_PREFIX).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("specific.layer!"));
        assert!(validate_channel_name(&a).is_ok());
    }

    #[test]
    fn test_generated_name_rejects_bad_prefix() {
        // ---
        assert!(new_channel_name("bad!").is_err());
        assert!(new_channel_name("sp ace.").is_err());
        assert!(new_channel_name(&"p".repeat(80)).is_err());
    }
}
