// Wire format: the raw achievement API name, terminated by the writer closing its handle.

/// Largest message the listener accepts from a single connection.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Decode one received message into an achievement API name.
///
/// Older proxies sent a trailing NUL, and hand-written clients tend to end
/// with a newline; both are stripped. Returns `None` for empty messages.
pub fn decode_achievement(payload: &[u8]) -> Option<String> {
    let end = payload
        .iter()
        .rposition(|b| !matches!(b, b'\0' | b'\r' | b'\n'))
        .map_or(0, |i| i + 1);

    if end == 0 {
        return None;
    }

    Some(String::from_utf8_lossy(&payload[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name() {
        assert_eq!(
            decode_achievement(b"ACH_WIN_100_GAMES").as_deref(),
            Some("ACH_WIN_100_GAMES")
        );
    }

    #[test]
    fn nul_terminated_name() {
        assert_eq!(
            decode_achievement(b"NEW_ACHIEVEMENT_1_0\0").as_deref(),
            Some("NEW_ACHIEVEMENT_1_0")
        );
    }

    #[test]
    fn line_terminated_name() {
        assert_eq!(decode_achievement(b"ACH_X\r\n").as_deref(), Some("ACH_X"));
    }

    #[test]
    fn interior_bytes_are_kept() {
        assert_eq!(
            decode_achievement(b" spaced name ").as_deref(),
            Some(" spaced name ")
        );
    }

    #[test]
    fn empty_messages() {
        assert!(decode_achievement(b"").is_none());
        assert!(decode_achievement(b"\0").is_none());
        assert!(decode_achievement(b"\r\n\0").is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(decode_achievement(b"ACH_\xff").as_deref(), Some("ACH_\u{fffd}"));
    }
}
