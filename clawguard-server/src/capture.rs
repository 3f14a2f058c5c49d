//! Size-capped payload capture.

/// Decode up to `cap` bytes for the audit store.
///
/// Bodies within the cap are stored whole (lossy UTF-8). Over-cap
/// bodies keep their first `cap` bytes plus a truncation marker that
/// names the original length when it is known.
pub fn truncate_payload(bytes: &[u8], cap: usize, total_len: Option<usize>) -> String {
    let total = total_len.unwrap_or(bytes.len());
    if total <= cap && bytes.len() <= cap {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let kept = bytes.len().min(cap);
    let mut text = String::from_utf8_lossy(&bytes[..kept]).into_owned();
    match total_len {
        Some(n) => text.push_str(&format!("... [truncated, {n} bytes total]")),
        None => text.push_str("... [truncated]"),
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_cap_is_untouched() {
        assert_eq!(truncate_payload(b"hello", 10, Some(5)), "hello");
        assert_eq!(truncate_payload(b"", 10, Some(0)), "");
    }

    #[test]
    fn test_exactly_cap_is_untouched() {
        assert_eq!(truncate_payload(b"12345678", 8, Some(8)), "12345678");
    }

    #[test]
    fn test_over_cap_with_known_length() {
        assert_eq!(
            truncate_payload(b"0123456789AB", 8, Some(12)),
            "01234567... [truncated, 12 bytes total]"
        );
    }

    #[test]
    fn test_over_cap_with_unknown_length() {
        assert_eq!(
            truncate_payload(b"0123456789AB", 8, None),
            "01234567... [truncated]"
        );
    }

    #[test]
    fn test_partial_capture_of_longer_stream() {
        // Capture buffer holds only the first cap bytes of a longer body.
        assert_eq!(
            truncate_payload(b"01234567", 8, Some(1000)),
            "01234567... [truncated, 1000 bytes total]"
        );
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let text = truncate_payload(&[0xff, 0xfe, b'o', b'k'], 10, Some(4));
        assert!(text.ends_with("ok"));
    }
}
