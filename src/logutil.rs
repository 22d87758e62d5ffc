//! Keeps player-supplied text (names, colors, raw frames) on a single log line.

/// Longest preview of a user string that makes it into a log line.
pub const MAX_LOG_PREVIEW: usize = 120;

/// Escape `s` for single-line logging, truncated to [`MAX_LOG_PREVIEW`] characters.
pub fn escape_log(s: &str) -> String {
    escape_log_limited(s, MAX_LOG_PREVIEW)
}

/// Backslashes, line breaks and tabs become their escape sequences; any other
/// control character is written as `\xNN`. Text past `limit` characters is cut
/// and marked with an ellipsis.
pub fn escape_log_limited(s: &str, limit: usize) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(s.len().min(limit) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
