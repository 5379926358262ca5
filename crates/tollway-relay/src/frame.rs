//! Upstream line gate

/// Prefix of an upstream event line
const DATA_PREFIX: &[u8; 6] = b"data: ";
/// Terminal sentinel, matched against the same six-byte window
const DONE_SENTINEL: &[u8; 6] = b"[DONE]";

/// A significant upstream line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame<'a> {
    /// Event payload with its prefix stripped
    Data(&'a str),
    /// The upstream declared the end of the stream
    Done,
}

/// Classify one upstream line with its line terminator removed
///
/// A line counts only when its first six bytes are `data: ` or `[DONE]`;
/// everything shorter or different is noise. Those six bytes are stripped.
/// A bare `[DONE]` line therefore strips to an empty payload. Empty payloads
/// are dropped here rather than held as frames, so a stray sentinel never
/// displaces the lookahead frame or reaches the caller as an empty event.
/// Only `data: [DONE]` ends the stream.
pub(crate) fn parse_frame(line: &str) -> Option<Frame<'_>> {
    let head = line.as_bytes().get(..6)?;
    if head != DATA_PREFIX && head != DONE_SENTINEL {
        return None;
    }

    // Both prefixes are ASCII, so byte 6 is a char boundary
    let payload = &line[6..];
    if payload.starts_with("[DONE]") {
        return Some(Frame::Done);
    }
    if payload.is_empty() {
        return None;
    }

    Some(Frame::Data(payload))
}

/// Strip a trailing `\n` and an optional `\r` before it
pub(crate) fn trim_line_end(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
