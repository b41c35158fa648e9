//! Splits the raw progress stream into event frames.
//!
//! A frame is a run of lines terminated by a blank line (`"\n\n"`). Only three line
//! kinds matter: `:` comments, `event: <name>` and `data: <payload>`. When a frame
//! carries several `data:` lines the last one wins; payloads from the backend are
//! always single-line JSON.

const DELIMITER: &[u8] = b"\n\n";
const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub event: String,
    pub data: String,
}

impl RawFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Reassembles frames from chunks cut at arbitrary byte offsets.
///
/// Buffering happens on bytes rather than text so a multi-byte character split
/// across two chunks is decoded only once the whole frame is present.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
    // Offset up to which `buffer` is known not to contain the delimiter.
    scanned: usize,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;

        while let Some(pos) = find_delimiter(&self.buffer[cursor..]) {
            let end = cursor + pos;
            if let Some(frame) = parse_frame(&self.buffer[start..end]) {
                frames.push(frame);
            }
            start = end + DELIMITER.len();
            cursor = start;
        }

        self.buffer.drain(..start);
        // The last byte may be the first half of a delimiter.
        self.scanned = self.buffer.len().saturating_sub(DELIMITER.len() - 1);
        frames
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops any unterminated trailing text, e.g. at end of stream.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)
}

fn parse_frame(raw: &[u8]) -> Option<RawFrame> {
    let text = String::from_utf8_lossy(raw);
    let mut event: Option<&str> = None;
    let mut data: Option<&str> = None;

    for line in text.split('\n') {
        if line.starts_with(':') {
            continue;
        }
        if let Some(name) = line.strip_prefix("event: ") {
            event = Some(name);
        } else if let Some(payload) = line.strip_prefix("data: ") {
            data = Some(payload);
        }
    }

    let event = event.filter(|name| !name.is_empty()).unwrap_or(DEFAULT_EVENT);
    let data = data.unwrap_or_default();

    if event == DEFAULT_EVENT && data.is_empty() {
        return None;
    }

    Some(RawFrame::new(event, data))
}
