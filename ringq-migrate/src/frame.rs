//! Incremental decoding and segmentation of the migration event stream
//!
//! The backend writes frames of the form `data: <text>` followed by a blank
//! line. Transport chunks carry no alignment guarantee: a frame, the `\n\n`
//! delimiter or even a multi-byte UTF-8 sequence may be split across chunks.
//! [`FrameDecoder`] absorbs chunks in arrival order and hands back every
//! frame that is complete so far, holding the remainder for the next chunk.

/// Blank line terminating each frame
pub const FRAME_DELIMITER: &str = "\n\n";

/// Field prefix marking a data line
pub const DATA_PREFIX: &str = "data:";

/// Stateful chunk-to-frame decoder for one stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk
    pending_bytes: Vec<u8>,
    /// Trailing `\r` held back until the next chunk shows whether `\n` follows
    held_cr: bool,
    /// Decoded text not yet terminated by a delimiter
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one chunk; return the raw text of every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.decode(chunk);
        self.append_normalized(text);
        self.drain_frames()
    }

    /// End of input: return whatever was never terminated by a delimiter
    ///
    /// Returns `None` when nothing (not even whitespace) is left over.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        if self.held_cr {
            self.held_cr = false;
            self.buffer.push('\r');
        }

        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Number of decoded bytes waiting for a delimiter
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending_bytes.len() + usize::from(self.held_cr)
    }

    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Sequence continues in the next chunk
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn append_normalized(&mut self, text: String) {
        let mut text = if std::mem::take(&mut self.held_cr) {
            let mut joined = String::with_capacity(text.len() + 1);
            joined.push('\r');
            joined.push_str(&text);
            joined
        } else {
            text
        };

        if text.ends_with('\r') {
            text.pop();
            self.held_cr = true;
        }

        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(&text);
        }
    }

    fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].find(FRAME_DELIMITER) {
            let end = start + offset;
            frames.push(self.buffer[start..end].to_string());
            start = end + FRAME_DELIMITER.len();
        }
        if start > 0 {
            self.buffer.drain(..start);
        }
        frames
    }
}

/// Extract the message carried by one complete frame
///
/// `data:` lines are collected (one space after the colon is stripped) and
/// joined with `\n`. Comment lines (`:` prefix) and other fields are
/// skipped. A frame with no data line yields `None` and must not surface.
pub fn parse_frame(raw: &str) -> Option<String> {
    let mut data_lines: Vec<&str> = Vec::new();
    for line in raw.split('\n') {
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Best-effort message for text left unterminated at end of stream
///
/// Uses the data payload when the leftover is a recognizable frame,
/// otherwise the trimmed raw text. Whitespace- or comment-only leftovers
/// yield `None`.
pub fn flush_leftover(raw: &str) -> Option<String> {
    if let Some(message) = parse_frame(raw) {
        return Some(message);
    }

    let meaningful = raw
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with(':'));
    if meaningful {
        Some(raw.trim().to_string())
    } else {
        None
    }
}
