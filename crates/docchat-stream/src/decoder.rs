//! Line-oriented frame decoder for `data: <json>` streams.

/// Field prefix that marks a payload line.
pub const DATA_PREFIX: &str = "data:";
/// Literal payload that ends the stream.
pub const END_MARKER: &str = "[DONE]";

/// One decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload text with the field prefix removed.
    Payload(String),
    /// The literal end marker. Structural, not a `done` event.
    EndOfStream,
}

/// Reassembles raw chunks into complete frames.
///
/// The buffer only ever holds the unterminated tail of the input; it is kept
/// as bytes so a multi-byte character split across chunks decodes intact.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates a decoder with an empty line buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every frame it completes, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(frame) = parse_line(&line[..idx]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a final line that arrived without a terminating newline.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        parse_line(&line)
    }

    /// Number of buffered bytes still waiting for a line terminator.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Discards any partial line, e.g. before reusing the decoder for a new
    /// stream.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

fn parse_line(raw: &[u8]) -> Option<Frame> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim_end_matches('\r');
    // blank separators and `:` keep-alives
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    if payload.trim() == END_MARKER {
        return Some(Frame::EndOfStream);
    }
    if payload.trim().is_empty() {
        return None;
    }
    Some(Frame::Payload(payload.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = concat!(
        "data: {\"type\":\"context\",\"contexts\":[\"doc1\"],\"provider\":\"ollama\"}\n",
        "\n",
        ": keep-alive\n",
        "data: {\"type\":\"token\",\"content\":\"Hé\"}\r\n",
        "event: message\n",
        "data: {\"type\":\"token\",\"content\":\"llo\"}\n",
        "data: [DONE]\n",
    );

    fn decode_whole() -> Vec<Frame> {
        FrameDecoder::new().push_chunk(STREAM.as_bytes())
    }

    #[test]
    fn decodes_payloads_and_terminator() {
        let frames = decode_whole();
        assert_eq!(frames.len(), 4);
        assert_eq!(
            frames[0],
            Frame::Payload(
                "{\"type\":\"context\",\"contexts\":[\"doc1\"],\"provider\":\"ollama\"}".into()
            )
        );
        assert_eq!(
            frames[1],
            Frame::Payload("{\"type\":\"token\",\"content\":\"Hé\"}".into())
        );
        assert_eq!(frames[3], Frame::EndOfStream);
    }

    #[test]
    fn every_two_way_split_decodes_like_the_whole_stream() {
        let bytes = STREAM.as_bytes();
        let whole = decode_whole();
        for split in 0..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = decoder.push_chunk(&bytes[..split]);
            frames.extend(decoder.push_chunk(&bytes[split..]));
            assert_eq!(frames, whole, "split at byte {split}");
            assert_eq!(decoder.pending_len(), 0);
        }
    }

    #[test]
    fn byte_at_a_time_delivery_decodes_like_the_whole_stream() {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in STREAM.as_bytes() {
            frames.extend(decoder.push_chunk(std::slice::from_ref(byte)));
        }
        assert_eq!(frames, decode_whole());
    }

    #[test]
    fn partial_line_stays_buffered_until_terminated() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_chunk(b"data: {\"type\":\"to").is_empty());
        assert_eq!(decoder.pending_len(), 17);
        let frames = decoder.push_chunk(b"ken\",\"content\":\"x\"}\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_chunk(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(Frame::EndOfStream));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn prefix_without_space_is_accepted() {
        let frames = FrameDecoder::new().push_chunk(b"data:{\"type\":\"done\"}\n");
        assert_eq!(frames, vec![Frame::Payload("{\"type\":\"done\"}".into())]);
    }
}
