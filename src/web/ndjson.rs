// Incremental NDJSON decoder for the daemon's streaming responses.
//
// Network chunks do not respect line boundaries, so the decoder keeps the
// trailing partial line (including any split multi-byte UTF-8 sequence) in a
// carry-over buffer until the rest of it arrives.

use serde_json::Value;

use crate::sys_debug;

/// Stateful line decoder. One instance per streaming response.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, invoking `on_frame` for every complete JSON
    /// line it completes. Frames are emitted in input order. Blank lines and
    /// lines that fail to parse are skipped.
    pub fn feed(&mut self, chunk: &[u8], mut on_frame: impl FnMut(Value)) {
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            emit_line(&line[..line.len() - 1], &mut on_frame);
        }
    }

    /// Flush the stream: a non-empty trailing buffer is parsed as a final
    /// frame (some servers omit the newline after the last line).
    pub fn finish(mut self, mut on_frame: impl FnMut(Value)) {
        let rest = std::mem::take(&mut self.buffer);
        emit_line(&rest, &mut on_frame);
    }

    /// Bytes currently carried over awaiting a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn emit_line(line: &[u8], on_frame: &mut impl FnMut(Value)) {
    let line = trim_ascii(line);
    if line.is_empty() {
        return;
    }
    match serde_json::from_slice::<Value>(line) {
        Ok(frame) => on_frame(frame),
        Err(e) => {
            // Protocol noise, not a user-facing failure
            sys_debug!(
                "[NDJSON] Skipping malformed line ({}): {}",
                e,
                String::from_utf8_lossy(line)
            );
        }
    }
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_frames(chunks: &[&[u8]]) -> Vec<Value> {
        let mut decoder = NdjsonDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk, |f| frames.push(f));
        }
        decoder.finish(|f| frames.push(f));
        frames
    }

    #[test]
    fn test_single_complete_line() {
        let frames = collect_frames(&[b"{\"done\":false}\n"]);
        assert_eq!(frames, vec![serde_json::json!({"done": false})]);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let frames = collect_frames(&[b"{\"response\":\"Hel", b"lo\"}\n"]);
        assert_eq!(frames, vec![serde_json::json!({"response": "Hello"})]);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let frames = collect_frames(&[b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n"]);
        assert_eq!(
            frames,
            vec![
                serde_json::json!({"n": 1}),
                serde_json::json!({"n": 2}),
                serde_json::json!({"n": 3}),
            ]
        );
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let frames = collect_frames(&[b"{\"n\":1}\n{\"done\":true}"]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], serde_json::json!({"done": true}));
    }

    #[test]
    fn test_blank_and_crlf_lines_skipped() {
        let frames = collect_frames(&[b"\n  \n{\"n\":1}\r\n\n"]);
        assert_eq!(frames, vec![serde_json::json!({"n": 1})]);
    }

    #[test]
    fn test_malformed_line_skipped_stream_continues() {
        let frames = collect_frames(&[b"{\"n\":1}\nnot json\n{\"n\":2}\n"]);
        assert_eq!(
            frames,
            vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})]
        );
    }

    #[test]
    fn test_multibyte_utf8_split_mid_sequence() {
        // "é" is 0xC3 0xA9; split between the two bytes
        let full = "{\"response\":\"caf\u{e9}\"}\n".as_bytes().to_vec();
        let split = full.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let frames = collect_frames(&[&full[..split], &full[split..]]);
        assert_eq!(frames, vec![serde_json::json!({"response": "café"})]);
    }

    #[test]
    fn test_every_split_offset_yields_same_frames() {
        let input = b"{\"a\":1}\n{\"b\":\"two\"}\n{\"done\":true}\n";
        let expected = collect_frames(&[input]);
        assert_eq!(expected.len(), 3);
        for split in 0..=input.len() {
            let frames = collect_frames(&[&input[..split], &input[split..]]);
            assert_eq!(frames, expected, "mismatch at split offset {split}");
        }
    }

    #[test]
    fn test_pending_tracks_carry_over() {
        let mut decoder = NdjsonDecoder::new();
        decoder.feed(b"{\"par", |_| panic!("no frame expected"));
        assert_eq!(decoder.pending(), 5);
        let mut frames = Vec::new();
        decoder.feed(b"t\":1}\n", |f| frames.push(f));
        assert_eq!(decoder.pending(), 0);
        assert_eq!(frames, vec![serde_json::json!({"part": 1})]);
    }
}
