//! Framing for the continuous change feed.
//!
//! The store streams one JSON change row per line. Rows may be split across
//! chunks or several may arrive in one chunk, and blank lines are heartbeats.

use bytes::{Buf, Bytes, BytesMut};
use galley_core::InventoryDocument;
use serde::Deserialize;

const DELIMITER: u8 = b'\n';

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Malformed change frame: {reason}")]
    Malformed { reason: String, frame: String },
}

/// One row of the continuous feed. Rows without a `doc` (the `last_seq`
/// trailer, or a feed opened without `include_docs`) carry no update.
#[derive(Debug, Deserialize)]
pub struct ChangeRow {
    #[serde(default)]
    pub seq: serde_json::Value,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub doc: Option<InventoryDocument>,
}

/// Buffers raw chunks and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and drains every complete, non-blank frame.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == DELIMITER) {
            let line = self.buffer.split_to(pos).freeze();
            self.buffer.advance(1);
            if let Some(frame) = non_blank(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Whatever is left once the stream has ended. A row written without a
    /// trailing newline is still a row.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = self.buffer.split().freeze();
        non_blank(rest)
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn non_blank(line: Bytes) -> Option<Bytes> {
    let line = match line.last() {
        Some(b'\r') => line.slice(..line.len() - 1),
        _ => line,
    };
    if line.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(line)
    }
}

/// Parses one frame. `Ok(None)` means the row is valid but carries no
/// document update.
pub fn parse_frame(frame: &[u8]) -> Result<Option<InventoryDocument>, FrameError> {
    let row: ChangeRow = serde_json::from_slice(frame).map_err(|e| FrameError::Malformed {
        reason: e.to_string(),
        frame: String::from_utf8_lossy(frame).into_owned(),
    })?;

    if row.deleted {
        tracing::warn!(id = ?row.id, "Change feed reported a deleted inventory document, ignoring");
        return Ok(None);
    }

    Ok(row.doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = r#"{"seq":7,"id":"economyinventory","changes":[{"rev":"3-abc"}],"doc":{"_id":"economyinventory","_rev":"3-abc","breakfast":[{"economymeal1":{"seatsOrdered":{"seat-a":1},"startingInventory":1}}]}}"#;

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        let bytes = format!("{}\n", ROW);
        let (head, tail) = bytes.as_bytes().split_at(40);

        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.pending_len(), 40);

        let frames = decoder.push(tail);
        assert_eq!(frames.len(), 1);
        assert_eq!(decoder.pending_len(), 0);

        let doc = parse_frame(&frames[0]).unwrap().unwrap();
        assert_eq!(doc.revision.as_str(), "3-abc");
    }

    #[test]
    fn test_concatenated_frames_and_heartbeats() {
        let mut decoder = FrameDecoder::new();
        let chunk = format!("\n{}\r\n\n{}\n\n", ROW, ROW);

        let frames = decoder.push(chunk.as_bytes());
        assert_eq!(frames.len(), 2);
        for frame in frames {
            assert!(parse_frame(&frame).unwrap().is_some());
        }
    }

    #[test]
    fn test_trailing_frame_without_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(ROW.as_bytes()).is_empty());

        let frame = decoder.finish().unwrap();
        assert!(parse_frame(&frame).unwrap().is_some());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_rows_without_doc_are_not_errors() {
        assert!(parse_frame(br#"{"last_seq":"42"}"#).unwrap().is_none());
        assert!(parse_frame(br#"{"seq":3,"id":"economyinventory","deleted":true}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_frame() {
        let err = parse_frame(b"{\"seq\": 1, \"doc\": {").unwrap_err();
        match err {
            FrameError::Malformed { frame, .. } => assert!(frame.starts_with("{\"seq\"")),
        }
    }
}
