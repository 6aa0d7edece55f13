//! Two-phase length-prefixed frame reassembly.
//!
//! The workflow debug server ordinarily emits one newline-delimited
//! message per socket write, which arrives as a single read on our side.
//! Messages too large for that are wrapped in a frame: a decimal byte
//! length, a newline, then the payload, delivered across as many writes
//! as the server needs.
//!
//! Reassembly is sensitive to read boundaries, so [`FrameAssembler::feed`]
//! must be called exactly once per socket read. The length prefix is only
//! recognised at the start of a chunk received while no frame is in
//! progress; while a frame is being collected, every subsequent chunk is
//! appended raw until the declared byte count has been received.

use bytes::{Bytes, BytesMut};

/// Reassembles framed payloads from per-read byte chunks.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Option<PendingFrame>,
}

#[derive(Debug)]
struct PendingFrame {
    expected: usize,
    buffer: BytesMut,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one socket read's worth of bytes, returning any payloads that
    /// became complete.
    ///
    /// A chunk that arrives while no frame is in progress either opens a
    /// new frame (when the text before its first newline parses as a
    /// positive decimal length) or passes through unframed as a single
    /// payload. An unparseable length prefix is treated as zero, which
    /// degrades to the unframed case. Completion is by byte count: once
    /// the accumulated buffer reaches the declared length the whole
    /// buffer, overshoot included, is handed out and the assembler resets.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut complete = Vec::new();

        match self.pending.as_mut() {
            None => {
                let newline = chunk.iter().position(|&b| b == b'\n');
                let expected = match newline {
                    Some(ind) if ind > 0 => declared_length(&chunk[..ind]),
                    _ => 0,
                };

                if expected == 0 {
                    complete.push(Bytes::copy_from_slice(chunk));
                    return complete;
                }

                // Everything after the length line starts the payload.
                let ind = newline.expect("length prefix implies a newline");
                let rest = if chunk.len() > ind + 1 {
                    &chunk[ind + 1..]
                } else {
                    &[][..]
                };
                tracing::trace!(expected, received = rest.len(), "started collecting frame");
                let mut buffer = BytesMut::with_capacity(expected);
                buffer.extend_from_slice(rest);
                self.pending = Some(PendingFrame { expected, buffer });
            }
            Some(pending) => {
                pending.buffer.extend_from_slice(chunk);
                tracing::trace!(
                    expected = pending.expected,
                    received = pending.buffer.len(),
                    "collecting frame"
                );
            }
        }

        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.buffer.len() >= p.expected)
        {
            let frame = self.pending.take().expect("frame checked above");
            complete.push(frame.buffer.freeze());
        }

        complete
    }

    /// True while a declared-length frame is still being collected.
    pub fn mid_frame(&self) -> bool {
        self.pending.is_some()
    }
}

fn declared_length(prefix: &[u8]) -> usize {
    std::str::from_utf8(prefix)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(assembler: &mut FrameAssembler, chunk: &str) -> Vec<Bytes> {
        assembler.feed(chunk.as_bytes())
    }

    #[test]
    fn unframed_chunk_passes_through() {
        let mut assembler = FrameAssembler::new();
        let out = feed_str(&mut assembler, "exc\nBoom\n1\nerr:0:string:bad\n");
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"exc\nBoom\n1\nerr:0:string:bad\n");
        assert!(!assembler.mid_frame());
    }

    #[test]
    fn non_numeric_prefix_degrades_to_unframed() {
        let mut assembler = FrameAssembler::new();
        let out = feed_str(&mut assembler, "vars\n1\nx:0:int:1\n");
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"vars\n1\nx:0:int:1\n");
    }

    #[test]
    fn whole_frame_in_one_chunk() {
        let mut assembler = FrameAssembler::new();
        let payload = "vars\n1\nx:0:int:1\n";
        let out = feed_str(&mut assembler, &format!("{}\n{payload}", payload.len()));
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], payload.as_bytes());
        assert!(!assembler.mid_frame());
    }

    #[test]
    fn frame_split_across_many_chunks() {
        let mut assembler = FrameAssembler::new();
        let payload = "vars\n2\nx:0:string:hello\ny:1:int:42\n";

        assert!(feed_str(&mut assembler, &format!("{}\n", payload.len())).is_empty());
        assert!(assembler.mid_frame());

        // Deliver the payload one byte at a time, with an empty read thrown in.
        let bytes = payload.as_bytes();
        let mut out = Vec::new();
        out.extend(assembler.feed(&[]));
        for (i, b) in bytes.iter().enumerate() {
            let got = assembler.feed(std::slice::from_ref(b));
            if i < bytes.len() - 1 {
                assert!(got.is_empty(), "frame completed early at byte {i}");
            }
            out.extend(got);
        }

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], bytes);
        assert!(!assembler.mid_frame());
    }

    #[test]
    fn overshoot_is_kept_in_the_payload() {
        let mut assembler = FrameAssembler::new();
        assert!(feed_str(&mut assembler, "4\nab").is_empty());
        let out = feed_str(&mut assembler, "cdef");
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"abcdef");
    }

    #[test]
    fn resets_cleanly_between_frames() {
        let mut assembler = FrameAssembler::new();
        assert!(feed_str(&mut assembler, "3\n").is_empty());
        assert_eq!(feed_str(&mut assembler, "abc").len(), 1);

        // Next chunk is interpreted fresh, as an unframed message.
        let out = feed_str(&mut assembler, "end\n");
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"end\n");
    }

    #[test]
    fn leading_newline_is_not_a_length_prefix() {
        let mut assembler = FrameAssembler::new();
        let out = feed_str(&mut assembler, "\nstack\n");
        assert_eq!(out.len(), 1);
        assert_eq!(&out[0][..], b"\nstack\n");
    }
}
