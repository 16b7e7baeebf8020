use serde::{Deserialize, Serialize};

/// A chunk of recognized speech in a voice note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub id: u64,
    pub text: String,
    /// Offset from the start of the recording
    pub offset_ms: u64,
    /// Interim segments are rewritten in place as recognition settles
    pub is_final: bool,
}

/// Rolling in-memory transcript of a voice note.
///
/// Holds finalized segments plus at most one trailing interim segment
/// that recognition keeps rewriting until it settles. No persistence;
/// the display layer reads `segments()` on every change.
#[derive(Debug, Default)]
pub struct TranscriptManager {
    segments: Vec<TranscriptSegment>,
    next_id: u64,
}

impl TranscriptManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append or rewrite the trailing interim segment. Returns its ID.
    pub fn push_interim(&mut self, text: impl Into<String>, offset_ms: u64) -> u64 {
        let text = text.into();
        if let Some(last) = self.segments.last_mut() {
            if !last.is_final {
                last.text = text;
                last.offset_ms = offset_ms;
                return last.id;
            }
        }
        let id = self.alloc_id();
        self.segments.push(TranscriptSegment {
            id,
            text,
            offset_ms,
            is_final: false,
        });
        id
    }

    /// Promote the trailing interim segment to final with its settled
    /// text. Returns its ID, or `None` when there is no interim segment.
    pub fn finalize_interim(&mut self, text: impl Into<String>) -> Option<u64> {
        let last = self.segments.last_mut()?;
        if last.is_final {
            return None;
        }
        last.text = text.into();
        last.is_final = true;
        Some(last.id)
    }

    /// Append an already-final segment
    pub fn push_final(&mut self, text: impl Into<String>, offset_ms: u64) -> u64 {
        let id = self.alloc_id();
        self.segments.push(TranscriptSegment {
            id,
            text: text.into(),
            offset_ms,
            is_final: true,
        });
        id
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    /// The full transcript text, finalized and interim, in order
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
