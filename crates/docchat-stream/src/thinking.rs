//! Splits the token substream into reasoning and visible answer text.

pub const OPEN_SENTINEL: &str = "<think>";
pub const CLOSE_SENTINEL: &str = "</think>";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ThinkingState {
    #[default]
    Visible,
    Reasoning,
}

/// One ordered piece of a `push` result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThinkingPiece {
    /// Answer text outside reasoning segments.
    Visible(String),
    /// Text appended to the open reasoning segment.
    Reasoning(String),
    /// A reasoning segment that just closed, in full.
    Closed(String),
}

/// What a single `push` added, in the order it appeared in the chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThinkingUpdate {
    pub pieces: Vec<ThinkingPiece>,
}

impl ThinkingUpdate {
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Visible text of this update, concatenated.
    pub fn visible(&self) -> String {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                ThinkingPiece::Visible(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Reasoning text of this update, concatenated.
    pub fn reasoning(&self) -> String {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                ThinkingPiece::Reasoning(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn closed_segments(&self) -> Vec<&str> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                ThinkingPiece::Closed(segment) => Some(segment.as_str()),
                _ => None,
            })
            .collect()
    }

    fn push(&mut self, piece: ThinkingPiece) {
        let empty = matches!(
            &piece,
            ThinkingPiece::Visible(text) | ThinkingPiece::Reasoning(text) if text.is_empty()
        );
        if !empty {
            self.pieces.push(piece);
        }
    }
}

/// Per-turn sentinel scanner.
///
/// Sentinels are matched within each delivered chunk only.
// TODO: keep a rolling look-back of `CLOSE_SENTINEL.len() - 1` bytes across
// chunks so a sentinel split between two tokens is still recognized.
#[derive(Debug, Default)]
pub struct ThinkingExtractor {
    state: ThinkingState,
    reasoning_text: String,
    visible_text: String,
    segments: Vec<String>,
}

impl ThinkingExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears both accumulators and returns to `Visible`.
    pub fn reset(&mut self) {
        self.state = ThinkingState::Visible;
        self.reasoning_text.clear();
        self.visible_text.clear();
        self.segments.clear();
    }

    /// Routes one token chunk to the accumulators.
    pub fn push(&mut self, content: &str) -> ThinkingUpdate {
        let mut update = ThinkingUpdate::default();
        let mut rest = content;
        loop {
            match self.state {
                ThinkingState::Visible => match rest.find(OPEN_SENTINEL) {
                    Some(idx) => {
                        let before = &rest[..idx];
                        self.visible_text.push_str(before);
                        update.push(ThinkingPiece::Visible(before.to_string()));
                        self.state = ThinkingState::Reasoning;
                        rest = &rest[idx + OPEN_SENTINEL.len()..];
                    }
                    None => {
                        self.visible_text.push_str(rest);
                        update.push(ThinkingPiece::Visible(rest.to_string()));
                        break;
                    }
                },
                ThinkingState::Reasoning => match rest.find(CLOSE_SENTINEL) {
                    Some(idx) => {
                        let before = &rest[..idx];
                        self.reasoning_text.push_str(before);
                        update.push(ThinkingPiece::Reasoning(before.to_string()));

                        let segment = std::mem::take(&mut self.reasoning_text);
                        self.visible_text.push_str(OPEN_SENTINEL);
                        self.visible_text.push_str(&segment);
                        self.visible_text.push_str(CLOSE_SENTINEL);
                        self.segments.push(segment.clone());
                        update.push(ThinkingPiece::Closed(segment));

                        self.state = ThinkingState::Visible;
                        rest = &rest[idx + CLOSE_SENTINEL.len()..];
                    }
                    None => {
                        self.reasoning_text.push_str(rest);
                        update.push(ThinkingPiece::Reasoning(rest.to_string()));
                        break;
                    }
                },
            }
        }
        update
    }

    pub fn state(&self) -> ThinkingState {
        self.state
    }

    /// Reasoning text of the currently open segment.
    pub fn reasoning_text(&self) -> &str {
        &self.reasoning_text
    }

    /// Everything that will be committed as the answer.
    pub fn visible_text(&self) -> &str {
        &self.visible_text
    }

    /// Closed reasoning segments of this turn, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the committed text and reasoning, leaving the extractor reset.
    pub(crate) fn take(&mut self) -> (String, Vec<String>) {
        let visible = std::mem::take(&mut self.visible_text);
        let mut segments = std::mem::take(&mut self.segments);
        let open = std::mem::take(&mut self.reasoning_text);
        if !open.is_empty() {
            segments.push(open);
        }
        self.state = ThinkingState::Visible;
        (visible, segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tokens_stay_visible() {
        let mut extractor = ThinkingExtractor::new();
        extractor.push("Hello");
        extractor.push(", world");
        assert_eq!(extractor.visible_text(), "Hello, world");
        assert_eq!(extractor.reasoning_text(), "");
        assert_eq!(extractor.state(), ThinkingState::Visible);
    }

    #[test]
    fn single_chunk_with_both_sentinels() {
        let mut extractor = ThinkingExtractor::new();
        let update = extractor.push("<think>A</think>B");
        assert_eq!(update.closed_segments(), vec!["A"]);
        assert_eq!(update.reasoning(), "A");
        assert_eq!(update.visible(), "B");
        assert!(extractor.visible_text().contains('A'));
        assert!(extractor.visible_text().ends_with('B'));
        assert_eq!(extractor.visible_text(), "<think>A</think>B");
        assert_eq!(extractor.reasoning_text(), "");
        assert_eq!(extractor.state(), ThinkingState::Visible);
    }

    #[test]
    fn reasoning_spanning_several_chunks() {
        let mut extractor = ThinkingExtractor::new();
        extractor.push("Sure. <think>first ");
        assert_eq!(extractor.state(), ThinkingState::Reasoning);
        assert_eq!(extractor.visible_text(), "Sure. ");
        extractor.push("second ");
        assert_eq!(extractor.reasoning_text(), "first second ");
        let update = extractor.push("third</think> Answer");
        assert_eq!(update.closed_segments(), vec!["first second third"]);
        assert_eq!(
            extractor.visible_text(),
            "Sure. <think>first second third</think> Answer"
        );
        assert_eq!(extractor.segments(), ["first second third".to_string()]);
    }

    #[test]
    fn update_pieces_keep_chunk_order() {
        let mut extractor = ThinkingExtractor::new();
        let update = extractor.push("x<think>a</think>y");
        assert_eq!(
            update.pieces,
            vec![
                ThinkingPiece::Visible("x".into()),
                ThinkingPiece::Reasoning("a".into()),
                ThinkingPiece::Closed("a".into()),
                ThinkingPiece::Visible("y".into()),
            ]
        );
        let update = extractor.push("<think></think>");
        assert_eq!(update.pieces, vec![ThinkingPiece::Closed(String::new())]);
    }

    #[test]
    fn sentinel_split_across_chunks_is_not_recognized() {
        let mut extractor = ThinkingExtractor::new();
        extractor.push("<thi");
        extractor.push("nk>hidden");
        assert_eq!(extractor.state(), ThinkingState::Visible);
        assert_eq!(extractor.visible_text(), "<think>hidden");
        assert_eq!(extractor.reasoning_text(), "");
    }

    #[test]
    fn reset_clears_everything() {
        let mut extractor = ThinkingExtractor::new();
        extractor.push("a<think>b");
        extractor.reset();
        assert_eq!(extractor.state(), ThinkingState::Visible);
        assert_eq!(extractor.visible_text(), "");
        assert_eq!(extractor.reasoning_text(), "");
        assert!(extractor.segments().is_empty());
    }

    #[test]
    fn take_keeps_unclosed_reasoning_as_last_segment() {
        let mut extractor = ThinkingExtractor::new();
        extractor.push("x<think>a</think>y<think>dangling");
        let (visible, segments) = extractor.take();
        assert_eq!(visible, "x<think>a</think>y");
        assert_eq!(segments, vec!["a".to_string(), "dangling".to_string()]);
        assert_eq!(extractor.state(), ThinkingState::Visible);
        assert_eq!(extractor.visible_text(), "");
    }
}
