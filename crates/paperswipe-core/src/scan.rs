//! Locating a JSON object embedded in free text.
//!
//! The scanner counts `{` and `}` only. It does not track string literals, so a
//! brace inside a quoted value (e.g. `{"t": "a } b"}`) closes the object early and
//! the candidate fails to decode. Upstream payloads are prose JSON without such
//! braces in practice; a JSON-aware scanner would close this gap.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No `{` seen yet.
    Seeking,
    /// Inside the first object; `depth` is the count of unclosed braces.
    Inside { start: usize, depth: usize },
    /// The first object closed; `end` is exclusive.
    Closed { start: usize, end: usize },
}

#[derive(Debug, Clone)]
pub struct BraceScanner {
    state: ScanState,
}

impl Default for BraceScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BraceScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Seeking,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feeds one character at byte offset `at`. Returns the new state.
    pub fn step(&mut self, at: usize, c: char) -> ScanState {
        self.state = match (self.state, c) {
            (ScanState::Seeking, '{') => ScanState::Inside { start: at, depth: 1 },
            (ScanState::Seeking, _) => ScanState::Seeking,
            (ScanState::Inside { start, depth }, '{') => ScanState::Inside {
                start,
                depth: depth + 1,
            },
            (ScanState::Inside { start, depth: 1 }, '}') => ScanState::Closed {
                start,
                end: at + c.len_utf8(),
            },
            (ScanState::Inside { start, depth }, '}') => ScanState::Inside {
                start,
                depth: depth - 1,
            },
            (s @ ScanState::Inside { .. }, _) => s,
            (s @ ScanState::Closed { .. }, _) => s,
        };
        self.state
    }

    /// Runs the scanner over `text` and returns the byte range of the first
    /// balanced object, if any.
    pub fn scan(mut self, text: &str) -> Option<(usize, usize)> {
        for (at, c) in text.char_indices() {
            if let ScanState::Closed { start, end } = self.step(at, c) {
                return Some((start, end));
            }
        }
        None
    }
}

/// Returns the substring from the first `{` to its matching `}` (inclusive).
///
/// `None` if there is no `{` or the braces never balance.
pub fn find_balanced_object(text: &str) -> Option<&str> {
    BraceScanner::new()
        .scan(text)
        .map(|(start, end)| &text[start..end])
}
