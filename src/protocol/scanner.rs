//! Token scanner for raw receive buffers.
//!
//! The backend interleaves replies and asynchronous events on one socket and
//! a single receive may carry part of a frame, one frame or several. Instead
//! of re-deriving frame boundaries, each receive buffer is searched for the
//! known [`Token`]s.
//!
//! The last few bytes of every buffer are carried into the next scan so that
//! a token split across two receives is still found. A match only counts when
//! it ends inside the new bytes, which keeps a token from firing twice.
//!
//! # Example
//!
//! ```
//! use mythwire_client::protocol::{ReplyScanner, Token};
//!
//! let mut scanner = ReplyScanner::new();
//!
//! let first = scanner.scan(b"      15SCHEDULE_CH");
//! assert!(!first.contains(Token::ScheduleChange));
//!
//! let second = scanner.scan(b"ANGE");
//! assert!(second.contains(Token::ScheduleChange));
//! ```

use std::borrow::Cow;

use super::commands::{Token, FIELD_SEPARATOR};

/// Scanner that keeps a short tail of the previous receive.
#[derive(Debug, Clone)]
pub struct ReplyScanner {
    tail: Vec<u8>,
    tail_len: usize,
}

impl ReplyScanner {
    /// Create a scanner whose carry-over covers the longest token.
    pub fn new() -> Self {
        Self::with_tail_len(Token::max_len() - 1)
    }

    /// Create a scanner carrying `tail_len` bytes between receives.
    ///
    /// Must be at least `Token::max_len() - 1` to catch every split token.
    pub fn with_tail_len(tail_len: usize) -> Self {
        Self {
            tail: Vec::with_capacity(tail_len),
            tail_len,
        }
    }

    /// Scan one receive buffer.
    pub fn scan(&mut self, data: &[u8]) -> Reply {
        let fresh_from = self.tail.len();
        let mut window = std::mem::take(&mut self.tail);
        window.extend_from_slice(data);

        let keep = window.len().min(self.tail_len);
        self.tail = window[window.len() - keep..].to_vec();

        Reply { window, fresh_from }
    }

    /// Forget the carried bytes.
    pub fn reset(&mut self) {
        self.tail.clear();
    }
}

impl Default for ReplyScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// The text of one receive (plus carried tail) with token lookups.
#[derive(Debug, Clone)]
pub struct Reply {
    window: Vec<u8>,
    fresh_from: usize,
}

impl Reply {
    /// Whether `token` occurs in this receive.
    pub fn contains(&self, token: Token) -> bool {
        self.find_fresh(token.as_str().as_bytes()).is_some()
    }

    /// Whether a `token` occurrence is followed, within its field, by `word`
    /// (ASCII case ignored).
    ///
    /// Matches `CLIENT_CONNECTED HOSTNAME den` for `den`, but not a `den` that
    /// only appears elsewhere in the window. The word must end in the new
    /// bytes, so a match is reported once.
    pub fn word_after(&self, token: Token, word: &str) -> bool {
        let needle = token.as_str().as_bytes();
        let n = needle.len();
        if word.is_empty() || self.window.len() < n {
            return false;
        }

        (0..=self.window.len() - n)
            .filter(|&p| &self.window[p..p + n] == needle)
            .any(|p| {
                let start = p + n;
                let rest = &self.window[start..];
                let end = find_bytes(rest, FIELD_SEPARATOR.as_bytes()).unwrap_or(rest.len());
                let mut offset = start;

                rest[..end].split(|b| b.is_ascii_whitespace()).any(|w| {
                    let word_end = offset + w.len();
                    offset = word_end + 1;
                    word_end > self.fresh_from && w.eq_ignore_ascii_case(word.as_bytes())
                })
            })
    }

    /// First field following `token`, e.g. `"91"` for `REJECT[]:[]91`.
    ///
    /// Returns `None` when the token is absent, and an empty string when the
    /// token carries no field.
    pub fn field_after(&self, token: Token) -> Option<String> {
        let needle = token.as_str().as_bytes();
        let start = self.find_fresh(needle)? + needle.len();

        let rest = String::from_utf8_lossy(&self.window[start..]);
        let rest = rest.strip_prefix(FIELD_SEPARATOR).unwrap_or(&rest);
        let field = rest.split(FIELD_SEPARATOR).next().unwrap_or_default();

        Some(field.trim().to_string())
    }

    /// Whole window as lossy text (for logging).
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.window)
    }

    /// Number of bytes this receive added.
    pub fn fresh_len(&self) -> usize {
        self.window.len() - self.fresh_from
    }

    fn find_fresh(&self, needle: &[u8]) -> Option<usize> {
        let n = needle.len();
        if n == 0 || self.window.len() < n {
            return None;
        }
        // Matches lying wholly inside the carried tail were already reported.
        let start = self.fresh_from.saturating_sub(n - 1);
        (start..=self.window.len() - n).find(|&p| &self.window[p..p + n] == needle)
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
