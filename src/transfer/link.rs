//! Link classifier: turns a shareable message link into a transfer start point.
//!
//! Two shapes are accepted:
//! - `https://t.me/c/<internal_chat_number>/<sequence>` → private, chat `-100<number>`
//! - `https://t.me/<handle>/<sequence>` → public, chat `<handle>`
//!
//! Anything else (extra path segments, missing sequence, numbers that do not
//! fit an `i64`) fails classification. Classification never panics.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether a chat needs a delegated session to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessClass {
    /// Internal numeric channel; only reachable through a delegated session.
    Private,
    /// Handle-addressable chat; the bot reads it first, delegated session as fallback.
    Public,
}

impl std::fmt::Display for AccessClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Private => "private",
            Self::Public => "public",
        };
        write!(f, "{s}")
    }
}

/// Chat identifier as the messaging layer expects it: `-100<digits>` or a handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRef(String);

impl ChatRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a numeric id rather than a handle.
    pub fn is_numeric(&self) -> bool {
        let digits = self.0.strip_prefix('-').unwrap_or(&self.0);
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }
}

impl std::fmt::Display for ChatRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A successfully classified link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLink {
    pub chat: ChatRef,
    pub sequence: i64,
    pub access: AccessClass,
}

/// Compiled link patterns.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    internal: Regex,
    handle: Regex,
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkClassifier {
    pub fn new() -> Self {
        Self {
            internal: Regex::new(r"^(?:https?://)?(?:www\.)?t\.me/c/(\d+)/(\d+)/?$").unwrap(),
            handle: Regex::new(r"^(?:https?://)?(?:www\.)?t\.me/([^/\s?#]+)/(\d+)/?$").unwrap(),
        }
    }

    /// Classify raw operator text. `None` means the text is not a usable link.
    pub fn classify(&self, text: &str) -> Option<MessageLink> {
        let text = text.trim();

        if let Some(caps) = self.internal.captures(text) {
            let number = &caps[1];
            // Parse only to reject overflow; the id keeps the operator's digits.
            number.parse::<i64>().ok()?;
            let sequence = caps[2].parse::<i64>().ok()?;
            let chat = ChatRef::new(format!("-100{number}"));
            chat.as_str().parse::<i64>().ok()?;
            return Some(MessageLink {
                chat,
                sequence,
                access: AccessClass::Private,
            });
        }

        let caps = self.handle.captures(text)?;
        let handle = &caps[1];
        // `t.me/c/<n>` without a sequence is a truncated internal link, not a handle.
        if handle == "c" {
            return None;
        }
        let sequence = caps[2].parse::<i64>().ok()?;
        Some(MessageLink {
            chat: ChatRef::new(handle),
            sequence,
            access: AccessClass::Public,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Option<MessageLink> {
        LinkClassifier::new().classify(text)
    }

    #[test]
    fn internal_link_is_private() {
        let link = classify("https://t.me/c/1001/10").unwrap();
        assert_eq!(link.chat.as_str(), "-1001001");
        assert_eq!(link.sequence, 10);
        assert_eq!(link.access, AccessClass::Private);
    }

    #[test]
    fn internal_link_without_scheme() {
        let link = classify("t.me/c/123456789/1").unwrap();
        assert_eq!(link.chat.as_str(), "-100123456789");
        assert_eq!(link.sequence, 1);
        assert_eq!(link.access, AccessClass::Private);
    }

    #[test]
    fn handle_link_is_public() {
        let link = classify("https://t.me/some_channel/42").unwrap();
        assert_eq!(link.chat.as_str(), "some_channel");
        assert_eq!(link.sequence, 42);
        assert_eq!(link.access, AccessClass::Public);
    }

    #[test]
    fn any_slash_free_handle_is_public() {
        for handle in ["news", "bad-handle", "some.name", "Chan_42", "канал", "x"] {
            for sequence in [1_i64, 17, 9_999_999] {
                let link = classify(&format!("https://t.me/{handle}/{sequence}"))
                    .unwrap_or_else(|| panic!("{handle}/{sequence} should classify"));
                assert_eq!(link.chat.as_str(), handle);
                assert_eq!(link.sequence, sequence);
                assert_eq!(link.access, AccessClass::Public);
            }
        }
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(classify("  https://t.me/news/7\n").is_some());
    }

    #[test]
    fn rejects_non_links() {
        for text in [
            "",
            "hello",
            "https://example.com/c/1/2",
            "https://t.me/",
            "https://t.me/news",
            "https://t.me/news/",
            "https://t.me/c/1001",
            "https://t.me/c/1001/",
            "https://t.me/c/abc/10",
            "https://t.me/c/1001/10/5",
            "https://t.me/news/abc",
            "https://t.me/news/-5",
            "https://t.me/a b/5",
        ] {
            assert!(classify(text).is_none(), "should reject {text:?}");
        }
    }

    #[test]
    fn rejects_overflowing_numbers() {
        assert!(classify("https://t.me/c/1001/99999999999999999999999").is_none());
        assert!(classify("https://t.me/c/99999999999999999999/1").is_none());
        assert!(classify("https://t.me/news/99999999999999999999999").is_none());
    }

    #[test]
    fn internal_links_keep_operator_digits() {
        for (n, m) in [(1_i64, 1_i64), (42, 7), (1_234_567_890, 999_999)] {
            let link = classify(&format!("https://t.me/c/{n}/{m}")).unwrap();
            assert_eq!(link.chat.as_str(), format!("-100{n}"));
            assert_eq!(link.sequence, m);
            assert_eq!(link.access, AccessClass::Private);
        }
    }

    #[test]
    fn chat_ref_numeric_detection() {
        assert!(ChatRef::new("-1001001").is_numeric());
        assert!(ChatRef::new("12345").is_numeric());
        assert!(!ChatRef::new("some_channel").is_numeric());
        assert!(!ChatRef::new("-").is_numeric());
    }
}
