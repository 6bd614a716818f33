//! Text cleanup before synthesis
//!
//! Assistant responses arrive as markdown-ish text; speaking the markup
//! verbatim sounds terrible. Code blocks collapse to the words "code
//! block", inline emphasis is unwrapped, and tags/entities are removed.

use std::sync::LazyLock;

use regex::Regex;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[\s\S]*?```").unwrap_or_else(|_| unreachable!()));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap_or_else(|_| unreachable!()));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap_or_else(|_| unreachable!()));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap_or_else(|_| unreachable!()));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap_or_else(|_| unreachable!()));
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[a-zA-Z#0-9]+;").unwrap_or_else(|_| unreachable!()));

/// Strip markup from `text`, leaving something speakable
#[must_use]
pub fn strip_markup(text: &str) -> String {
    let text = CODE_BLOCK.replace_all(text, "code block");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, "");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(strip_markup("Hello there"), "Hello there");
    }

    #[test]
    fn test_code_block_collapsed() {
        let input = "Try this:\n```rust\nfn main() {}\n```\nDone.";
        assert_eq!(strip_markup(input), "Try this:\ncode block\nDone.");
    }

    #[test]
    fn test_inline_markup_unwrapped() {
        assert_eq!(
            strip_markup("Use `cargo` with **force** and *care*"),
            "Use cargo with force and care"
        );
    }

    #[test]
    fn test_tags_and_entities_removed() {
        assert_eq!(strip_markup("a <b>bold</b> move &amp; more"), "a bold move  more");
    }
}
