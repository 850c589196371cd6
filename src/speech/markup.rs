//! Flattening of speech markup
//!
//! Backends without markup support still have to say something sensible for
//! SSML/JSML input, so tags are dropped and basic entities decoded.

use once_cell::sync::Lazy;
use regex::Regex;

/// XML comments, processing instructions and doctype declarations
static DECLARATIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|<\?.*?\?>|<!DOCTYPE[^>]*>").expect("valid regex"));

/// Any element tag
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Entity name -> replacement text
const ENTITIES: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&amp;", "&"),
];

/// Strip markup down to the text a listener should hear
pub fn to_plain_text(markup: &str) -> String {
    let without_declarations = DECLARATIONS.replace_all(markup, "");
    let without_tags = TAGS.replace_all(&without_declarations, " ");
    let collapsed = WHITESPACE.replace_all(&without_tags, " ");

    // &amp; is last so "&amp;lt;" decodes to "&lt;" and not "<"
    let mut text = collapsed.trim().to_string();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    text
}

/// Heuristic: does this text look like markup rather than plain text?
pub fn looks_like_markup(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("<?xml") || trimmed.starts_with("<speak") || trimmed.starts_with("<jsml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_tags() {
        assert_eq!(
            to_plain_text("<speak>Hello <emphasis>big</emphasis> world</speak>"),
            "Hello big world"
        );
    }

    #[test]
    fn test_break_separates_words() {
        assert_eq!(to_plain_text("one<break time=\"200ms\"/>two"), "one two");
    }

    #[test]
    fn test_declarations_removed() {
        let source = "<?xml version=\"1.0\"?>\n<!-- greeting -->\n<speak>hi</speak>";
        assert_eq!(to_plain_text(source), "hi");
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(to_plain_text("<speak>a &lt; b &amp;&amp; c</speak>"), "a < b && c");
        assert_eq!(to_plain_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(to_plain_text("just text"), "just text");
    }

    #[test]
    fn test_looks_like_markup() {
        assert!(looks_like_markup("  <speak>hi</speak>"));
        assert!(looks_like_markup("<?xml version=\"1.0\"?><speak/>"));
        assert!(!looks_like_markup("a < b"));
    }
}
