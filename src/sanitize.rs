//! Input sanitization for untrusted free text.
//!
//! Two entry points:
//!
//! - [`strip_markup`] removes tags and comments, keeping text content.
//! - [`sanitize`] additionally deletes a fixed denylist of SQL keywords.
//!
//! Both trim the result. This is defense in depth only: every store query
//! binds its parameters, so nothing here stands between user input and SQL.

use once_cell::sync::Lazy;
use regex::Regex;

/// Keywords removed by [`sanitize`], matched case-insensitively as raw substrings
pub const SQL_DENYLIST: [&str; 7] = ["DROP", "DELETE", "UPDATE", "INSERT", "SELECT", "UNION", "--"];

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?(-->|$)").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static UNTERMINATED_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z/!?][^>]*$").unwrap());
static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    let alternatives: Vec<String> = SQL_DENYLIST.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!("(?i){}", alternatives.join("|"))).unwrap()
});

fn remove_tags(input: &str) -> String {
    let without_comments = COMMENT_RE.replace_all(input, "");
    let without_tags = TAG_RE.replace_all(&without_comments, "");
    UNTERMINATED_TAG_RE.replace_all(&without_tags, "").into_owned()
}

fn remove_keywords(input: &str) -> String {
    // Deleting one keyword can splice another together ("DRDROPOP")
    let mut current = input.to_string();
    while KEYWORD_RE.is_match(&current) {
        current = KEYWORD_RE.replace_all(&current, "").into_owned();
    }
    current
}

/// Strip markup and surrounding whitespace
pub fn strip_markup(raw: &str) -> String {
    remove_tags(raw).trim().to_string()
}

/// Full pipeline: markup, denylisted keywords, then whitespace
pub fn sanitize(raw: &str) -> String {
    let text = remove_tags(raw);
    let text = remove_keywords(&text);
    // Keyword removal never opens a tag, but "<scr--ipt" style input should not survive either
    remove_tags(&text).trim().to_string()
}

/// Returns true when `text` still contains a denylisted keyword
pub fn contains_denylisted(text: &str) -> bool {
    KEYWORD_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_tags() {
        let cleaned = sanitize("<script>alert('x')</script>Dune");
        assert!(!cleaned.contains('<'));
        assert!(!cleaned.contains('>'));
        assert_eq!(cleaned, "alert('x')Dune");
    }

    #[test]
    fn strips_nested_and_attribute_markup() {
        assert_eq!(
            strip_markup("<p class=\"x\">Hello <b>world</b></p>"),
            "Hello world"
        );
        assert_eq!(strip_markup("<img src=x onerror=alert(1)>"), "");
    }

    #[test]
    fn strips_comments_and_unterminated_tags() {
        assert_eq!(strip_markup("a<!-- hidden -->b"), "ab");
        assert_eq!(strip_markup("title <script src=evil"), "title");
    }

    #[test]
    fn keeps_plain_comparisons() {
        assert_eq!(strip_markup("1 < 2"), "1 < 2");
    }

    #[test]
    fn removes_keywords_any_case() {
        assert_eq!(sanitize("DROP TABLE books"), "TABLE books");
        assert_eq!(sanitize("drop table books"), "table books");
        assert_eq!(sanitize("DrOp table"), "table");
        assert_eq!(sanitize("x' UNION SELECT password --"), "x'   password");
    }

    #[test]
    fn removes_keywords_embedded_in_words() {
        // Literal substring deletion, not tokenized
        assert_eq!(sanitize("Updates"), "s");
        assert_eq!(sanitize("selection"), "ion");
    }

    #[test]
    fn keyword_removal_reaches_fixpoint() {
        let cleaned = sanitize("DRDROPOP SELSELECTECT -----");
        assert!(!contains_denylisted(&cleaned));
    }

    #[test]
    fn strip_markup_leaves_keywords() {
        assert_eq!(strip_markup("  <i>Update</i> notes "), "Update notes");
    }

    #[test]
    fn output_never_contains_denylisted_keywords() {
        let inputs = [
            "'; DROP TABLE bookshelf_book; --",
            "1 OR 1=1 union all select * from auth_user",
            "<b>InSeRt</b> into",
            "dEleTe-- -- --",
            "Herbert",
        ];
        for input in inputs {
            let cleaned = sanitize(input);
            assert!(!contains_denylisted(&cleaned), "{:?} -> {:?}", input, cleaned);
            assert!(!TAG_RE.is_match(&cleaned));
        }
    }
}
