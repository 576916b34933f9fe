// src/extractors/tokenizer.rs
//! Strips an uncontrolled HTML document down to an ordered stream of
//! trimmed text lines.
//!
//! Deliberately regex-driven, not a DOM parser: the calendar page carries no
//! stable structure worth modeling, and a noisier token stream degrades
//! gracefully downstream where a parse failure would not. There are no error
//! paths here at all.

use once_cell::sync::Lazy;
use regex::Regex;

// <script>/<style> blocks disappear entirely, content included.
static SCRIPT_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("Failed to compile SCRIPT_BLOCK_RE")
});

static STYLE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("Failed to compile STYLE_BLOCK_RE")
});

// Tags that end a visual line on the calendar grid: <br> plus the closing
// forms of row/cell/block containers.
static LINE_BREAK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:tr|td|th|div|p|li|h[1-6])\s*>")
        .expect("Failed to compile LINE_BREAK_TAG_RE")
});

// Everything else that still looks like a tag.
static ANY_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("Failed to compile ANY_TAG_RE"));

static NUMERIC_ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("Failed to compile NUMERIC_ENTITY_RE")
});

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE"));

/// Decodes the minimal entity set the source pages actually use, plus
/// numeric character references. Unknown entities pass through untouched.
fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures| {
        let body = &caps[1];
        let code = if let Some(hex) = body.strip_prefix('x') {
            u32::from_str_radix(hex, 16).ok()
        } else {
            body.parse::<u32>().ok()
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Converts raw HTML into an ordered sequence of non-empty trimmed lines,
/// one per logical visual line, preserving document order.
pub fn html_to_lines(html: &str) -> Vec<String> {
    let text = SCRIPT_BLOCK_RE.replace_all(html, "");
    let text = STYLE_BLOCK_RE.replace_all(&text, "");
    let text = LINE_BREAK_TAG_RE.replace_all(&text, "\n");
    // Remaining tags become spaces so adjacent words do not glue together.
    let text = ANY_TAG_RE.replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(|line| WHITESPACE_RE.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Cleans a single HTML fragment (a table cell, a link body) into one
/// whitespace-collapsed line. Same tag/entity handling as [`html_to_lines`].
pub fn strip_fragment(fragment: &str) -> String {
    let text = ANY_TAG_RE.replace_all(fragment, " ");
    let text = decode_entities(&text);
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style_blocks_with_content() {
        let html = r#"
            <html><head>
            <style type="text/css"> td { color: red } </style>
            <script>var x = "3 코 가짜 [시작]";</script>
            </head><body><td>실제 내용</td></body></html>
        "#;
        let lines = html_to_lines(html);
        assert_eq!(lines, vec!["실제 내용".to_string()]);
    }

    #[test]
    fn closing_cells_and_br_split_lines() {
        let html = "<tr><td>3</td><td>코 가상회사 [시작]<br>기 다른회사 [종료]</td></tr>";
        let lines = html_to_lines(html);
        assert_eq!(
            lines,
            vec![
                "3".to_string(),
                "코 가상회사 [시작]".to_string(),
                "기 다른회사 [종료]".to_string(),
            ]
        );
    }

    #[test]
    fn decodes_entities_including_numeric() {
        let html = "<p>A&nbsp;&amp;&nbsp;B</p><p>&#44032;&#51221;</p><p>&#x AC00;</p>";
        let lines = html_to_lines(html);
        assert_eq!(lines[0], "A & B");
        assert_eq!(lines[1], "가정");
        // Malformed numeric reference passes through rather than panicking.
        assert!(lines[2].contains("&#x"));
    }

    #[test]
    fn collapses_internal_whitespace_and_drops_empty_lines() {
        let html = "<div>  유   케이뱅크\t[시작] </div><div>   </div><div></div>";
        let lines = html_to_lines(html);
        assert_eq!(lines, vec!["유 케이뱅크 [시작]".to_string()]);
    }

    #[test]
    fn malformed_html_degrades_instead_of_failing() {
        let html = "<td>3<td>코 회사 [시작]<table><<<>broken";
        let lines = html_to_lines(html);
        assert!(lines.iter().any(|l| l.contains("회사")));
    }

    #[test]
    fn strip_fragment_cleans_a_cell() {
        let cell = " <a href=\"x\"> 가상회사 </a>&nbsp;<font>(유가)</font> ";
        assert_eq!(strip_fragment(cell), "가상회사 (유가)");
    }
}
