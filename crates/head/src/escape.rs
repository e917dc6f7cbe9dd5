use memchr::{memchr, memchr2, memchr3};
use std::borrow::Cow;

/// Escapes `&`, `<` and `>` in text content.
pub fn escape_text(input: &str) -> Cow<'_, str> {
    match memchr3(b'&', b'<', b'>', input.as_bytes()) {
        None => Cow::Borrowed(input),
        Some(first) => Cow::Owned(escape_from(input, first, false)),
    }
}

/// Escapes `&`, `"`, `<` and `>` in a double-quoted attribute value.
pub fn escape_attr(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let first = match (memchr3(b'&', b'"', b'<', bytes), memchr(b'>', bytes)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };
    match first {
        None => Cow::Borrowed(input),
        Some(first) => Cow::Owned(escape_from(input, first, true)),
    }
}

fn escape_from(input: &str, first: usize, quotes: bool) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    out.push_str(&input[..first]);
    for ch in input[first..].chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Raw text elements (`script`, `style`) are not entity-decoded by browsers,
/// so their text is kept as is except for sequences that would close the
/// element early.
pub fn escape_raw_text<'a>(kind: &str, input: &'a str) -> Cow<'a, str> {
    let Some(first) = find_close_tag(input, kind, 0) else {
        return Cow::Borrowed(input);
    };
    let mut out = String::with_capacity(input.len() + 8);
    let mut cursor = 0;
    let mut at = Some(first);
    while let Some(pos) = at {
        out.push_str(&input[cursor..pos]);
        out.push_str("<\\/");
        cursor = pos + 2;
        at = find_close_tag(input, kind, cursor);
    }
    out.push_str(&input[cursor..]);
    Cow::Owned(out)
}

pub fn is_raw_text_kind(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("script") || kind.eq_ignore_ascii_case("style")
}

/// Finds `</kind` (ASCII case-insensitive) at or after `from`.
fn find_close_tag(input: &str, kind: &str, from: usize) -> Option<usize> {
    let hay = input.as_bytes();
    let mut i = from;
    while i < hay.len() {
        let rel = memchr(b'<', &hay[i..])?;
        let pos = i + rel;
        let name_start = pos + 2;
        let name_end = name_start + kind.len();
        if hay.get(pos + 1) == Some(&b'/')
            && name_end <= hay.len()
            && hay[name_start..name_end].eq_ignore_ascii_case(kind.as_bytes())
        {
            return Some(pos);
        }
        i = pos + 1;
    }
    None
}

/// ASCII case-insensitive substring search starting at `from`.
pub(crate) fn find_ignore_ascii_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    let n = needle.len();
    if n == 0 {
        return Some(from.min(hay.len()));
    }
    let first = needle[0];
    let (a, b) = (first.to_ascii_lowercase(), first.to_ascii_uppercase());
    let mut i = from;
    while i + n <= hay.len() {
        let found = if a == b {
            memchr(a, &hay[i..])
        } else {
            memchr2(a, b, &hay[i..])
        };
        let rel = found?;
        let pos = i + rel;
        if pos + n <= hay.len() && hay[pos..pos + n].eq_ignore_ascii_case(needle) {
            return Some(pos);
        }
        i = pos + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_borrowed() {
        assert!(matches!(escape_text("hello"), Cow::Borrowed("hello")));
        assert!(matches!(escape_attr("a b"), Cow::Borrowed("a b")));
    }

    #[test]
    fn text_and_attr_escaping() {
        assert_eq!(escape_text("a < b & c > \"d\""), "a &lt; b &amp; c &gt; \"d\"");
        assert_eq!(escape_attr("say \"hi\" > <x>"), "say &quot;hi&quot; &gt; &lt;x&gt;");
        assert_eq!(escape_attr("tail>"), "tail&gt;");
    }

    #[test]
    fn raw_text_neutralizes_close_tags_only() {
        assert_eq!(
            escape_raw_text("script", "if (a < b) { s = '</SCRIPT>' }"),
            "if (a < b) { s = '<\\/SCRIPT>' }"
        );
        assert!(matches!(
            escape_raw_text("style", "a > b { color: red }"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn case_insensitive_search() {
        assert_eq!(find_ignore_ascii_case("<HTML lang>", "<html", 0), Some(0));
        assert_eq!(find_ignore_ascii_case("abc", "d", 0), None);
        assert_eq!(find_ignore_ascii_case("</body></BODY>", "</body>", 1), Some(7));
    }
}
