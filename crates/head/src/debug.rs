use crate::resolve::ResolvedTags;
use crate::types::Tag;

const PREVIEW_CHARS: usize = 40;
const OUTLINE_ATTRS: [&str; 8] = [
    "id",
    "charset",
    "name",
    "property",
    "http-equiv",
    "rel",
    "href",
    "src",
];

/// First `max_chars` characters folded onto one line, with an ellipsis when
/// the text was cut.
fn one_line_preview(text: &str, max_chars: usize) -> String {
    let cut = text.char_indices().nth(max_chars).map(|(at, _)| at);
    let mut preview = text[..cut.unwrap_or(text.len())].replace(['\n', '\r'], " ");
    if cut.is_some() {
        preview.push('…');
    }
    preview
}

/// Compact one-line-per-tag outline, followed by one line per diagnostic.
/// At most `cap` lines are produced.
pub fn outline_resolved(resolved: &ResolvedTags, cap: usize) -> Vec<String> {
    fn tag_line(tag: &Tag, key: Option<&str>) -> String {
        let mut line = String::with_capacity(64);
        line.push_str(tag.zone.label());
        line.push_str(" <");
        line.push_str(&tag.kind);
        for name in OUTLINE_ATTRS {
            if let Some(value) = tag.attr_str(name) {
                line.push(' ');
                line.push_str(name);
                line.push_str("=\"");
                line.push_str(&value);
                line.push('"');
            }
        }
        line.push('>');
        if let Some(content) = &tag.content {
            let trimmed = content.as_str().trim();
            if !trimmed.is_empty() {
                line.push_str(" \"");
                line.push_str(&one_line_preview(trimmed, PREVIEW_CHARS));
                line.push('"');
            }
        }
        if let Some(key) = key {
            line.push_str(" [");
            line.push_str(key);
            line.push(']');
        }
        line
    }

    let tags = resolved
        .iter()
        .map(|t| tag_line(&t.tag, t.identity.dedup_key().map(|k| k.as_str())));
    let diagnostics = resolved.diagnostics.iter().map(|d| format!("! {d}"));
    tags.chain(diagnostics).take(cap).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EntryOptions, Registry};
    use crate::resolve::Resolver;
    use crate::types::{TagInput, Zone};
    use core_types::RenderSide;

    #[test]
    fn outline_lists_tags_then_diagnostics() {
        let mut registry = Registry::new(RenderSide::Client);
        registry.push(
            vec![
                TagInput::title("Hello\nworld"),
                TagInput::meta_name("description", "d"),
                TagInput::new("script").inner_html("go()").zone(Zone::BodyClose),
                TagInput::new("meta").text("oops"),
            ],
            EntryOptions::default(),
        );
        let resolved = Resolver::new().resolve(&registry);
        assert_eq!(
            outline_resolved(&resolved, 10),
            vec![
                "head <title> \"Hello world\" [title]".to_string(),
                "head <meta name=\"description\"> [meta:name:description]".to_string(),
                "bodyClose <script> \"go()\"".to_string(),
                "! entry#1 tag #3 <meta>: void element `meta` cannot carry content".to_string(),
            ]
        );
        assert_eq!(outline_resolved(&resolved, 2).len(), 2);
    }

    #[test]
    fn long_previews_are_cut_on_char_boundaries() {
        assert_eq!(one_line_preview("a\r\nb", 10), "a  b");
        assert_eq!(one_line_preview("ééééé", 3), "ééé…");
        assert_eq!(one_line_preview("abc", 3), "abc");
    }
}
