//! Server-side rendering of a resolved tag list into HTML fragments.

use crate::context::Head;
use crate::escape::{
    escape_attr, escape_raw_text, escape_text, find_ignore_ascii_case, is_raw_text_kind,
};
use crate::reconcile::OWNED_MARKER;
use crate::resolve::{ResolvedTag, ResolvedTags};
use crate::types::{AttrRender, AttrValue, TagContent, Zone};
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SsrOptions {
    /// Join tags without `\n`.
    pub omit_line_breaks: bool,
    /// Stamp the ownership marker so a client reconciler can adopt the output.
    pub hydration_markers: bool,
}

/// Rendered fragments. Attribute strings carry a leading space.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SsrHead {
    pub head_tags: String,
    pub body_tags_open: String,
    pub body_tags: String,
    pub html_attrs: String,
    pub body_attrs: String,
}

pub fn render_ssr_head(head: &Head) -> SsrHead {
    render_tags(&head.resolve(), &head.options().ssr)
}

pub fn render_tags(resolved: &ResolvedTags, options: &SsrOptions) -> SsrHead {
    let mut head = Vec::new();
    let mut body_open = Vec::new();
    let mut body_close = Vec::new();
    let mut out = SsrHead::default();
    for resolved_tag in resolved.iter() {
        let tag = &resolved_tag.tag;
        match tag.zone {
            Zone::HtmlAttrs => out.html_attrs = render_attributes(&tag.attributes),
            Zone::BodyAttrs => out.body_attrs = render_attributes(&tag.attributes),
            Zone::Head => head.push(render_tag(resolved_tag, options)),
            Zone::BodyOpen => body_open.push(render_tag(resolved_tag, options)),
            Zone::BodyClose => body_close.push(render_tag(resolved_tag, options)),
        }
    }
    let separator = if options.omit_line_breaks { "" } else { "\n" };
    out.head_tags = head.join(separator);
    out.body_tags_open = body_open.join(separator);
    out.body_tags = body_close.join(separator);
    out
}

pub fn render_tag(resolved: &ResolvedTag, options: &SsrOptions) -> String {
    let tag = &resolved.tag;
    let kind = &*tag.kind;
    let mut out = String::with_capacity(32);
    out.push('<');
    out.push_str(kind);
    out.push_str(&render_attributes(&tag.attributes));
    if options.hydration_markers {
        let marker = resolved
            .identity
            .dedup_key()
            .map(|k| k.as_str())
            .unwrap_or_default();
        let _ = write!(out, " {OWNED_MARKER}=\"{}\"", escape_attr(marker));
    }
    out.push('>');
    if tag.is_void() {
        return out;
    }
    match &tag.content {
        Some(TagContent::Text(text)) if is_raw_text_kind(kind) => {
            out.push_str(&escape_raw_text(kind, text));
        }
        Some(TagContent::Text(text)) => out.push_str(&escape_text(text)),
        Some(TagContent::Html(html)) => out.push_str(html),
        None => {}
    }
    let _ = write!(out, "</{kind}>");
    out
}

/// Attribute string with a leading space per attribute; `false` flags are
/// omitted and `true` flags render bare.
pub fn render_attributes(attributes: &[(Arc<str>, AttrValue)]) -> String {
    let mut out = String::new();
    for (name, value) in attributes {
        match value.render() {
            AttrRender::Omit => {}
            AttrRender::Bare => {
                out.push(' ');
                out.push_str(name);
            }
            AttrRender::Value(v) => {
                let _ = write!(out, " {name}=\"{}\"", escape_attr(&v));
            }
        }
    }
    out
}

/// Splices rendered fragments into an HTML document template. Anchors that
/// are missing from the template are skipped.
pub fn inject_head(template: &str, ssr: &SsrHead) -> String {
    let mut insertions: Vec<(usize, &str)> = Vec::new();
    if let Some(at) = find_tag(template, "<html", 0) {
        insertions.push((at + 5, ssr.html_attrs.as_str()));
    }
    if let Some(at) = find_tag(template, "</head", 0) {
        insertions.push((at, ssr.head_tags.as_str()));
    }
    if let Some(at) = find_tag(template, "<body", 0) {
        insertions.push((at + 5, ssr.body_attrs.as_str()));
        if let Some(rel) = memchr::memchr(b'>', &template.as_bytes()[at..]) {
            insertions.push((at + rel + 1, ssr.body_tags_open.as_str()));
        }
    }
    let mut last_body_close = None;
    let mut from = 0;
    while let Some(at) = find_tag(template, "</body", from) {
        last_body_close = Some(at);
        from = at + 1;
    }
    if let Some(at) = last_body_close {
        insertions.push((at, ssr.body_tags.as_str()));
    }
    insertions.retain(|(_, fragment)| !fragment.is_empty());
    insertions.sort_by_key(|(at, _)| *at);

    let extra: usize = insertions.iter().map(|(_, f)| f.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut cursor = 0;
    for (at, fragment) in insertions {
        out.push_str(&template[cursor..at]);
        out.push_str(fragment);
        cursor = at;
    }
    out.push_str(&template[cursor..]);
    out
}

/// Finds `prefix` (e.g. `<body` or `</head`) followed by whitespace, `>` or
/// `/`, so `<header>` never matches `<head`.
fn find_tag(template: &str, prefix: &str, from: usize) -> Option<usize> {
    let bytes = template.as_bytes();
    let mut from = from;
    loop {
        let pos = find_ignore_ascii_case(template, prefix, from)?;
        let boundary = bytes.get(pos + prefix.len());
        if boundary.is_none_or(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/') {
            return Some(pos);
        }
        from = pos + 1;
    }
}
