//! Identity derivation for head tags.
//!
//! Two tags with the same [`DedupKey`] compete for one slot in the resolved
//! head. Tags without a derivable key are independent and always survive.

use crate::types::Tag;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(Arc<str>);

impl DedupKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        DedupKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds with implicit cardinality one.
const SINGLETON_KINDS: [&str; 6] = [
    "title",
    "base",
    "titleTemplate",
    "templateParams",
    "htmlAttrs",
    "bodyAttrs",
];

const META_IDENTITY_ATTRS: [&str; 3] = ["name", "property", "http-equiv"];

pub fn dedup_key(tag: &Tag) -> Option<DedupKey> {
    let kind = &*tag.kind;

    if let Some(key) = tag.key.as_deref() {
        return Some(DedupKey::new(format!("{kind}:key:{key}")));
    }
    if SINGLETON_KINDS.contains(&kind) {
        return Some(DedupKey::new(kind));
    }
    if kind == "meta" && tag.attr("charset").is_some() {
        return Some(DedupKey::new("meta:charset"));
    }
    if kind == "link" && tag.attr_has_token("rel", "canonical") {
        return Some(DedupKey::new("link:canonical"));
    }
    if let Some(id) = tag.attr_str("id") {
        return Some(DedupKey::new(format!("{kind}:id:{id}")));
    }
    match kind {
        "meta" => META_IDENTITY_ATTRS.iter().find_map(|attr| {
            tag.attr_str(attr)
                .map(|value| DedupKey::new(format!("meta:{attr}:{value}")))
        }),
        "link" => {
            let rel = tag.attr_str("rel")?;
            let href = tag.attr_str("href")?;
            let rel = rel
                .split_ascii_whitespace()
                .map(|t| t.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            Some(DedupKey::new(format!("link:{rel}:{href}")))
        }
        "script" => tag
            .attr_str("src")
            .map(|src| DedupKey::new(format!("script:src:{src}"))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_tag;
    use crate::types::TagInput;

    fn key_of(input: TagInput) -> Option<String> {
        let tag = normalize_tag(&input).expect("valid tag");
        dedup_key(&tag).map(|k| k.as_str().to_string())
    }

    #[test]
    fn singletons_share_one_key() {
        assert_eq!(key_of(TagInput::title("a")).as_deref(), Some("title"));
        assert_eq!(
            key_of(TagInput::new("base").attr("href", "/")).as_deref(),
            Some("base")
        );
        assert_eq!(key_of(TagInput::html_attrs()).as_deref(), Some("htmlAttrs"));
    }

    #[test]
    fn meta_keys_use_identifying_attribute() {
        assert_eq!(
            key_of(TagInput::meta_name("description", "x")).as_deref(),
            Some("meta:name:description")
        );
        assert_eq!(
            key_of(TagInput::meta_property("og:title", "x")).as_deref(),
            Some("meta:property:og:title")
        );
        assert_eq!(
            key_of(TagInput::new("meta").attr("charset", "utf-8")).as_deref(),
            Some("meta:charset")
        );
        assert_eq!(key_of(TagInput::new("meta").attr("content", "x")), None);
    }

    #[test]
    fn link_keys() {
        assert_eq!(
            key_of(TagInput::link("canonical", "https://a.test/")).as_deref(),
            Some("link:canonical")
        );
        assert_eq!(
            key_of(TagInput::link("Stylesheet", "/a.css")).as_deref(),
            Some("link:stylesheet:/a.css")
        );
        assert_eq!(key_of(TagInput::new("link").attr("rel", "preconnect")), None);
    }

    #[test]
    fn explicit_key_and_id_take_precedence() {
        assert_eq!(
            key_of(TagInput::meta_name("description", "x").key("desc")).as_deref(),
            Some("meta:key:desc")
        );
        assert_eq!(
            key_of(TagInput::new("style").attr("id", "theme").text("a{}")).as_deref(),
            Some("style:id:theme")
        );
    }

    #[test]
    fn scripts_key_on_src_and_inline_scripts_stay_unkeyed() {
        assert_eq!(
            key_of(TagInput::script_src("/a.js")).as_deref(),
            Some("script:src:/a.js")
        );
        assert_eq!(key_of(TagInput::new("script").inner_html("go()")), None);
    }
}
