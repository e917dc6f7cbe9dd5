use indexmap::IndexMap;
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;

/// Structural region of the document a tag belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Zone {
    Head,
    BodyOpen,
    BodyClose,
    HtmlAttrs,
    BodyAttrs,
}

impl Zone {
    pub const ELEMENT_ZONES: [Zone; 3] = [Zone::Head, Zone::BodyOpen, Zone::BodyClose];

    /// Accepts the camelCase labels as well as their kebab-case spelling.
    pub fn parse(label: &str) -> Option<Zone> {
        match label {
            "head" => Some(Zone::Head),
            "bodyOpen" | "body-open" => Some(Zone::BodyOpen),
            "bodyClose" | "body-close" => Some(Zone::BodyClose),
            "htmlAttrs" | "html-attrs" => Some(Zone::HtmlAttrs),
            "bodyAttrs" | "body-attrs" => Some(Zone::BodyAttrs),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Zone::Head => "head",
            Zone::BodyOpen => "bodyOpen",
            Zone::BodyClose => "bodyClose",
            Zone::HtmlAttrs => "htmlAttrs",
            Zone::BodyAttrs => "bodyAttrs",
        }
    }

    /// Root attribute zones serialize to attribute strings, never elements.
    pub const fn is_attribute_zone(self) -> bool {
        matches!(self, Zone::HtmlAttrs | Zone::BodyAttrs)
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Attribute value as declared by a caller.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

/// How an attribute value materializes in markup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrRender<'a> {
    Omit,
    Bare,
    Value(Cow<'a, str>),
}

impl AttrValue {
    pub fn render(&self) -> AttrRender<'_> {
        match self {
            AttrValue::Flag(false) => AttrRender::Omit,
            AttrValue::Flag(true) => AttrRender::Bare,
            AttrValue::Number(n) => AttrRender::Value(Cow::Owned(format_number(*n))),
            AttrValue::Text(s) => AttrRender::Value(Cow::Borrowed(s)),
        }
    }

    /// String form used for identity derivation; flags have none.
    pub fn as_identity(&self) -> Option<Cow<'_, str>> {
        match self.render() {
            AttrRender::Value(v) => Some(v),
            AttrRender::Omit | AttrRender::Bare => None,
        }
    }

    /// Live-DOM representation: `None` for a bare attribute, omitted entirely
    /// for a false flag.
    pub fn to_dom(&self) -> Option<Option<String>> {
        match self.render() {
            AttrRender::Omit => None,
            AttrRender::Bare => Some(None),
            AttrRender::Value(v) => Some(Some(v.into_owned())),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Flag(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Number(f64::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

/// Raw tag descriptor as submitted by a caller.
///
/// Nothing is validated here; the resolver normalizes descriptors into [`Tag`]
/// values and drops malformed ones with a diagnostic.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TagInput {
    pub kind: String,
    #[serde(alias = "attrs")]
    pub attributes: IndexMap<String, AttrValue>,
    #[serde(alias = "text")]
    pub text_content: Option<String>,
    #[serde(alias = "innerHTML", alias = "html")]
    pub inner_html: Option<String>,
    pub zone: Option<String>,
    pub key: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl TagInput {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn title(text: impl Into<String>) -> Self {
        Self::new("title").text(text)
    }

    pub fn title_template(template: impl Into<String>) -> Self {
        Self::new("titleTemplate").text(template)
    }

    pub fn template_params() -> Self {
        Self::new("templateParams")
    }

    pub fn meta_name(name: &str, content: impl Into<String>) -> Self {
        Self::new("meta")
            .attr("name", name)
            .attr("content", content.into())
    }

    pub fn meta_property(property: &str, content: impl Into<String>) -> Self {
        Self::new("meta")
            .attr("property", property)
            .attr("content", content.into())
    }

    pub fn link(rel: &str, href: impl Into<String>) -> Self {
        Self::new("link").attr("rel", rel).attr("href", href.into())
    }

    pub fn script_src(src: impl Into<String>) -> Self {
        Self::new("script").attr("src", src.into())
    }

    pub fn style(css: impl Into<String>) -> Self {
        Self::new("style").text(css)
    }

    pub fn html_attrs() -> Self {
        Self::new("htmlAttrs")
    }

    pub fn body_attrs() -> Self {
        Self::new("bodyAttrs")
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    pub fn inner_html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = Some(html.into());
        self
    }

    pub fn zone(mut self, zone: Zone) -> Self {
        self.zone = Some(zone.label().to_string());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn before(mut self, dedup_key: impl Into<String>) -> Self {
        self.before = Some(dedup_key.into());
        self
    }

    pub fn after(mut self, dedup_key: impl Into<String>) -> Self {
        self.after = Some(dedup_key.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagContent {
    /// Escaped on output.
    Text(String),
    /// Inserted verbatim; the caller is responsible for sanitizing it.
    Html(String),
}

impl TagContent {
    pub fn as_str(&self) -> &str {
        match self {
            TagContent::Text(s) | TagContent::Html(s) => s,
        }
    }
}

/// Explicit placement relative to another tag's dedup key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Anchor {
    Before(String),
    After(String),
}

impl Anchor {
    pub fn target(&self) -> &str {
        match self {
            Anchor::Before(k) | Anchor::After(k) => k,
        }
    }
}

/// Validated head tag.
#[derive(Clone, Debug, PartialEq)]
pub struct Tag {
    pub kind: Arc<str>,
    pub attributes: Vec<(Arc<str>, AttrValue)>,
    pub content: Option<TagContent>,
    pub zone: Zone,
    pub key: Option<String>,
    pub anchor: Option<Anchor>,
}

pub(crate) const VOID_KINDS: [&str; 3] = ["meta", "link", "base"];

/// Kinds that configure resolution and never render themselves.
pub(crate) const DIRECTIVE_KINDS: [&str; 2] = ["titleTemplate", "templateParams"];

impl Tag {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn attr_str(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attr(name).and_then(AttrValue::as_identity)
    }

    /// Whitespace-separated token match, ASCII case-insensitive.
    pub fn attr_has_token(&self, name: &str, token: &str) -> bool {
        self.attr_str(name).is_some_and(|v| {
            v.split_ascii_whitespace()
                .any(|t| t.eq_ignore_ascii_case(token))
        })
    }

    pub fn set_attr(&mut self, name: &str, value: AttrValue) {
        if let Some(slot) = self
            .attributes
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
        } else {
            self.attributes.push((Arc::from(name), value));
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(TagContent::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        VOID_KINDS.contains(&&*self.kind)
    }

    pub fn is_directive(&self) -> bool {
        DIRECTIVE_KINDS.contains(&&*self.kind)
    }

    /// Attributes as they appear on a live element (false flags dropped).
    pub fn dom_attributes(&self) -> Vec<(Arc<str>, Option<String>)> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| v.to_dom().map(|dom| (Arc::clone(k), dom)))
            .collect()
    }
}
