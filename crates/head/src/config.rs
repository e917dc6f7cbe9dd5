//! Declarative head files: `[options]` plus `[[entry]]` tables, each with a
//! list of `[[entry.tag]]` descriptors.

use crate::context::{Head, HeadOptions};
use crate::registry::{EntryOptions, Mode, Priority};
use crate::types::TagInput;
use core_types::EntryId;
use serde::Deserialize;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub priority: Priority,
    pub mode: Mode,
    #[serde(rename = "tag")]
    pub tags: Vec<TagInput>,
}

impl EntryConfig {
    pub fn options(&self) -> EntryOptions {
        EntryOptions::default()
            .priority(self.priority)
            .mode(self.mode)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeadManifest {
    pub options: HeadOptions,
    #[serde(rename = "entry")]
    pub entries: Vec<EntryConfig>,
}

impl HeadManifest {
    /// Builds a fresh head for this manifest and pushes every entry in
    /// declaration order.
    pub fn into_head(self) -> (Head, Vec<EntryId>) {
        let head = Head::new(self.options);
        let ids = load_into(&head, &self.entries);
        (head, ids)
    }
}

pub fn load_into(head: &Head, entries: &[EntryConfig]) -> Vec<EntryId> {
    entries
        .iter()
        .map(|entry| head.push(entry.tags.clone(), entry.options()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttrValue;
    use core_types::RenderSide;

    const MANIFEST: &str = r#"
[options]
side = "server"

[options.ssr]
omit_line_breaks = true

[[entry]]
priority = "low"

[[entry.tag]]
kind = "title"
text = "Fallback"

[[entry]]
priority = 10
mode = "server"

[[entry.tag]]
kind = "title"
text = "Hello"

[[entry.tag]]
kind = "meta"
attrs = { name = "description", content = "Greeting page" }

[[entry.tag]]
kind = "script"
zone = "bodyClose"
attributes = { src = "/app.js", defer = true }
"#;

    #[test]
    fn manifest_parses_and_loads_in_order() {
        let manifest: HeadManifest = toml::from_str(MANIFEST).expect("valid manifest");
        assert_eq!(manifest.options.side, RenderSide::Server);
        assert!(manifest.options.ssr.omit_line_breaks);
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].priority, Priority::Low);
        assert_eq!(manifest.entries[1].priority, Priority::Value(10));
        assert_eq!(manifest.entries[1].mode, Mode::Server);
        assert_eq!(
            manifest.entries[1].tags[2].attributes.get("defer"),
            Some(&AttrValue::Flag(true))
        );

        let (head, ids) = manifest.into_head();
        assert_eq!(ids.len(), 2);
        assert_eq!(head.resolve().title(), Some("Hello"));
    }

    #[test]
    fn empty_manifest_defaults_to_client() {
        let manifest: HeadManifest = toml::from_str("").expect("empty manifest");
        assert_eq!(manifest.options.side, RenderSide::Client);
        assert!(manifest.entries.is_empty());
    }
}
