//! Title template and template params post-pass.
//!
//! `titleTemplate` wraps the winning title (`%s` is the title text) and
//! `templateParams` supplies `%name` substitutions for the title and every
//! `meta[content]`. Both directives are consumed here and never rendered.

use crate::resolve::ResolvedTag;
use crate::types::{AttrValue, TagContent};
use std::collections::HashMap;

const DEFAULT_SEPARATOR: &str = "|";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateParams {
    values: HashMap<String, String>,
}

impl TemplateParams {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(v) => Some(v),
            None if name == "separator" => Some(DEFAULT_SEPARATOR),
            None => None,
        }
    }

    /// Replaces every `%name` with its value. The longest declared name wins;
    /// unknown names stay verbatim.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let ident_len = after
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'.')
                .count();
            let replaced = (1..=ident_len)
                .rev()
                .find_map(|len| self.get(&after[..len]).map(|value| (len, value)));
            match replaced {
                Some((len, value)) => {
                    out.push_str(value);
                    rest = &after[len..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

pub(crate) fn apply_templates(tags: &mut Vec<ResolvedTag>) {
    let mut title_template = None;
    let mut params = None;
    tags.retain(|t| match &*t.tag.kind {
        "titleTemplate" => {
            title_template = t.tag.text().map(str::to_string);
            false
        }
        "templateParams" => {
            let mut collected = TemplateParams::default();
            for (name, value) in &t.tag.attributes {
                if let Some(value) = value.as_identity() {
                    collected.insert(name.to_string(), value.into_owned());
                }
            }
            params = Some(collected);
            false
        }
        _ => true,
    });

    if title_template.is_none() && params.is_none() {
        return;
    }
    let params = params.unwrap_or_default();

    for resolved in tags.iter_mut() {
        let tag = &mut resolved.tag;
        match &*tag.kind {
            "title" => {
                let Some(TagContent::Text(title)) = &tag.content else {
                    continue;
                };
                let wrapped = match &title_template {
                    Some(template) => fill_title_slot(template, title),
                    None => title.clone(),
                };
                let rendered = params.substitute(&wrapped).trim().to_string();
                tag.content = Some(TagContent::Text(rendered));
            }
            "meta" => {
                let Some(AttrValue::Text(content)) = tag.attr("content") else {
                    continue;
                };
                let rendered = params.substitute(content);
                tag.set_attr("content", AttrValue::Text(rendered));
            }
            _ => {}
        }
    }
}

/// Replaces every standalone `%s`; `%separator` and friends are left for
/// [`TemplateParams::substitute`].
fn fill_title_slot(template: &str, title: &str) -> String {
    let mut out = String::with_capacity(template.len() + title.len());
    let mut rest = template;
    while let Some(pos) = rest.find("%s") {
        let after = &rest[pos + 2..];
        let standalone = !after
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');
        out.push_str(&rest[..pos]);
        if standalone {
            out.push_str(title);
        } else {
            out.push_str("%s");
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> TemplateParams {
        let mut p = TemplateParams::default();
        for (k, v) in pairs {
            p.insert(*k, *v);
        }
        p
    }

    #[test]
    fn substitutes_known_params_and_keeps_unknown() {
        let p = params(&[("siteName", "Acme")]);
        assert_eq!(
            p.substitute("Home %separator %siteName %missing 100%"),
            "Home | Acme %missing 100%"
        );
    }

    #[test]
    fn longest_declared_name_wins() {
        let p = params(&[("site", "short"), ("siteName", "long")]);
        assert_eq!(p.substitute("%siteName/%site"), "long/short");
    }

    #[test]
    fn title_slot_ignores_longer_params() {
        assert_eq!(
            fill_title_slot("%s %separator %site", "Home"),
            "Home %separator %site"
        );
        assert_eq!(fill_title_slot("%s - %s", "x"), "x - x");
    }

    #[test]
    fn explicit_separator_overrides_default() {
        let p = params(&[("separator", "·")]);
        assert_eq!(p.substitute("a %separator b"), "a · b");
    }
}
