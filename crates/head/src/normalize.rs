//! Validation of raw descriptors into [`Tag`] values.
//!
//! A descriptor that fails here is dropped by the resolver with a diagnostic;
//! it never aborts resolution of its siblings.

use crate::types::{Anchor, DIRECTIVE_KINDS, Tag, TagContent, TagInput, VOID_KINDS, Zone};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag kind is empty")]
    EmptyKind,
    #[error("invalid tag kind `{0}`")]
    InvalidKind(String),
    #[error("unknown zone `{0}`")]
    UnknownZone(String),
    #[error("`{kind}` cannot be placed in zone `{zone}`")]
    ZoneMismatch { kind: String, zone: Zone },
    #[error("textContent and innerHTML are mutually exclusive")]
    ConflictingContent,
    #[error("void element `{0}` cannot carry content")]
    VoidWithContent(String),
    #[error("attribute zone `{0}` cannot carry content")]
    ContentOnAttributes(Zone),
    #[error("`before` and `after` are mutually exclusive")]
    ConflictingAnchor,
    #[error("invalid attribute name `{0}`")]
    InvalidAttributeName(String),
}

/// Kinds that may only live in `<head>`.
const HEAD_ONLY: [&str; 5] = ["title", "base", "meta", "titleTemplate", "templateParams"];

pub fn normalize_tag(input: &TagInput) -> Result<Tag, TagError> {
    let kind = canonical_kind(&input.kind)?;
    let zone = resolve_zone(&kind, input.zone.as_deref())?;

    let content = match (&input.text_content, &input.inner_html) {
        (Some(_), Some(_)) => return Err(TagError::ConflictingContent),
        (Some(text), None) => Some(TagContent::Text(text.clone())),
        (None, Some(html)) => Some(TagContent::Html(html.clone())),
        (None, None) => None,
    };
    if content.is_some() {
        if zone.is_attribute_zone() {
            return Err(TagError::ContentOnAttributes(zone));
        }
        if VOID_KINDS.contains(&kind.as_str()) {
            return Err(TagError::VoidWithContent(kind));
        }
    }

    let anchor = match (&input.before, &input.after) {
        (Some(_), Some(_)) => return Err(TagError::ConflictingAnchor),
        (Some(key), None) => Some(Anchor::Before(key.clone())),
        (None, Some(key)) => Some(Anchor::After(key.clone())),
        (None, None) => None,
    };

    // Template params are user-chosen names; everything else is an HTML
    // attribute and gets the canonical lowercase spelling.
    let preserve_case = kind == "templateParams";
    let mut attributes: Vec<(Arc<str>, crate::AttrValue)> =
        Vec::with_capacity(input.attributes.len());
    for (name, value) in &input.attributes {
        if !is_valid_attr_name(name) {
            return Err(TagError::InvalidAttributeName(name.clone()));
        }
        let name: Arc<str> = if preserve_case {
            Arc::from(name.as_str())
        } else {
            Arc::from(name.to_ascii_lowercase())
        };
        if let Some(slot) = attributes.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value.clone();
        } else {
            attributes.push((name, value.clone()));
        }
    }

    Ok(Tag {
        kind: Arc::from(kind),
        attributes,
        content,
        zone,
        key: input.key.clone().filter(|k| !k.is_empty()),
        anchor,
    })
}

fn canonical_kind(raw: &str) -> Result<String, TagError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TagError::EmptyKind);
    }
    let mut bytes = raw.bytes();
    let first_ok = bytes.next().is_some_and(|b| b.is_ascii_alphabetic());
    if !first_ok || !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'-') {
        return Err(TagError::InvalidKind(raw.to_string()));
    }
    for special in ["htmlAttrs", "bodyAttrs"].iter().chain(DIRECTIVE_KINDS.iter()) {
        if raw.eq_ignore_ascii_case(special) {
            return Ok((*special).to_string());
        }
    }
    Ok(raw.to_ascii_lowercase())
}

fn resolve_zone(kind: &str, declared: Option<&str>) -> Result<Zone, TagError> {
    let implied = match kind {
        "htmlAttrs" => Some(Zone::HtmlAttrs),
        "bodyAttrs" => Some(Zone::BodyAttrs),
        _ => None,
    };
    let declared = match declared {
        Some(label) => Some(Zone::parse(label).ok_or_else(|| TagError::UnknownZone(label.to_string()))?),
        None => None,
    };
    let zone = match (implied, declared) {
        (Some(implied), Some(declared)) if implied != declared => {
            return Err(TagError::ZoneMismatch {
                kind: kind.to_string(),
                zone: declared,
            });
        }
        (Some(implied), _) => implied,
        (None, Some(declared)) => declared,
        (None, None) => Zone::Head,
    };
    if implied.is_none() && zone.is_attribute_zone() {
        return Err(TagError::ZoneMismatch {
            kind: kind.to_string(),
            zone,
        });
    }
    if HEAD_ONLY.contains(&kind) && zone != Zone::Head {
        return Err(TagError::ZoneMismatch {
            kind: kind.to_string(),
            zone,
        });
    }
    Ok(zone)
}

fn is_valid_attr_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|ch| {
            !ch.is_whitespace()
                && !ch.is_control()
                && !matches!(ch, '"' | '\'' | '>' | '/' | '=' | '<')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AttrValue;

    #[test]
    fn kinds_are_lowercased_except_special_kinds() {
        let tag = normalize_tag(&TagInput::new("META").attr("Name", "x")).unwrap();
        assert_eq!(&*tag.kind, "meta");
        assert_eq!(&*tag.attributes[0].0, "name");

        let tag = normalize_tag(&TagInput::new("htmlattrs")).unwrap();
        assert_eq!(&*tag.kind, "htmlAttrs");
        assert_eq!(tag.zone, Zone::HtmlAttrs);
    }

    #[test]
    fn unknown_zone_is_rejected() {
        let err = normalize_tag(&TagInput {
            kind: "script".into(),
            zone: Some("footer".into()),
            ..TagInput::default()
        })
        .unwrap_err();
        assert_eq!(err, TagError::UnknownZone("footer".into()));
    }

    #[test]
    fn mutually_exclusive_fields_are_rejected() {
        let both = TagInput::new("script").text("a").inner_html("b");
        assert_eq!(normalize_tag(&both), Err(TagError::ConflictingContent));

        let anchors = TagInput::new("link").before("title").after("title");
        assert_eq!(normalize_tag(&anchors), Err(TagError::ConflictingAnchor));
    }

    #[test]
    fn void_and_attribute_zones_reject_content() {
        let meta = TagInput::new("meta").text("nope");
        assert_eq!(
            normalize_tag(&meta),
            Err(TagError::VoidWithContent("meta".into()))
        );
        let attrs = TagInput::html_attrs().text("nope");
        assert_eq!(
            normalize_tag(&attrs),
            Err(TagError::ContentOnAttributes(Zone::HtmlAttrs))
        );
    }

    #[test]
    fn head_only_kinds_cannot_move_to_body() {
        let title = TagInput::title("x").zone(Zone::BodyClose);
        assert!(matches!(
            normalize_tag(&title),
            Err(TagError::ZoneMismatch { .. })
        ));
        let div = TagInput::new("div").zone(Zone::HtmlAttrs);
        assert!(matches!(
            normalize_tag(&div),
            Err(TagError::ZoneMismatch { .. })
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert_eq!(normalize_tag(&TagInput::new("")), Err(TagError::EmptyKind));
        assert_eq!(
            normalize_tag(&TagInput::new("1x")),
            Err(TagError::InvalidKind("1x".into()))
        );
        assert_eq!(
            normalize_tag(&TagInput::new("meta").attr("bad name", "x")),
            Err(TagError::InvalidAttributeName("bad name".into()))
        );
    }

    #[test]
    fn template_params_keep_name_case() {
        let tag = normalize_tag(&TagInput::template_params().attr("siteName", "Acme")).unwrap();
        assert_eq!(&*tag.attributes[0].0, "siteName");
        assert_eq!(tag.attributes[0].1, AttrValue::Text("Acme".into()));
    }
}
