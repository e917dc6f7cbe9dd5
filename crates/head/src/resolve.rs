//! Merge of all registry entries into one canonical tag list.
//!
//! Contract:
//! - At most one tag survives per dedup key; unkeyed tags always survive.
//! - Winner: lowest priority band, then highest sequence number (the most
//!   recently registered entry), then the later tag inside one entry.
//! - A winner sits where its key first occurred in flattened order, so content
//!   updates never reorder siblings. `before`/`after` anchors then move only
//!   the anchored tag.
//! - Root attribute zones layer every contender's attributes under the
//!   winner's and union `class` tokens.
//! - Malformed descriptors are dropped with a diagnostic; resolution of the
//!   remaining tags always completes.
//! - Output is memoized per registry generation and handed out as a shared
//!   `Arc`, so an unchanged registry yields a pointer-equal list.

use crate::dedup::{DedupKey, dedup_key};
use crate::normalize::{TagError, normalize_tag};
use crate::registry::{Entry, Registry};
use crate::template::apply_templates;
use crate::types::{AttrValue, Tag, Zone};
use core_types::{EntryId, Generation, RenderSide};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity a resolved tag keeps across resolutions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TagIdentity {
    Keyed(DedupKey),
    /// Unkeyed tags are identified by their position in the owning entry.
    Unkeyed { entry: EntryId, index: usize },
}

impl TagIdentity {
    pub fn dedup_key(&self) -> Option<&DedupKey> {
        match self {
            TagIdentity::Keyed(key) => Some(key),
            TagIdentity::Unkeyed { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTag {
    pub tag: Tag,
    pub identity: TagIdentity,
    pub entry: EntryId,
    /// Position of the tag inside its owning entry.
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveIssue {
    #[error(transparent)]
    Malformed(#[from] TagError),
    #[error("anchor target `{0}` is not in the resolved head")]
    DanglingAnchor(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub entry: EntryId,
    pub index: usize,
    pub kind: String,
    pub issue: ResolveIssue,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tag #{} <{}>: {}",
            self.entry, self.index, self.kind, self.issue
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTags {
    pub generation: Generation,
    pub side: RenderSide,
    pub tags: Vec<ResolvedTag>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolvedTags {
    pub fn empty(side: RenderSide) -> Self {
        Self {
            generation: Generation::INITIAL,
            side,
            tags: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedTag> {
        self.tags.iter()
    }

    pub fn in_zone(&self, zone: Zone) -> impl Iterator<Item = &ResolvedTag> {
        self.tags.iter().filter(move |t| t.tag.zone == zone)
    }

    pub fn find(&self, key: &str) -> Option<&ResolvedTag> {
        self.tags.iter().find(|t| {
            t.identity
                .dedup_key()
                .is_some_and(|k| k.as_str() == key)
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.find("title").and_then(|t| t.tag.text())
    }
}

/// Memoizing front of [`resolve_entries`].
#[derive(Debug, Default)]
pub struct Resolver {
    cache: Option<Arc<ResolvedTags>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, registry: &Registry) -> Arc<ResolvedTags> {
        if let Some(cached) = &self.cache
            && cached.generation == registry.generation()
        {
            log::trace!(target: "head.resolve", "cache hit at {:?}", cached.generation);
            return Arc::clone(cached);
        }
        let resolved = Arc::new(resolve_entries(
            &registry.snapshot(),
            registry.side(),
            registry.generation(),
        ));
        log::debug!(
            target: "head.resolve",
            "resolved {} tags at {:?} ({} diagnostics)",
            resolved.tags.len(),
            resolved.generation,
            resolved.diagnostics.len()
        );
        self.cache = Some(Arc::clone(&resolved));
        resolved
    }

    pub fn cached(&self) -> Option<&Arc<ResolvedTags>> {
        self.cache.as_ref()
    }
}

struct Candidate {
    tag: Tag,
    key: Option<DedupKey>,
    entry: EntryId,
    index: usize,
    band: i32,
    seq: u64,
}

impl Candidate {
    /// Ascending precedence; the maximum wins its key.
    fn rank(&self) -> (std::cmp::Reverse<i32>, u64, usize) {
        (std::cmp::Reverse(self.band), self.seq, self.index)
    }
}

enum Slot {
    Unkeyed(usize),
    Keyed(DedupKey),
}

struct Group {
    winner: usize,
    members: Vec<usize>,
}

/// Pure merge of an ordered snapshot. `snapshot` must already be sorted by
/// (band, sequence), as [`Registry::snapshot`] returns it.
pub fn resolve_entries(
    snapshot: &[&Entry],
    side: RenderSide,
    generation: Generation,
) -> ResolvedTags {
    let mut diagnostics = Vec::new();
    let candidates = flatten(snapshot, side, &mut diagnostics);

    let mut slots = Vec::with_capacity(candidates.len());
    let mut groups: HashMap<DedupKey, Group> = HashMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(key) = &candidate.key else {
            slots.push(Slot::Unkeyed(i));
            continue;
        };
        match groups.get_mut(key) {
            Some(group) => {
                group.members.push(i);
                if candidate.rank() > candidates[group.winner].rank() {
                    group.winner = i;
                }
            }
            None => {
                slots.push(Slot::Keyed(key.clone()));
                groups.insert(
                    key.clone(),
                    Group {
                        winner: i,
                        members: vec![i],
                    },
                );
            }
        }
    }

    let mut tags = Vec::with_capacity(slots.len());
    for slot in slots {
        let resolved = match slot {
            Slot::Unkeyed(i) => {
                let c = &candidates[i];
                ResolvedTag {
                    tag: c.tag.clone(),
                    identity: TagIdentity::Unkeyed {
                        entry: c.entry,
                        index: c.index,
                    },
                    entry: c.entry,
                    index: c.index,
                }
            }
            Slot::Keyed(key) => {
                let Some(group) = groups.get(&key) else {
                    continue;
                };
                let winner = &candidates[group.winner];
                let mut tag = winner.tag.clone();
                if tag.zone.is_attribute_zone() && group.members.len() > 1 {
                    tag.attributes = layer_attributes(&candidates, &group.members);
                }
                ResolvedTag {
                    tag,
                    identity: TagIdentity::Keyed(key),
                    entry: winner.entry,
                    index: winner.index,
                }
            }
        };
        tags.push(resolved);
    }

    apply_templates(&mut tags);
    apply_anchors(&mut tags, &mut diagnostics);

    ResolvedTags {
        generation,
        side,
        tags,
        diagnostics,
    }
}

fn flatten(snapshot: &[&Entry], side: RenderSide, diagnostics: &mut Vec<Diagnostic>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for entry in snapshot {
        if !entry.options().mode.visible_on(side) {
            continue;
        }
        for (index, input) in entry.tags().iter().enumerate() {
            match normalize_tag(input) {
                Ok(tag) => {
                    let key = dedup_key(&tag);
                    out.push(Candidate {
                        tag,
                        key,
                        entry: entry.id(),
                        index,
                        band: entry.band(),
                        seq: entry.created_at(),
                    });
                }
                Err(err) => {
                    log::warn!(
                        target: "head.resolve",
                        "dropping malformed <{}> from {}: {err}",
                        input.kind,
                        entry.id()
                    );
                    diagnostics.push(Diagnostic {
                        entry: entry.id(),
                        index,
                        kind: input.kind.clone(),
                        issue: ResolveIssue::Malformed(err),
                    });
                }
            }
        }
    }
    out
}

/// Overlays contenders lowest precedence first, so the winner's values land
/// last. `class` tokens accumulate instead of replacing each other.
fn layer_attributes(candidates: &[Candidate], members: &[usize]) -> Vec<(Arc<str>, AttrValue)> {
    let mut ordered: Vec<&Candidate> = members.iter().map(|&i| &candidates[i]).collect();
    ordered.sort_by_key(|c| c.rank());

    let mut out: Vec<(Arc<str>, AttrValue)> = Vec::new();
    for candidate in ordered {
        for (name, value) in &candidate.tag.attributes {
            let existing = out.iter_mut().find(|(k, _)| k == name);
            match existing {
                Some(slot) if &**name == "class" => {
                    slot.1 = merge_class(&slot.1, value);
                }
                Some(slot) => slot.1 = value.clone(),
                None => out.push((Arc::clone(name), value.clone())),
            }
        }
    }
    out
}

fn merge_class(base: &AttrValue, top: &AttrValue) -> AttrValue {
    let (Some(base), Some(top)) = (base.as_identity(), top.as_identity()) else {
        return top.clone();
    };
    let mut tokens: Vec<&str> = Vec::new();
    for token in base.split_ascii_whitespace().chain(top.split_ascii_whitespace()) {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    AttrValue::Text(tokens.join(" "))
}

fn apply_anchors(tags: &mut Vec<ResolvedTag>, diagnostics: &mut Vec<Diagnostic>) {
    let anchored: Vec<TagIdentity> = tags
        .iter()
        .filter(|t| t.tag.anchor.is_some())
        .map(|t| t.identity.clone())
        .collect();

    for identity in anchored {
        let Some(from) = tags.iter().position(|t| t.identity == identity) else {
            continue;
        };
        let Some(anchor) = tags[from].tag.anchor.clone() else {
            continue;
        };
        let target = tags.iter().position(|t| {
            t.identity
                .dedup_key()
                .is_some_and(|k| k.as_str() == anchor.target())
        });
        let Some(target) = target.filter(|&t| t != from) else {
            let moved = &tags[from];
            diagnostics.push(Diagnostic {
                entry: moved.entry,
                index: moved.index,
                kind: moved.tag.kind.to_string(),
                issue: ResolveIssue::DanglingAnchor(anchor.target().to_string()),
            });
            continue;
        };
        let tag = tags.remove(from);
        let target = if from < target { target - 1 } else { target };
        let at = match anchor {
            crate::types::Anchor::Before(_) => target,
            crate::types::Anchor::After(_) => target + 1,
        };
        tags.insert(at, tag);
    }
}
