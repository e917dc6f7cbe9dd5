//! Incremental reconciliation of a resolved tag list into a live document.
//!
//! Contract:
//! - The reconciler only ever touches elements it created or adopted. Those
//!   carry the `data-head` marker; everything else in the document is left
//!   alone.
//! - Elements are matched across passes by `TagIdentity`. Unchanged elements
//!   receive no writes; attribute and content changes are patched in place.
//! - A `script` whose `src` or body changed is replaced so the new version
//!   executes; a change of kind or zone always replaces.
//! - Patch batches are ordered as: removals, in-place updates, creates and
//!   moves per zone, root attributes.
//! - Root attributes overwritten on `<html>`/`<body>` are restored to their
//!   pre-existing value once no entry declares them.
//! - Ownership state is committed only after the document accepted the batch.
//!   A rejected batch rebuilds ownership from the markers in the document.
//! - Owned elements that left the document are recreated, never patched.

use crate::dom_patch::{DomAttribute, DomPatch, DomPatchError, PatchKey};
use crate::resolve::{ResolvedTag, ResolvedTags, TagIdentity};
use crate::types::{TagContent, Zone};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Attribute stamped on every element the reconciler owns. The value is the
/// dedup key, or empty for unkeyed tags.
pub const OWNED_MARKER: &str = "data-head";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentRoot {
    Html,
    Head,
    Body,
}

impl std::fmt::Display for DocumentRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DocumentRoot::Html => "html",
            DocumentRoot::Head => "head",
            DocumentRoot::Body => "body",
        })
    }
}

/// Read-only view of one live element.
#[derive(Clone, Copy, Debug)]
pub struct ElementView<'a> {
    pub name: &'a str,
    pub attributes: &'a [DomAttribute],
    pub content: Option<&'a TagContent>,
}

impl ElementView<'_> {
    /// `Some(None)` for a bare attribute, `None` when absent.
    pub fn attr(&self, name: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }
}

/// The slice of a live document the reconciler needs.
pub trait LiveDocument {
    fn root(&self, root: DocumentRoot) -> Option<PatchKey>;
    fn children(&self, parent: PatchKey) -> Vec<PatchKey>;
    fn element(&self, key: PatchKey) -> Option<ElementView<'_>>;
    /// Returns a key that has never been used in this document.
    fn allocate_key(&mut self) -> PatchKey;
    fn apply(&mut self, patches: &[DomPatch]) -> Result<(), DomPatchError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("live document has no <{0}> element")]
    MissingRoot(DocumentRoot),
    #[error(transparent)]
    Patch(#[from] DomPatchError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub removed: usize,
    pub moved: usize,
    pub adopted: usize,
    pub untouched: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub patches: Vec<DomPatch>,
    pub stats: ReconcileStats,
    /// The list was pointer-equal to the last applied one.
    pub skipped: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct OwnedElement {
    key: PatchKey,
    zone: Zone,
    kind: Arc<str>,
    attributes: Vec<DomAttribute>,
    content: Option<TagContent>,
}

#[derive(Clone, Debug, Default)]
struct RootState {
    applied: Vec<DomAttribute>,
    /// Pre-existing value of every attribute we overwrote; `None` if absent.
    saved: HashMap<Arc<str>, Option<Option<String>>>,
}

#[derive(Clone, Debug, Default)]
struct Ownership {
    elements: HashMap<TagIdentity, OwnedElement>,
    html: RootState,
    body: RootState,
}

#[derive(Clone, Debug)]
struct AdoptCandidate {
    key: PatchKey,
    parent: DocumentRoot,
    marker: String,
    kind: Arc<str>,
    attributes: Vec<DomAttribute>,
    content: Option<TagContent>,
}

#[derive(Debug, Default)]
pub struct DomReconciler {
    state: Ownership,
    pending: Vec<AdoptCandidate>,
    last: Option<Arc<ResolvedTags>>,
}

struct Desired<'a> {
    identity: &'a TagIdentity,
    zone: Zone,
    kind: &'a Arc<str>,
    attributes: Vec<DomAttribute>,
    content: Option<&'a TagContent>,
}

impl<'a> Desired<'a> {
    fn from_resolved(resolved: &'a ResolvedTag) -> Self {
        let mut attributes = resolved.tag.dom_attributes();
        attributes.retain(|(name, _)| &**name != OWNED_MARKER);
        attributes.push((Arc::from(OWNED_MARKER), Some(marker_value(&resolved.identity))));
        Desired {
            identity: &resolved.identity,
            zone: resolved.tag.zone,
            kind: &resolved.tag.kind,
            attributes,
            content: resolved.tag.content.as_ref(),
        }
    }

    fn parent(&self) -> DocumentRoot {
        if self.zone == Zone::Head {
            DocumentRoot::Head
        } else {
            DocumentRoot::Body
        }
    }
}

fn marker_value(identity: &TagIdentity) -> String {
    identity
        .dedup_key()
        .map(|k| k.as_str().to_string())
        .unwrap_or_default()
}

struct Roots {
    html: PatchKey,
    head: PatchKey,
    body: PatchKey,
}

impl Roots {
    fn locate<D: LiveDocument>(doc: &D) -> Result<Self, ReconcileError> {
        let find = |root| doc.root(root).ok_or(ReconcileError::MissingRoot(root));
        Ok(Roots {
            html: find(DocumentRoot::Html)?,
            head: find(DocumentRoot::Head)?,
            body: find(DocumentRoot::Body)?,
        })
    }
}

impl DomReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements currently owned.
    pub fn owned_len(&self) -> usize {
        self.state.elements.len()
    }

    pub fn owned_key(&self, identity: &TagIdentity) -> Option<PatchKey> {
        self.state.elements.get(identity).map(|e| e.key)
    }

    /// Collects marked elements rendered by a server pass so the next
    /// reconcile claims them instead of creating duplicates. Marked elements
    /// that nothing claims are removed by that reconcile.
    pub fn adopt<D: LiveDocument>(&mut self, doc: &D) -> usize {
        self.pending.clear();
        self.last = None;
        let owned: HashSet<PatchKey> = self.state.elements.values().map(|e| e.key).collect();
        for root in [DocumentRoot::Head, DocumentRoot::Body] {
            let Some(parent) = doc.root(root) else {
                continue;
            };
            for key in doc.children(parent) {
                if owned.contains(&key) {
                    continue;
                }
                let Some(element) = doc.element(key) else {
                    continue;
                };
                let Some(marker) = element.attr(OWNED_MARKER) else {
                    continue;
                };
                self.pending.push(AdoptCandidate {
                    key,
                    parent: root,
                    marker: marker.unwrap_or_default().to_string(),
                    kind: Arc::from(element.name),
                    attributes: element.attributes.to_vec(),
                    content: element.content.cloned(),
                });
            }
        }
        log::debug!(
            target: "head.reconcile",
            "found {} marked elements to adopt",
            self.pending.len()
        );
        self.pending.len()
    }

    pub fn reconcile<D: LiveDocument>(
        &mut self,
        resolved: &Arc<ResolvedTags>,
        doc: &mut D,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if let Some(last) = &self.last
            && Arc::ptr_eq(last, resolved)
        {
            log::trace!(target: "head.reconcile", "skip: resolved list unchanged");
            return Ok(ReconcileOutcome {
                skipped: true,
                ..ReconcileOutcome::default()
            });
        }

        let roots = Roots::locate(doc)?;
        let mut state = self.state.clone();
        prune_detached(&mut state, &roots, doc);
        let mut patches = Vec::new();
        let mut stats = ReconcileStats::default();

        let desired: Vec<Desired<'_>> = resolved
            .iter()
            .filter(|t| !t.tag.zone.is_attribute_zone())
            .map(Desired::from_resolved)
            .collect();

        let mut removed: HashSet<PatchKey> = HashSet::new();
        let leftovers = claim_adopted(&mut state, &desired, self.pending.clone(), &mut stats);
        for candidate in leftovers {
            patches.push(DomPatch::RemoveNode { key: candidate.key });
            removed.insert(candidate.key);
            stats.removed += 1;
        }

        // Removals and replacements.
        let by_identity: HashMap<&TagIdentity, &Desired<'_>> =
            desired.iter().map(|d| (d.identity, d)).collect();
        let mut replaced: HashSet<TagIdentity> = HashSet::new();
        let mut dropped: Vec<(TagIdentity, PatchKey)> = Vec::new();
        for (identity, owned) in &state.elements {
            match by_identity.get(identity) {
                None => dropped.push((identity.clone(), owned.key)),
                Some(d) if needs_replacement(owned, d) => {
                    replaced.insert(identity.clone());
                    dropped.push((identity.clone(), owned.key));
                }
                Some(_) => {}
            }
        }
        dropped.sort_by_key(|(_, key)| *key);
        for (identity, key) in dropped {
            state.elements.remove(&identity);
            patches.push(DomPatch::RemoveNode { key });
            removed.insert(key);
            if !replaced.contains(&identity) {
                stats.removed += 1;
            }
        }

        // In-place updates.
        for d in &desired {
            let Some(owned) = state.elements.get_mut(d.identity) else {
                continue;
            };
            let mut touched = false;
            if owned.attributes != d.attributes {
                patches.push(DomPatch::SetAttributes {
                    key: owned.key,
                    attributes: d.attributes.clone(),
                });
                owned.attributes = d.attributes.clone();
                touched = true;
            }
            if owned.content.as_ref() != d.content {
                patches.push(DomPatch::SetContent {
                    key: owned.key,
                    content: d.content.cloned(),
                });
                owned.content = d.content.cloned();
                touched = true;
            }
            if touched {
                stats.updated += 1;
            } else {
                stats.untouched += 1;
            }
        }

        // Creates and moves. Body-close goes before body-open so a fresh
        // body-open run can anchor on the first body-close element.
        let mut head_children: Vec<PatchKey> = doc
            .children(roots.head)
            .into_iter()
            .filter(|k| !removed.contains(k))
            .collect();
        let mut body_children: Vec<PatchKey> = doc
            .children(roots.body)
            .into_iter()
            .filter(|k| !removed.contains(k))
            .collect();
        for zone in [Zone::Head, Zone::BodyClose, Zone::BodyOpen] {
            let (parent, siblings) = match zone {
                Zone::Head => (roots.head, &mut head_children),
                _ => (roots.body, &mut body_children),
            };
            let placement = ZonePlacement {
                zone,
                parent,
                replaced: &replaced,
            };
            placement.place(&desired, &mut state, siblings, &mut *doc, &mut patches, &mut stats);
        }

        sync_root(
            DocumentRoot::Html,
            roots.html,
            resolved,
            &mut state.html,
            doc,
            &mut patches,
        )?;
        sync_root(
            DocumentRoot::Body,
            roots.body,
            resolved,
            &mut state.body,
            doc,
            &mut patches,
        )?;

        if let Err(err) = doc.apply(&patches) {
            log::warn!(
                target: "head.reconcile",
                "patch batch rejected ({err}); resyncing from document markers"
            );
            self.resync(doc);
            return Err(err.into());
        }

        log::debug!(
            target: "head.reconcile",
            "applied {} patches: {:?}",
            patches.len(),
            stats
        );
        self.state = state;
        self.pending.clear();
        self.last = Some(Arc::clone(resolved));
        Ok(ReconcileOutcome {
            patches,
            stats,
            skipped: false,
        })
    }
}

impl DomReconciler {
    /// Rebuilds element ownership from the marked elements actually present.
    /// A rejected batch may have been applied in part, so the next pass
    /// claims what exists and removes duplicates instead of trusting state.
    fn resync<D: LiveDocument>(&mut self, doc: &D) {
        self.state.elements.clear();
        self.adopt(doc);
    }
}

/// Forgets owned elements that are no longer children of their root so they
/// are recreated rather than patched.
fn prune_detached<D: LiveDocument>(state: &mut Ownership, roots: &Roots, doc: &D) {
    let head: HashSet<PatchKey> = doc.children(roots.head).into_iter().collect();
    let body: HashSet<PatchKey> = doc.children(roots.body).into_iter().collect();
    state.elements.retain(|identity, owned| {
        let siblings = if owned.zone == Zone::Head { &head } else { &body };
        let live = siblings.contains(&owned.key)
            && doc.element(owned.key).is_some_and(|e| e.name == &*owned.kind);
        if !live {
            log::debug!(
                target: "head.reconcile",
                "{} ({identity:?}) left the document; recreating",
                owned.key
            );
        }
        live
    });
}

fn claim_adopted(
    state: &mut Ownership,
    desired: &[Desired<'_>],
    mut pending: Vec<AdoptCandidate>,
    stats: &mut ReconcileStats,
) -> Vec<AdoptCandidate> {
    if pending.is_empty() {
        return pending;
    }
    for d in desired {
        if state.elements.contains_key(d.identity) {
            continue;
        }
        let parent = d.parent();
        let found = pending.iter().position(|c| {
            c.parent == parent
                && match d.identity.dedup_key() {
                    Some(key) => c.marker == key.as_str(),
                    None => {
                        c.marker.is_empty()
                            && c.kind == *d.kind
                            && c.attributes == d.attributes
                            && c.content.as_ref() == d.content
                    }
                }
        });
        let Some(index) = found else {
            continue;
        };
        let candidate = pending.remove(index);
        state.elements.insert(
            d.identity.clone(),
            OwnedElement {
                key: candidate.key,
                zone: d.zone,
                kind: candidate.kind,
                attributes: candidate.attributes,
                content: candidate.content,
            },
        );
        stats.adopted += 1;
    }
    pending
}

fn needs_replacement(owned: &OwnedElement, desired: &Desired<'_>) -> bool {
    if owned.kind != *desired.kind || owned.zone != desired.zone {
        return true;
    }
    &*owned.kind == "script"
        && (attr_of(&owned.attributes, "src") != attr_of(&desired.attributes, "src")
            || owned.content.as_ref() != desired.content)
}

fn attr_of<'a>(attributes: &'a [DomAttribute], name: &str) -> Option<&'a Option<String>> {
    attributes
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

struct ZonePlacement<'r> {
    zone: Zone,
    parent: PatchKey,
    replaced: &'r HashSet<TagIdentity>,
}

impl ZonePlacement<'_> {
    /// Walks the zone's tags back to front so each element only has to sit
    /// directly before the one placed after it. Siblings the zone does not
    /// own are ignored when checking positions.
    fn place<D: LiveDocument>(
        &self,
        desired: &[Desired<'_>],
        state: &mut Ownership,
        siblings: &mut Vec<PatchKey>,
        doc: &mut D,
        patches: &mut Vec<DomPatch>,
        stats: &mut ReconcileStats,
    ) {
        let mut zone_keys: HashSet<PatchKey> = state
            .elements
            .values()
            .filter(|e| e.zone == self.zone)
            .map(|e| e.key)
            .collect();
        let tail = match self.zone {
            Zone::BodyOpen => siblings.iter().copied().find(|k| !zone_keys.contains(k)),
            _ => None,
        };

        let mut next = tail;
        for d in desired.iter().rev().filter(|d| d.zone == self.zone) {
            let key = match state.elements.get(d.identity) {
                Some(owned) => {
                    let key = owned.key;
                    if following(siblings, key, &zone_keys, tail) != next {
                        patches.push(DomPatch::MoveNode {
                            parent: self.parent,
                            child: key,
                            before: next,
                        });
                        siblings.retain(|k| *k != key);
                        insert_before(siblings, key, next);
                        stats.moved += 1;
                    }
                    key
                }
                None => {
                    let key = doc.allocate_key();
                    patches.push(DomPatch::CreateElement {
                        key,
                        name: Arc::clone(d.kind),
                        attributes: d.attributes.clone(),
                        content: d.content.cloned(),
                    });
                    patches.push(match next {
                        Some(before) => DomPatch::InsertBefore {
                            parent: self.parent,
                            child: key,
                            before,
                        },
                        None => DomPatch::AppendChild {
                            parent: self.parent,
                            child: key,
                        },
                    });
                    insert_before(siblings, key, next);
                    zone_keys.insert(key);
                    state.elements.insert(
                        d.identity.clone(),
                        OwnedElement {
                            key,
                            zone: d.zone,
                            kind: Arc::clone(d.kind),
                            attributes: d.attributes.clone(),
                            content: d.content.cloned(),
                        },
                    );
                    if self.replaced.contains(d.identity) {
                        stats.replaced += 1;
                    } else {
                        stats.created += 1;
                    }
                    key
                }
            };
            next = Some(key);
        }
    }
}

/// The first later sibling that is either owned by the zone or the tail.
fn following(
    siblings: &[PatchKey],
    key: PatchKey,
    zone_keys: &HashSet<PatchKey>,
    tail: Option<PatchKey>,
) -> Option<PatchKey> {
    let pos = siblings.iter().position(|k| *k == key)?;
    siblings[pos + 1..]
        .iter()
        .copied()
        .find(|k| zone_keys.contains(k) || Some(*k) == tail)
}

fn insert_before(siblings: &mut Vec<PatchKey>, key: PatchKey, before: Option<PatchKey>) {
    match before.and_then(|b| siblings.iter().position(|k| *k == b)) {
        Some(pos) => siblings.insert(pos, key),
        None => siblings.push(key),
    }
}

fn sync_root<D: LiveDocument>(
    root: DocumentRoot,
    key: PatchKey,
    resolved: &ResolvedTags,
    state: &mut RootState,
    doc: &D,
    patches: &mut Vec<DomPatch>,
) -> Result<(), ReconcileError> {
    let zone = match root {
        DocumentRoot::Html => Zone::HtmlAttrs,
        _ => Zone::BodyAttrs,
    };
    let desired = resolved
        .in_zone(zone)
        .next()
        .map(|t| t.tag.dom_attributes())
        .unwrap_or_default();
    let element = doc.element(key).ok_or(ReconcileError::MissingRoot(root))?;

    for (name, value) in &desired {
        let applied = state.applied.iter().position(|(n, _)| n == name);
        if let Some(i) = applied
            && state.applied[i].1 == *value
        {
            continue;
        }
        let current = element.attr(name).map(|v| v.map(str::to_string));
        if applied.is_none() && !state.saved.contains_key(name) {
            state.saved.insert(Arc::clone(name), current.clone());
        }
        if current.as_ref() != Some(value) {
            patches.push(DomPatch::SetAttribute {
                key,
                name: Arc::clone(name),
                value: value.clone(),
            });
        }
        match applied {
            Some(i) => state.applied[i].1 = value.clone(),
            None => state.applied.push((Arc::clone(name), value.clone())),
        }
    }

    let stale: Vec<Arc<str>> = state
        .applied
        .iter()
        .filter(|(n, _)| !desired.iter().any(|(d, _)| d == n))
        .map(|(n, _)| Arc::clone(n))
        .collect();
    for name in stale {
        state.applied.retain(|(n, _)| *n != name);
        match state.saved.remove(&name).flatten() {
            Some(original) => patches.push(DomPatch::SetAttribute {
                key,
                name,
                value: original,
            }),
            None => patches.push(DomPatch::RemoveAttribute { key, name }),
        }
    }
    Ok(())
}
