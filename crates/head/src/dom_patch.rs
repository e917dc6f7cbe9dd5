//! Patch protocol between the reconciler and a live document.
//!
//! Invariants:
//! - Patches are applied in order.
//! - References must point to live keys at the time they are used (except the
//!   `key` in `CreateElement`).
//! - `PatchKey::INVALID` is never valid in a patch stream.
//! - A node has at most one parent; `InsertBefore`/`AppendChild` require a
//!   detached child, `MoveNode` re-parents an attached one.
//! - Attribute names are canonical ASCII-lowercase; order is preserved.

use crate::types::TagContent;
use std::sync::Arc;

/// Opaque key for stable element identity within a live document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchKey(pub u32);

impl PatchKey {
    /// Reserved sentinel for "unassigned/invalid" identity.
    pub const INVALID: PatchKey = PatchKey(0);
}

impl std::fmt::Display for PatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attribute as carried on a live element; `None` is a bare attribute.
pub type DomAttribute = (Arc<str>, Option<String>);

#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomPatch {
    /// Create a detached element with initial attributes and content.
    CreateElement {
        key: PatchKey,
        name: Arc<str>,
        attributes: Vec<DomAttribute>,
        content: Option<TagContent>,
    },
    /// Append a detached child to the end of a parent's children list.
    AppendChild { parent: PatchKey, child: PatchKey },
    /// Insert a detached child before an existing sibling.
    InsertBefore {
        parent: PatchKey,
        child: PatchKey,
        before: PatchKey,
    },
    /// Move an attached child before `before`, or to the end when `None`.
    MoveNode {
        parent: PatchKey,
        child: PatchKey,
        before: Option<PatchKey>,
    },
    /// Remove an element and its subtree.
    RemoveNode { key: PatchKey },
    /// Replace all attributes on an element.
    SetAttributes {
        key: PatchKey,
        attributes: Vec<DomAttribute>,
    },
    /// Set or overwrite one attribute, keeping the others.
    SetAttribute {
        key: PatchKey,
        name: Arc<str>,
        value: Option<String>,
    },
    RemoveAttribute { key: PatchKey, name: Arc<str> },
    /// Replace the text or markup content of an element.
    SetContent {
        key: PatchKey,
        content: Option<TagContent>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DomPatchError {
    #[error("patch key {0} is invalid")]
    InvalidKey(PatchKey),
    #[error("patch key {0} is already allocated")]
    DuplicateKey(PatchKey),
    #[error("patch key {0} is not live")]
    MissingKey(PatchKey),
    #[error("node {0} cannot receive this patch")]
    WrongNodeKind(PatchKey),
    #[error("node {0} cannot be attached there")]
    InvalidParent(PatchKey),
    #[error("{before} is not a child of {parent}")]
    InvalidSibling { parent: PatchKey, before: PatchKey },
    #[error("attaching {child} under {parent} would create a cycle")]
    CycleDetected { parent: PatchKey, child: PatchKey },
    #[error("document root is missing")]
    MissingRoot,
}
