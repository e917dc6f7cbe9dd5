//! In-memory live document for head reconciliation.
//!
//! `LiveDom` models the part of a browser document the head reconciler talks
//! to: an `<html>` element with `<head>` and `<body>`, element children with
//! attributes and text or markup content. It applies `DomPatch` batches with
//! the same validation a browser binding performs and records every script
//! execution, so tests can observe at-most-once execution.
//!
//! Invariants:
//! - Keys are never reused within one document.
//! - A script element executes when it is first connected to the document;
//!   moving it or patching its attributes does not execute it again.
//! - `version` advances once per applied non-empty batch.

mod arena;

use arena::{DomArena, NodeRecord};
use head::escape::{escape_attr, escape_raw_text, escape_text, is_raw_text_kind};
use head::{
    DocumentRoot, DomAttribute, DomPatch, DomPatchError, ElementView, LiveDocument, OWNED_MARKER,
    PatchKey, TagContent,
};
use std::sync::Arc;

const HTML_KEY: PatchKey = PatchKey(1);
const HEAD_KEY: PatchKey = PatchKey(2);
const BODY_KEY: PatchKey = PatchKey(3);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptExecution {
    pub key: PatchKey,
    pub src: Option<String>,
    pub inline: Option<String>,
}

pub struct LiveDom {
    arena: DomArena,
    next_key: u32,
    version: u64,
    executions: Vec<ScriptExecution>,
}

impl Default for LiveDom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LiveDom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveDom")
            .field("version", &self.version)
            .field("executions", &self.executions.len())
            .finish()
    }
}

impl LiveDom {
    /// An empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut arena = DomArena::new();
        let mut html = NodeRecord::element(&Arc::from("html"), &[], None);
        html.children = vec![HEAD_KEY, BODY_KEY];
        let mut head = NodeRecord::element(&Arc::from("head"), &[], None);
        head.parent = Some(HTML_KEY);
        let mut body = NodeRecord::element(&Arc::from("body"), &[], None);
        body.parent = Some(HTML_KEY);
        for (key, record) in [(HTML_KEY, html), (HEAD_KEY, head), (BODY_KEY, body)] {
            if let Err(err) = arena.insert_node(key, record) {
                log::error!(target: "dom_store", "failed to seed document root: {err}");
            }
        }
        Self {
            arena,
            next_key: BODY_KEY.0,
            version: 0,
            executions: Vec::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn executions(&self) -> &[ScriptExecution] {
        &self.executions
    }

    /// How many times a script with this `src` has executed.
    pub fn execution_count(&self, src: &str) -> usize {
        self.executions
            .iter()
            .filter(|e| e.src.as_deref() == Some(src))
            .count()
    }

    /// Adds markup that is not managed by any head entry, as a page template
    /// or a third-party script would.
    pub fn append_element(
        &mut self,
        parent: DocumentRoot,
        name: &str,
        attributes: Vec<DomAttribute>,
        content: Option<TagContent>,
    ) -> Result<PatchKey, DomPatchError> {
        let parent = self.root_key(parent);
        let key = self.allocate_key();
        self.apply(&[
            DomPatch::CreateElement {
                key,
                name: Arc::from(name),
                attributes,
                content,
            },
            DomPatch::AppendChild { parent, child: key },
        ])?;
        Ok(key)
    }

    pub fn set_root_attribute(
        &mut self,
        root: DocumentRoot,
        name: &str,
        value: Option<String>,
    ) -> Result<(), DomPatchError> {
        let key = self.root_key(root);
        self.apply(&[DomPatch::SetAttribute {
            key,
            name: Arc::from(name),
            value,
        }])
    }

    pub fn attribute(&self, key: PatchKey, name: &str) -> Option<Option<&str>> {
        self.arena
            .get(key)
            .and_then(|n| n.attr(name))
            .map(Option::as_deref)
    }

    /// Children of a root carrying the ownership marker.
    pub fn marked(&self, root: DocumentRoot) -> Vec<PatchKey> {
        self.children(self.root_key(root))
            .into_iter()
            .filter(|k| self.attribute(*k, OWNED_MARKER).is_some())
            .collect()
    }

    /// Outer HTML of each child of `root`, one per line.
    pub fn outline(&self, root: DocumentRoot) -> Vec<String> {
        self.children(self.root_key(root))
            .into_iter()
            .map(|k| {
                let mut out = String::new();
                self.write_node(k, &mut out);
                out
            })
            .collect()
    }

    /// Outer HTML of the whole document.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_node(HTML_KEY, &mut out);
        out
    }

    fn root_key(&self, root: DocumentRoot) -> PatchKey {
        match root {
            DocumentRoot::Html => HTML_KEY,
            DocumentRoot::Head => HEAD_KEY,
            DocumentRoot::Body => BODY_KEY,
        }
    }

    fn write_node(&self, key: PatchKey, out: &mut String) {
        let Some(node) = self.arena.get(key) else {
            return;
        };
        out.push('<');
        out.push_str(&node.name);
        for (name, value) in &node.attributes {
            out.push(' ');
            out.push_str(name);
            if let Some(value) = value {
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
        }
        out.push('>');
        if node.is_void() {
            return;
        }
        match &node.content {
            Some(TagContent::Text(text)) if is_raw_text_kind(&node.name) => {
                out.push_str(&escape_raw_text(&node.name, text));
            }
            Some(TagContent::Text(text)) => out.push_str(&escape_text(text)),
            Some(TagContent::Html(html)) => out.push_str(html),
            None => {}
        }
        for child in &node.children {
            self.write_node(*child, out);
        }
        out.push_str("</");
        out.push_str(&node.name);
        out.push('>');
    }

    fn apply_one(&mut self, patch: &DomPatch) -> Result<(), DomPatchError> {
        match patch {
            DomPatch::CreateElement {
                key,
                name,
                attributes,
                content,
            } => {
                self.ensure_key(*key)?;
                let record = NodeRecord::element(name, attributes, content.as_ref());
                if record.is_void() && record.content.is_some() {
                    return Err(DomPatchError::WrongNodeKind(*key));
                }
                self.arena.insert_node(*key, record)?;
            }
            DomPatch::AppendChild { parent, child } => {
                self.ensure_live(*parent)?;
                self.ensure_live(*child)?;
                self.arena.append_child(*parent, *child)?;
                self.on_connected(*child)?;
            }
            DomPatch::InsertBefore {
                parent,
                child,
                before,
            } => {
                self.ensure_live(*parent)?;
                self.ensure_live(*child)?;
                self.ensure_live(*before)?;
                self.arena.insert_before(*parent, *child, *before)?;
                self.on_connected(*child)?;
            }
            DomPatch::MoveNode {
                parent,
                child,
                before,
            } => {
                self.ensure_live(*parent)?;
                self.ensure_live(*child)?;
                if let Some(before) = before {
                    self.ensure_live(*before)?;
                }
                self.arena.detach(*child)?;
                match before {
                    Some(before) => self.arena.insert_before(*parent, *child, *before)?,
                    None => self.arena.append_child(*parent, *child)?,
                }
                self.on_connected(*child)?;
            }
            DomPatch::RemoveNode { key } => {
                self.ensure_live(*key)?;
                if [HTML_KEY, HEAD_KEY, BODY_KEY].contains(key) {
                    return Err(DomPatchError::WrongNodeKind(*key));
                }
                self.arena.remove_subtree(*key)?;
            }
            DomPatch::SetAttributes { key, attributes } => {
                self.ensure_live(*key)?;
                self.arena.get_mut(*key)?.attributes = attributes.clone();
            }
            DomPatch::SetAttribute { key, name, value } => {
                self.ensure_live(*key)?;
                let attributes = &mut self.arena.get_mut(*key)?.attributes;
                match attributes.iter_mut().find(|(k, _)| k == name) {
                    Some(slot) => slot.1 = value.clone(),
                    None => attributes.push((Arc::clone(name), value.clone())),
                }
            }
            DomPatch::RemoveAttribute { key, name } => {
                self.ensure_live(*key)?;
                self.arena
                    .get_mut(*key)?
                    .attributes
                    .retain(|(k, _)| k != name);
            }
            DomPatch::SetContent { key, content } => {
                self.ensure_live(*key)?;
                let node = self.arena.get_mut(*key)?;
                if node.is_void() && content.is_some() {
                    return Err(DomPatchError::WrongNodeKind(*key));
                }
                node.content = content.clone();
            }
            other => {
                log::warn!(target: "dom_store", "ignoring unsupported patch {other:?}");
            }
        }
        Ok(())
    }

    /// Runs a script the first time it becomes part of the document.
    fn on_connected(&mut self, key: PatchKey) -> Result<(), DomPatchError> {
        if !self.arena.is_connected(key, HTML_KEY) {
            return Ok(());
        }
        let node = self.arena.get_mut(key)?;
        if &*node.name != "script" || node.started {
            return Ok(());
        }
        node.started = true;
        let execution = ScriptExecution {
            key,
            src: node.attr("src").cloned().flatten(),
            inline: node.content.as_ref().map(|c| c.as_str().to_string()),
        };
        log::trace!(target: "dom_store", "execute {key}: {execution:?}");
        self.executions.push(execution);
        Ok(())
    }

    fn ensure_key(&self, key: PatchKey) -> Result<(), DomPatchError> {
        if key == PatchKey::INVALID {
            return Err(DomPatchError::InvalidKey(key));
        }
        Ok(())
    }

    fn ensure_live(&self, key: PatchKey) -> Result<(), DomPatchError> {
        self.ensure_key(key)?;
        if !self.arena.is_live(key) {
            return Err(DomPatchError::MissingKey(key));
        }
        Ok(())
    }
}

impl LiveDocument for LiveDom {
    fn root(&self, root: DocumentRoot) -> Option<PatchKey> {
        let key = self.root_key(root);
        self.arena.is_live(key).then_some(key)
    }

    fn children(&self, parent: PatchKey) -> Vec<PatchKey> {
        self.arena
            .get(parent)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn element(&self, key: PatchKey) -> Option<ElementView<'_>> {
        self.arena.get(key).map(|n| ElementView {
            name: &n.name,
            attributes: &n.attributes,
            content: n.content.as_ref(),
        })
    }

    fn allocate_key(&mut self) -> PatchKey {
        loop {
            self.next_key = self.next_key.wrapping_add(1).max(1);
            let key = PatchKey(self.next_key);
            if !self.arena.is_allocated(key) {
                return key;
            }
        }
    }

    /// Applies patches in order. A failing patch stops the batch; patches
    /// before it stay applied.
    fn apply(&mut self, patches: &[DomPatch]) -> Result<(), DomPatchError> {
        if patches.is_empty() {
            return Ok(());
        }
        for patch in patches {
            self.apply_one(patch)?;
        }
        self.version += 1;
        Ok(())
    }
}
