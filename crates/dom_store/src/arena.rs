use head::{DomAttribute, DomPatchError, PatchKey, TagContent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub(crate) const VOID_ELEMENTS: [&str; 3] = ["meta", "link", "base"];

pub(crate) struct NodeRecord {
    pub(crate) name: Arc<str>,
    pub(crate) attributes: Vec<DomAttribute>,
    pub(crate) content: Option<TagContent>,
    pub(crate) parent: Option<PatchKey>,
    pub(crate) children: Vec<PatchKey>,
    /// Set once a script element has been connected and executed.
    pub(crate) started: bool,
}

impl NodeRecord {
    pub(crate) fn element(
        name: &Arc<str>,
        attributes: &[DomAttribute],
        content: Option<&TagContent>,
    ) -> Self {
        Self {
            name: Arc::clone(name),
            attributes: attributes.to_vec(),
            content: content.cloned(),
            parent: None,
            children: Vec::new(),
            started: false,
        }
    }

    pub(crate) fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&&*self.name)
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&Option<String>> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

pub(crate) struct DomArena {
    nodes: Vec<NodeRecord>,
    live: HashMap<PatchKey, usize>,
    allocated: HashSet<PatchKey>,
}

impl DomArena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            live: HashMap::new(),
            allocated: HashSet::new(),
        }
    }

    pub(crate) fn is_allocated(&self, key: PatchKey) -> bool {
        self.allocated.contains(&key)
    }

    pub(crate) fn is_live(&self, key: PatchKey) -> bool {
        self.live.contains_key(&key)
    }

    pub(crate) fn insert_node(&mut self, key: PatchKey, record: NodeRecord) -> Result<(), DomPatchError> {
        if self.allocated.contains(&key) {
            return Err(DomPatchError::DuplicateKey(key));
        }
        let index = self.nodes.len();
        self.nodes.push(record);
        self.allocated.insert(key);
        self.live.insert(key, index);
        Ok(())
    }

    pub(crate) fn get(&self, key: PatchKey) -> Option<&NodeRecord> {
        self.live.get(&key).map(|&index| &self.nodes[index])
    }

    pub(crate) fn get_mut(&mut self, key: PatchKey) -> Result<&mut NodeRecord, DomPatchError> {
        let index = self.index(key)?;
        Ok(&mut self.nodes[index])
    }

    fn index(&self, key: PatchKey) -> Result<usize, DomPatchError> {
        self.live
            .get(&key)
            .copied()
            .ok_or(DomPatchError::MissingKey(key))
    }

    fn check_attach(&self, parent: PatchKey, child: PatchKey) -> Result<(usize, usize), DomPatchError> {
        if parent == child || self.is_descendant(child, parent) {
            return Err(DomPatchError::CycleDetected { parent, child });
        }
        let parent_index = self.index(parent)?;
        let child_index = self.index(child)?;
        if self.nodes[parent_index].is_void() {
            return Err(DomPatchError::InvalidParent(parent));
        }
        if self.nodes[child_index].parent.is_some() {
            return Err(DomPatchError::InvalidParent(child));
        }
        Ok((parent_index, child_index))
    }

    pub(crate) fn append_child(&mut self, parent: PatchKey, child: PatchKey) -> Result<(), DomPatchError> {
        let (parent_index, child_index) = self.check_attach(parent, child)?;
        self.nodes[parent_index].children.push(child);
        self.nodes[child_index].parent = Some(parent);
        Ok(())
    }

    pub(crate) fn insert_before(
        &mut self,
        parent: PatchKey,
        child: PatchKey,
        before: PatchKey,
    ) -> Result<(), DomPatchError> {
        let (parent_index, child_index) = self.check_attach(parent, child)?;
        let pos = self.nodes[parent_index]
            .children
            .iter()
            .position(|k| *k == before)
            .ok_or(DomPatchError::InvalidSibling { parent, before })?;
        self.nodes[parent_index].children.insert(pos, child);
        self.nodes[child_index].parent = Some(parent);
        Ok(())
    }

    pub(crate) fn detach(&mut self, key: PatchKey) -> Result<(), DomPatchError> {
        let index = self.index(key)?;
        if let Some(parent) = self.nodes[index].parent.take()
            && let Some(parent_index) = self.live.get(&parent).copied()
        {
            self.nodes[parent_index].children.retain(|k| *k != key);
        }
        Ok(())
    }

    pub(crate) fn remove_subtree(&mut self, key: PatchKey) -> Result<(), DomPatchError> {
        self.detach(key)?;
        let index = self.index(key)?;
        let children = std::mem::take(&mut self.nodes[index].children);
        self.live.remove(&key);
        for child in children {
            if self.live.contains_key(&child) {
                self.remove_subtree(child)?;
            }
        }
        Ok(())
    }

    /// Whether `key` hangs below `root` through live parent links.
    pub(crate) fn is_connected(&self, key: PatchKey, root: PatchKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == root {
                return true;
            }
            current = self.get(k).and_then(|n| n.parent);
        }
        false
    }

    fn is_descendant(&self, ancestor: PatchKey, maybe_descendant: PatchKey) -> bool {
        let Some(&index) = self.live.get(&ancestor) else {
            return false;
        };
        let mut stack: Vec<PatchKey> = self.nodes[index].children.clone();
        while let Some(current) = stack.pop() {
            if current == maybe_descendant {
                return true;
            }
            if let Some(&child_index) = self.live.get(&current) {
                stack.extend(self.nodes[child_index].children.iter().copied());
            }
        }
        false
    }
}
