//! Entry registry: the single source of truth for what has been declared.
//!
//! Invariants:
//! - Entry ids are unique for the registry's lifetime and never reused.
//! - `entries` is kept in id order, which is also insertion order.
//! - Every observable mutation advances `generation`; nothing else does.
//! - `update` keeps the entry's original sequence number.

use crate::types::TagInput;
use core_types::{EntryId, Generation, RenderSide};
use serde::Deserialize;

/// Priority of an entry. Lower bands sort first and win dedup contests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PriorityRepr")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Default,
    Low,
    Value(i32),
}

impl Priority {
    pub const fn band(self) -> i32 {
        match self {
            Priority::Critical => 20,
            Priority::High => 90,
            Priority::Default => 100,
            Priority::Low => 120,
            Priority::Value(v) => v,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PriorityRepr {
    Value(i32),
    Name(String),
}

impl TryFrom<PriorityRepr> for Priority {
    type Error = String;

    fn try_from(repr: PriorityRepr) -> Result<Self, Self::Error> {
        match repr {
            PriorityRepr::Value(v) => Ok(Priority::Value(v)),
            PriorityRepr::Name(name) => match name.as_str() {
                "critical" => Ok(Priority::Critical),
                "high" => Ok(Priority::High),
                "default" => Ok(Priority::Default),
                "low" => Ok(Priority::Low),
                other => Err(format!("unknown priority `{other}`")),
            },
        }
    }
}

/// Which render side an entry is visible on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Client,
    Server,
    #[default]
    Both,
}

impl Mode {
    pub fn visible_on(self, side: RenderSide) -> bool {
        match self {
            Mode::Both => true,
            Mode::Client => side == RenderSide::Client,
            Mode::Server => side == RenderSide::Server,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryOptions {
    pub priority: Priority,
    pub mode: Mode,
}

impl EntryOptions {
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    id: EntryId,
    tags: Vec<TagInput>,
    options: EntryOptions,
    created_at: u64,
}

impl Entry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn tags(&self) -> &[TagInput] {
        &self.tags
    }

    pub fn options(&self) -> EntryOptions {
        self.options
    }

    pub fn band(&self) -> i32 {
        self.options.priority.band()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

#[derive(Debug)]
pub struct Registry {
    side: RenderSide,
    entries: Vec<Entry>,
    next_id: u64,
    next_seq: u64,
    generation: Generation,
}

impl Registry {
    pub fn new(side: RenderSide) -> Self {
        Self {
            side,
            entries: Vec::new(),
            next_id: 0,
            next_seq: 0,
            generation: Generation::INITIAL,
        }
    }

    pub fn side(&self) -> RenderSide {
        self.side
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, tags: Vec<TagInput>, options: EntryOptions) -> EntryId {
        let id = EntryId::next(&mut self.next_id);
        self.next_seq += 1;
        self.entries.push(Entry {
            id,
            tags,
            options,
            created_at: self.next_seq,
        });
        self.invalidate();
        log::trace!(
            target: "head.registry",
            "push {id} band={} tags={}",
            options.priority.band(),
            self.entries.last().map_or(0, |e| e.tags.len())
        );
        id
    }

    /// Replaces an entry's tags in place. Unknown ids are a silent no-op since
    /// disposal may race with in-flight async callers.
    pub fn update(&mut self, id: EntryId, tags: Vec<TagInput>) -> bool {
        let Some(index) = self.position(id) else {
            log::debug!(target: "head.registry", "update {id} ignored: entry is gone");
            return false;
        };
        self.entries[index].tags = tags;
        self.invalidate();
        true
    }

    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(index) = self.position(id) else {
            log::debug!(target: "head.registry", "remove {id} ignored: entry already disposed");
            return false;
        };
        self.entries.remove(index);
        self.invalidate();
        log::trace!(target: "head.registry", "remove {id}");
        true
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.position(id).map(|index| &self.entries[index])
    }

    /// Entries ordered by priority band (ascending), then sequence number.
    pub fn snapshot(&self) -> Vec<&Entry> {
        let mut out: Vec<&Entry> = self.entries.iter().collect();
        out.sort_by_key(|e| (e.band(), e.created_at));
        out
    }

    fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.binary_search_by_key(&id, |e| e.id).ok()
    }

    fn invalidate(&mut self) {
        self.generation = self.generation.next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(text: &str) -> Vec<TagInput> {
        vec![TagInput::title(text)]
    }

    #[test]
    fn remove_reports_true_exactly_once() {
        let mut registry = Registry::new(RenderSide::Client);
        let id = registry.push(title("a"), EntryOptions::default());
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn update_of_unknown_id_is_noop() {
        let mut registry = Registry::new(RenderSide::Client);
        let id = registry.push(title("a"), EntryOptions::default());
        registry.remove(id);
        let generation = registry.generation();
        assert!(!registry.update(id, title("b")));
        assert_eq!(registry.generation(), generation);
    }

    #[test]
    fn update_preserves_sequence_number() {
        let mut registry = Registry::new(RenderSide::Client);
        let a = registry.push(title("a"), EntryOptions::default());
        let b = registry.push(title("b"), EntryOptions::default());
        let seq = registry.get(a).unwrap().created_at();
        assert!(registry.update(a, title("a2")));
        assert_eq!(registry.get(a).unwrap().created_at(), seq);
        let order: Vec<EntryId> = registry.snapshot().iter().map(|e| e.id()).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn snapshot_orders_by_band_then_sequence() {
        let mut registry = Registry::new(RenderSide::Client);
        let low = registry.push(title("low"), EntryOptions::default().priority(Priority::Low));
        let plain = registry.push(title("plain"), EntryOptions::default());
        let critical = registry.push(
            title("critical"),
            EntryOptions::default().priority(Priority::Critical),
        );
        let custom = registry.push(
            title("custom"),
            EntryOptions::default().priority(Priority::Value(100)),
        );
        let order: Vec<EntryId> = registry.snapshot().iter().map(|e| e.id()).collect();
        assert_eq!(order, vec![critical, plain, custom, low]);
    }

    #[test]
    fn every_mutation_advances_generation() {
        let mut registry = Registry::new(RenderSide::Server);
        let g0 = registry.generation();
        let id = registry.push(title("a"), EntryOptions::default());
        let g1 = registry.generation();
        registry.update(id, title("b"));
        let g2 = registry.generation();
        registry.remove(id);
        let g3 = registry.generation();
        assert!(g0 < g1 && g1 < g2 && g2 < g3);
    }

    #[test]
    fn priority_deserializes_from_name_or_number() {
        #[derive(Deserialize)]
        struct Holder {
            p: Priority,
        }
        let named: Holder = serde_json::from_str(r#"{"p":"high"}"#).unwrap();
        assert_eq!(named.p, Priority::High);
        let numeric: Holder = serde_json::from_str(r#"{"p":-5}"#).unwrap();
        assert_eq!(numeric.p, Priority::Value(-5));
        assert!(serde_json::from_str::<Holder>(r#"{"p":"urgent"}"#).is_err());
    }
}
