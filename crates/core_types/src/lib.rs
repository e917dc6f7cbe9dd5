use serde::Deserialize;

/// Stable handle for one caller's contribution to a head registry.
///
/// Ids are allocated from a per-registry counter starting at 1 and are never
/// reused, so a stale id can only ever miss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u64);

impl EntryId {
    pub const INVALID: EntryId = EntryId(0);

    pub fn next(counter: &mut u64) -> Self {
        *counter = counter.wrapping_add(1).max(1);
        Self(*counter)
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry#{}", self.0)
    }
}

/// Monotonic invalidation counter of a head registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl Generation {
    pub const INITIAL: Generation = Generation(0);

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(pub u64);

impl ScriptId {
    pub fn next(counter: &mut u64) -> Self {
        *counter = counter.wrapping_add(1).max(1);
        Self(*counter)
    }
}

impl std::fmt::Display for ScriptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "script#{}", self.0)
    }
}

/// Which side of the SSR boundary a head instance is rendering for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderSide {
    Server,
    #[default]
    Client,
}

impl RenderSide {
    pub fn is_server(self) -> bool {
        matches!(self, RenderSide::Server)
    }
}
