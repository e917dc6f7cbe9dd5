//! Callback lists with explicit disposal tokens.

pub(crate) struct Observers<T: ?Sized> {
    next: u64,
    list: Vec<(u64, Box<T>)>,
}

impl<T: ?Sized> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next: 0,
            list: Vec::new(),
        }
    }
}

impl<T: ?Sized> Observers<T> {
    pub(crate) fn push(&mut self, callback: Box<T>) -> u64 {
        self.next += 1;
        self.list.push((self.next, callback));
        self.next
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.list.len();
        self.list.retain(|(i, _)| *i != id);
        self.list.len() != before
    }

    /// Callbacks in registration order; the list is left empty.
    pub(crate) fn drain(&mut self) -> Vec<Box<T>> {
        std::mem::take(&mut self.list)
            .into_iter()
            .map(|(_, cb)| cb)
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.list.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }
}

/// Unregisters a callback when [`Disposer::dispose`] is called. Dropping the
/// token keeps the callback registered.
#[must_use = "dropping a Disposer keeps the callback registered"]
pub struct Disposer {
    dispose: Option<Box<dyn FnOnce() -> bool>>,
}

impl Disposer {
    pub(crate) fn new(dispose: impl FnOnce() -> bool + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A token for a callback that already ran or can never run.
    pub(crate) fn inert() -> Self {
        Self { dispose: None }
    }

    /// Returns whether a still-pending callback was removed.
    pub fn dispose(mut self) -> bool {
        self.dispose.take().is_some_and(|dispose| dispose())
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("armed", &self.dispose.is_some())
            .finish()
    }
}
