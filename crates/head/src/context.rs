//! Per-document head context.
//!
//! A `Head` is a cheap clone handle over one registry and its resolver. It is
//! constructed explicitly per document (one per request on the server, one per
//! page on the client) and handed to whoever declares tags.
//!
//! Batching: the first mutation after a flush calls the installed scheduler
//! once; later mutations only mark the flush as pending until the host calls
//! [`Head::take_flush`]. The scheduler runs with no borrow held, so it may
//! call back into the handle.

use crate::registry::{Entry, EntryOptions, Registry};
use crate::resolve::{ResolvedTags, Resolver};
use crate::ssr::SsrOptions;
use crate::types::TagInput;
use core_types::{EntryId, Generation, RenderSide};
use serde::Deserialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeadOptions {
    pub side: RenderSide,
    pub ssr: SsrOptions,
}

impl HeadOptions {
    pub fn server() -> Self {
        Self {
            side: RenderSide::Server,
            ..Self::default()
        }
    }
}

type Scheduler = Rc<dyn Fn()>;

struct HeadState {
    registry: Registry,
    resolver: Resolver,
    options: HeadOptions,
    scheduler: Option<Scheduler>,
    flush_pending: bool,
}

#[derive(Clone)]
pub struct Head {
    inner: Rc<RefCell<HeadState>>,
}

impl std::fmt::Debug for Head {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("Head")
            .field("side", &state.options.side)
            .field("entries", &state.registry.len())
            .field("generation", &state.registry.generation())
            .field("flush_pending", &state.flush_pending)
            .finish()
    }
}

impl Head {
    pub fn new(options: HeadOptions) -> Self {
        Self {
            inner: Rc::new(RefCell::new(HeadState {
                registry: Registry::new(options.side),
                resolver: Resolver::new(),
                options,
                scheduler: None,
                flush_pending: false,
            })),
        }
    }

    pub fn client() -> Self {
        Self::new(HeadOptions::default())
    }

    pub fn server() -> Self {
        Self::new(HeadOptions::server())
    }

    pub fn side(&self) -> RenderSide {
        self.inner.borrow().options.side
    }

    pub fn options(&self) -> HeadOptions {
        self.inner.borrow().options
    }

    pub fn generation(&self) -> Generation {
        self.inner.borrow().registry.generation()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, id: EntryId) -> Option<Entry> {
        self.inner.borrow().registry.get(id).cloned()
    }

    pub fn push(&self, tags: Vec<TagInput>, options: EntryOptions) -> EntryId {
        let id = self.inner.borrow_mut().registry.push(tags, options);
        self.request_flush();
        id
    }

    pub fn update(&self, id: EntryId, tags: Vec<TagInput>) -> bool {
        let updated = self.inner.borrow_mut().registry.update(id, tags);
        if updated {
            self.request_flush();
        }
        updated
    }

    pub fn remove(&self, id: EntryId) -> bool {
        let removed = self.inner.borrow_mut().registry.remove(id);
        if removed {
            self.request_flush();
        }
        removed
    }

    /// Resolved tag list for the current generation; pointer-equal across
    /// calls until the next mutation.
    pub fn resolve(&self) -> Arc<ResolvedTags> {
        let mut state = self.inner.borrow_mut();
        let HeadState {
            registry, resolver, ..
        } = &mut *state;
        resolver.resolve(registry)
    }

    pub fn set_flush_scheduler(&self, scheduler: impl Fn() + 'static) {
        self.inner.borrow_mut().scheduler = Some(Rc::new(scheduler));
    }

    /// Acknowledges a pending flush. Returns whether one was pending.
    pub fn take_flush(&self) -> bool {
        std::mem::take(&mut self.inner.borrow_mut().flush_pending)
    }

    pub fn flush_pending(&self) -> bool {
        self.inner.borrow().flush_pending
    }

    fn request_flush(&self) {
        let scheduler = {
            let mut state = self.inner.borrow_mut();
            if state.flush_pending {
                return;
            }
            state.flush_pending = true;
            state.scheduler.clone()
        };
        if let Some(schedule) = scheduler {
            schedule();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn resolve_is_pointer_equal_until_mutation() {
        let head = Head::client();
        head.push(vec![TagInput::title("a")], EntryOptions::default());
        let first = head.resolve();
        let second = head.resolve();
        assert!(Arc::ptr_eq(&first, &second));
        head.push(vec![TagInput::title("b")], EntryOptions::default());
        assert!(!Arc::ptr_eq(&first, &head.resolve()));
    }

    #[test]
    fn many_mutations_schedule_one_flush() {
        let head = Head::client();
        let scheduled = Rc::new(Cell::new(0));
        let counter = Rc::clone(&scheduled);
        head.set_flush_scheduler(move || counter.set(counter.get() + 1));

        let id = head.push(vec![TagInput::title("a")], EntryOptions::default());
        head.update(id, vec![TagInput::title("b")]);
        head.push(vec![TagInput::meta_name("x", "1")], EntryOptions::default());
        assert_eq!(scheduled.get(), 1);

        assert!(head.take_flush());
        assert!(!head.take_flush());
        head.remove(id);
        assert_eq!(scheduled.get(), 2);
    }

    #[test]
    fn noop_mutations_do_not_schedule() {
        let head = Head::client();
        let scheduled = Rc::new(Cell::new(0));
        let counter = Rc::clone(&scheduled);
        head.set_flush_scheduler(move || counter.set(counter.get() + 1));
        assert!(!head.remove(EntryId(42)));
        assert!(!head.update(EntryId(42), Vec::new()));
        assert_eq!(scheduled.get(), 0);
        assert!(!head.flush_pending());
    }

    #[test]
    fn scheduler_may_reenter_the_handle() {
        let head = Head::server();
        let seen = Rc::new(Cell::new(0usize));
        let (probe, sink) = (head.clone(), Rc::clone(&seen));
        head.set_flush_scheduler(move || sink.set(probe.resolve().len()));
        head.push(vec![TagInput::title("t")], EntryOptions::default());
        assert_eq!(seen.get(), 1);
    }
}
