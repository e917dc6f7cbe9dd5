//! One declared script: its status machine, proxy queue and observers.
//!
//! Invariants:
//! - Status only moves forward: `AwaitingLoad -> Loading -> {Loaded | Error}`,
//!   and `Removed` is reachable from every state exactly once.
//! - Loaded and error callbacks each fire at most once, in registration order.
//! - No `RefCell` borrow is held while user code runs (resolvers, stubs,
//!   proxied calls, callbacks).
//! - A script removed while loading still delivers its late outcome to the
//!   callbacks and awaiters registered before removal.

use crate::error::ScriptError;
use crate::loader::{self, LoaderState};
use crate::observers::{Disposer, Observers};
use core_types::{EntryId, RenderSide, ScriptId};
use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::{LocalBoxFuture, Shared};
use head::{Head, TagInput};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::task::{Context, Poll};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptStatus {
    AwaitingLoad,
    Loading,
    Loaded,
    Error,
    Removed,
}

impl ScriptStatus {
    pub fn is_pending(self) -> bool {
        matches!(self, ScriptStatus::AwaitingLoad | ScriptStatus::Loading)
    }
}

impl std::fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScriptStatus::AwaitingLoad => "awaitingLoad",
            ScriptStatus::Loading => "loading",
            ScriptStatus::Loaded => "loaded",
            ScriptStatus::Error => "error",
            ScriptStatus::Removed => "removed",
        })
    }
}

pub type LoadResult<Api> = Result<Rc<Api>, ScriptError>;

/// Awaitable outcome of a load, shared by every caller of `load()`.
pub type LoadFuture<Api> = Shared<LocalBoxFuture<'static, LoadResult<Api>>>;

pub(crate) type ApiResolver<Api> = Rc<dyn Fn() -> Option<Api>>;
pub(crate) type StubFn = Rc<dyn Fn(&str) -> bool>;

type LoadedCallback<Api> = dyn FnOnce(&Rc<Api>);
type ErrorCallback = dyn FnOnce(&ScriptError);

/// How a proxied call was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// Ran against the real API, immediately or replayed after load.
    Invoked,
    /// A stub handled it.
    Stubbed,
    /// Discarded: the script failed, was removed, or runs server-side.
    Dropped,
}

/// Resolves once the call has been invoked, stubbed or dropped.
#[derive(Debug)]
pub struct CallReceipt {
    inner: Receipt,
}

#[derive(Debug)]
enum Receipt {
    Ready(CallOutcome),
    Pending(oneshot::Receiver<CallOutcome>),
}

impl CallReceipt {
    fn ready(outcome: CallOutcome) -> Self {
        Self {
            inner: Receipt::Ready(outcome),
        }
    }
}

impl Future for CallReceipt {
    type Output = CallOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CallOutcome> {
        match &mut self.inner {
            Receipt::Ready(outcome) => Poll::Ready(*outcome),
            Receipt::Pending(rx) => rx
                .poll_unpin(cx)
                .map(|sent| sent.unwrap_or(CallOutcome::Dropped)),
        }
    }
}

struct QueuedCall<Api> {
    method: Arc<str>,
    call: Box<dyn FnOnce(&Api)>,
    receipt: oneshot::Sender<CallOutcome>,
}

struct InstanceState<Api> {
    status: ScriptStatus,
    /// Removed while loading; the host may still report an outcome.
    in_flight: bool,
    api: Option<Rc<Api>>,
    error: Option<ScriptError>,
    queue: Vec<QueuedCall<Api>>,
    loaded: Observers<LoadedCallback<Api>>,
    failed: Observers<ErrorCallback>,
    settle: Option<oneshot::Sender<LoadResult<Api>>>,
}

impl<Api> InstanceState<Api> {
    fn accepts_outcome(&self) -> bool {
        self.status == ScriptStatus::Loading || self.in_flight
    }

    fn accepts_callbacks(&self) -> bool {
        self.status.is_pending()
    }
}

pub(crate) struct CoreParts<Api> {
    pub(crate) id: ScriptId,
    pub(crate) key: String,
    pub(crate) tag: TagInput,
    pub(crate) entry: EntryId,
    pub(crate) server_only: bool,
    pub(crate) head: Head,
    pub(crate) resolve: ApiResolver<Api>,
    pub(crate) stub: Option<StubFn>,
    pub(crate) methods: Vec<Arc<str>>,
    pub(crate) loader: Weak<RefCell<LoaderState>>,
}

pub(crate) struct ScriptCore<Api> {
    id: ScriptId,
    key: String,
    tag: TagInput,
    entry: EntryId,
    server_only: bool,
    head: Head,
    resolve: ApiResolver<Api>,
    stub: Option<StubFn>,
    methods: Vec<Arc<str>>,
    loader: Weak<RefCell<LoaderState>>,
    ready: LoadFuture<Api>,
    state: RefCell<InstanceState<Api>>,
}

/// Type-erased view the loader uses to route host events by id.
pub(crate) trait ScriptControl {
    fn begin(&self) -> bool;
    fn loaded(&self);
    fn failed(&self, error: ScriptError);
    /// Removed with no outcome left to deliver.
    fn is_retired(&self) -> bool;
}

impl<Api: 'static> ScriptCore<Api> {
    pub(crate) fn new(parts: CoreParts<Api>) -> Rc<Self> {
        let (settle, settled) = oneshot::channel();
        let ready = settled
            .map(|sent: Result<LoadResult<Api>, oneshot::Canceled>| {
                sent.unwrap_or(Err(ScriptError::Dropped))
            })
            .boxed_local()
            .shared();
        Rc::new(Self {
            id: parts.id,
            key: parts.key,
            tag: parts.tag,
            entry: parts.entry,
            server_only: parts.server_only,
            head: parts.head,
            resolve: parts.resolve,
            stub: parts.stub,
            methods: parts.methods,
            loader: parts.loader,
            ready,
            state: RefCell::new(InstanceState {
                status: ScriptStatus::AwaitingLoad,
                in_flight: false,
                api: None,
                error: None,
                queue: Vec::new(),
                loaded: Observers::default(),
                failed: Observers::default(),
                settle: Some(settle),
            }),
        })
    }

    fn status(&self) -> ScriptStatus {
        self.state.borrow().status
    }

    fn transition(&self, from: ScriptStatus, to: ScriptStatus) {
        log::debug!(target: "script_loader", "{} `{}`: {from} -> {to}", self.id, self.key);
    }

    /// Logs the outcome a host reported; a script removed while loading
    /// stays `removed`.
    fn settled_as(&self, late: bool, outcome: ScriptStatus) {
        if late {
            log::debug!(
                target: "script_loader",
                "{} `{}`: removed (late {outcome} delivered)",
                self.id,
                self.key
            );
        } else {
            self.transition(ScriptStatus::Loading, outcome);
        }
    }

    fn load(&self) -> LoadFuture<Api> {
        self.begin();
        self.ready.clone()
    }

    fn remove(&self) -> bool {
        let (from, queue, settle, in_flight) = {
            let mut state = self.state.borrow_mut();
            if state.status == ScriptStatus::Removed {
                return false;
            }
            let from = state.status;
            let in_flight = from == ScriptStatus::Loading;
            state.status = ScriptStatus::Removed;
            state.in_flight = in_flight;
            state.api = None;
            let settle = if in_flight {
                None
            } else {
                state.loaded.clear();
                state.failed.clear();
                state.settle.take()
            };
            (from, std::mem::take(&mut state.queue), settle, in_flight)
        };
        self.transition(from, ScriptStatus::Removed);
        self.head.remove(self.entry);
        loader::forget(&self.loader, self.id, &self.key, in_flight);
        for queued in queue {
            let _ = queued.receipt.send(CallOutcome::Dropped);
        }
        if let Some(settle) = settle {
            let _ = settle.send(Err(ScriptError::Removed));
        }
        true
    }

    fn call(&self, method: &Arc<str>, call: Box<dyn FnOnce(&Api)>) -> CallReceipt {
        let api = self.state.borrow().api.clone();
        if let Some(api) = api {
            call(&api);
            return CallReceipt::ready(CallOutcome::Invoked);
        }
        if let Some(stub) = self.stub.clone()
            && stub(method)
        {
            return CallReceipt::ready(CallOutcome::Stubbed);
        }
        let mut state = self.state.borrow_mut();
        // The stub may have re-entered and settled the script.
        if let Some(api) = state.api.clone() {
            drop(state);
            call(&api);
            return CallReceipt::ready(CallOutcome::Invoked);
        }
        if state.status.is_pending() && self.head.side() == RenderSide::Client {
            let (receipt, rx) = oneshot::channel();
            state.queue.push(QueuedCall {
                method: Arc::clone(method),
                call,
                receipt,
            });
            return CallReceipt {
                inner: Receipt::Pending(rx),
            };
        }
        log::trace!(
            target: "script_loader",
            "{}: dropped call to `{method}` while {}",
            self.id,
            state.status
        );
        CallReceipt::ready(CallOutcome::Dropped)
    }

    fn on_loaded(self: &Rc<Self>, callback: Box<LoadedCallback<Api>>) -> Disposer {
        let mut state = self.state.borrow_mut();
        if state.accepts_callbacks() {
            let id = state.loaded.push(callback);
            return self.disposer(move |state| state.loaded.remove(id));
        }
        let api = state.api.clone();
        drop(state);
        if let Some(api) = api {
            callback(&api);
        }
        Disposer::inert()
    }

    fn on_error(self: &Rc<Self>, callback: Box<ErrorCallback>) -> Disposer {
        let mut state = self.state.borrow_mut();
        if state.accepts_callbacks() {
            let id = state.failed.push(callback);
            return self.disposer(move |state| state.failed.remove(id));
        }
        let error = state.error.clone();
        drop(state);
        if let Some(error) = error {
            callback(&error);
        }
        Disposer::inert()
    }

    fn disposer(
        self: &Rc<Self>,
        unregister: impl FnOnce(&mut InstanceState<Api>) -> bool + 'static,
    ) -> Disposer {
        let core = Rc::downgrade(self);
        Disposer::new(move || {
            core.upgrade()
                .is_some_and(|core| unregister(&mut *core.state.borrow_mut()))
        })
    }
}

impl<Api: 'static> ScriptControl for ScriptCore<Api> {
    fn begin(&self) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.status != ScriptStatus::AwaitingLoad
                || self.server_only
                || self.head.side().is_server()
            {
                return false;
            }
            state.status = ScriptStatus::Loading;
        }
        self.transition(ScriptStatus::AwaitingLoad, ScriptStatus::Loading);
        self.head.update(self.entry, vec![self.tag.clone()]);
        true
    }

    fn loaded(&self) {
        if !self.state.borrow().accepts_outcome() {
            log::trace!(target: "script_loader", "{}: ignoring load report", self.id);
            return;
        }
        let resolve = Rc::clone(&self.resolve);
        let Some(api) = resolve() else {
            self.failed(ScriptError::ApiUnavailable);
            return;
        };
        let api = Rc::new(api);
        let (late, queue, callbacks, settle) = {
            let mut state = self.state.borrow_mut();
            if !state.accepts_outcome() {
                return;
            }
            let late = state.in_flight;
            if late {
                state.in_flight = false;
            } else {
                state.status = ScriptStatus::Loaded;
                state.api = Some(Rc::clone(&api));
            }
            state.failed.clear();
            (
                late,
                std::mem::take(&mut state.queue),
                state.loaded.drain(),
                state.settle.take(),
            )
        };
        self.settled_as(late, ScriptStatus::Loaded);
        for queued in queue {
            log::trace!(target: "script_loader", "{}: replaying `{}`", self.id, queued.method);
            (queued.call)(&api);
            let _ = queued.receipt.send(CallOutcome::Invoked);
        }
        for callback in callbacks {
            callback(&api);
        }
        if let Some(settle) = settle {
            let _ = settle.send(Ok(api));
        }
    }

    fn failed(&self, error: ScriptError) {
        let (late, queue, callbacks, settle) = {
            let mut state = self.state.borrow_mut();
            if !state.accepts_outcome() {
                log::trace!(target: "script_loader", "{}: ignoring error report", self.id);
                return;
            }
            let late = state.in_flight;
            if late {
                state.in_flight = false;
            } else {
                state.status = ScriptStatus::Error;
                state.error = Some(error.clone());
            }
            state.api = None;
            state.loaded.clear();
            (
                late,
                std::mem::take(&mut state.queue),
                state.failed.drain(),
                state.settle.take(),
            )
        };
        self.settled_as(late, ScriptStatus::Error);
        log::warn!(target: "script_loader", "{} `{}`: {error}", self.id, self.key);
        for queued in queue {
            let _ = queued.receipt.send(CallOutcome::Dropped);
        }
        for callback in callbacks {
            callback(&error);
        }
        if let Some(settle) = settle {
            let _ = settle.send(Err(error));
        }
    }

    fn is_retired(&self) -> bool {
        let state = self.state.borrow();
        state.status == ScriptStatus::Removed && !state.in_flight
    }
}

/// Handle to a declared script. Clones share one instance.
pub struct ScriptInstance<Api> {
    core: Rc<ScriptCore<Api>>,
}

impl<Api> Clone for ScriptInstance<Api> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<Api> std::fmt::Debug for ScriptInstance<Api> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("id", &self.core.id)
            .field("key", &self.core.key)
            .field("status", &self.core.state.borrow().status)
            .finish()
    }
}

impl<Api: 'static> ScriptInstance<Api> {
    pub(crate) fn from_core(core: Rc<ScriptCore<Api>>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> ScriptId {
        self.core.id
    }

    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Head entry carrying this script's tag.
    pub fn entry(&self) -> EntryId {
        self.core.entry
    }

    pub fn status(&self) -> ScriptStatus {
        self.core.status()
    }

    pub fn proxy(&self) -> Proxy<Api> {
        Proxy {
            core: Rc::clone(&self.core),
        }
    }

    /// The resolved API once loaded.
    pub fn instance(&self) -> Option<Rc<Api>> {
        self.core.state.borrow().api.clone()
    }

    /// Starts loading if nothing has yet and returns the shared outcome.
    /// Server-only scripts, and every script on a server-side head, never
    /// transition, so their future only settles on removal.
    pub fn load(&self) -> LoadFuture<Api> {
        self.core.load()
    }

    /// The shared outcome without starting a load.
    pub fn settled(&self) -> LoadFuture<Api> {
        self.core.ready.clone()
    }

    /// `load()` with a callback fired once the API is available.
    pub fn load_with(&self, on_loaded: impl FnOnce(&Rc<Api>) + 'static) -> LoadFuture<Api> {
        let _registered = self.on_loaded(on_loaded);
        self.load()
    }

    /// Disposes the head entry. Returns `false` if already removed.
    pub fn remove(&self) -> bool {
        self.core.remove()
    }

    /// Fires once with the API; immediately if already loaded.
    pub fn on_loaded(&self, callback: impl FnOnce(&Rc<Api>) + 'static) -> Disposer {
        self.core.on_loaded(Box::new(callback))
    }

    /// Fires once with the failure; immediately if already failed.
    pub fn on_error(&self, callback: impl FnOnce(&ScriptError) + 'static) -> Disposer {
        self.core.on_error(Box::new(callback))
    }
}

/// Forwarders for the methods named when the script was declared.
pub struct Proxy<Api> {
    core: Rc<ScriptCore<Api>>,
}

impl<Api: 'static> Proxy<Api> {
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.core.methods.iter().map(|m| &**m)
    }

    /// `None` when `name` is not part of the declared capabilities.
    pub fn method(&self, name: &str) -> Option<ProxyMethod<Api>> {
        let name = self.core.methods.iter().find(|m| &***m == name)?;
        Some(ProxyMethod {
            core: Rc::clone(&self.core),
            name: Arc::clone(name),
        })
    }
}

pub struct ProxyMethod<Api> {
    core: Rc<ScriptCore<Api>>,
    name: Arc<str>,
}

impl<Api> Clone for ProxyMethod<Api> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            name: Arc::clone(&self.name),
        }
    }
}

impl<Api: 'static> ProxyMethod<Api> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `call` against the API now, or stubs, queues or drops it
    /// depending on the script's state. Never fails.
    pub fn call(&self, call: impl FnOnce(&Api) + 'static) -> CallReceipt {
        self.core.call(&self.name, Box::new(call))
    }
}
