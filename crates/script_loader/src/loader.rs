//! Script declaration, deduplication and host event routing.

use crate::error::ScriptError;
use crate::instance::{
    ApiResolver, CoreParts, ScriptControl, ScriptCore, ScriptInstance, StubFn,
};
use crate::trigger::Trigger;
use core_types::ScriptId;
use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use head::{AttrValue, EntryOptions, Head, Mode, Priority, TagInput};
use serde::Deserialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// The document is already hydrated; `Client` triggers fire at declare.
    pub hydrated: bool,
}

/// What to render as the `<script>` tag.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptDescriptor {
    pub src: String,
    pub attributes: Vec<(String, AttrValue)>,
}

impl ScriptDescriptor {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    fn to_tag(&self, key: Option<&str>) -> TagInput {
        let mut tag = TagInput::script_src(self.src.as_str());
        for (name, value) in &self.attributes {
            tag = tag.attr(name.as_str(), value.clone());
        }
        match key {
            Some(key) => tag.key(key),
            None => tag,
        }
    }
}

pub struct ScriptOptions<Api> {
    key: Option<String>,
    trigger: Option<Trigger>,
    resolve: ApiResolver<Api>,
    stub: Option<StubFn>,
    methods: Vec<Arc<str>>,
    priority: Priority,
}

impl<Api> ScriptOptions<Api> {
    /// `resolve` produces the API once the host reports the script loaded;
    /// `None` fails the load with [`ScriptError::ApiUnavailable`].
    pub fn new(resolve: impl Fn() -> Option<Api> + 'static) -> Self {
        Self {
            key: None,
            trigger: None,
            resolve: Rc::new(resolve),
            stub: None,
            methods: Vec::new(),
            priority: Priority::Default,
        }
    }

    /// Dedup key; defaults to `src`.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Defaults to [`Trigger::Client`] on the client and [`Trigger::Server`]
    /// on the server.
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Handles proxied calls by method name before the API exists. Returns
    /// whether it handled the call.
    pub fn stub(mut self, stub: impl Fn(&str) -> bool + 'static) -> Self {
        self.stub = Some(Rc::new(stub));
        self
    }

    /// Method names the proxy exposes.
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

struct Registered {
    id: ScriptId,
    instance: Rc<dyn Any>,
}

pub(crate) struct LoaderState {
    options: LoaderOptions,
    next_id: u64,
    by_key: HashMap<String, Registered>,
    by_id: HashMap<ScriptId, Rc<dyn ScriptControl>>,
    awaiting_hydration: Vec<Weak<dyn ScriptControl>>,
}

/// Declares scripts into one document's head. Clones share state.
#[derive(Clone)]
pub struct ScriptLoader {
    head: Head,
    spawner: LocalSpawner,
    state: Rc<RefCell<LoaderState>>,
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ScriptLoader")
            .field("hydrated", &state.options.hydrated)
            .field("live", &state.by_key.len())
            .field("tracked", &state.by_id.len())
            .finish()
    }
}

impl ScriptLoader {
    pub fn new(head: Head, spawner: LocalSpawner, options: LoaderOptions) -> Self {
        Self {
            head,
            spawner,
            state: Rc::new(RefCell::new(LoaderState {
                options,
                next_id: 0,
                by_key: HashMap::new(),
                by_id: HashMap::new(),
                awaiting_hydration: Vec::new(),
            })),
        }
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn is_hydrated(&self) -> bool {
        self.state.borrow().options.hydrated
    }

    /// Number of live (not removed) declarations.
    pub fn len(&self) -> usize {
        self.state.borrow().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instance_id(&self, key: &str) -> Option<ScriptId> {
        self.state.borrow().by_key.get(key).map(|r| r.id)
    }

    /// Declares a script. A live declaration with the same key is returned
    /// as is, whatever the other options say.
    pub fn declare<Api: 'static>(
        &self,
        descriptor: ScriptDescriptor,
        options: ScriptOptions<Api>,
    ) -> Result<ScriptInstance<Api>, ScriptError> {
        let key = options.key.clone().unwrap_or_else(|| descriptor.src.clone());
        let existing = self
            .state
            .borrow()
            .by_key
            .get(&key)
            .map(|r| Rc::clone(&r.instance));
        if let Some(existing) = existing {
            return match existing.downcast::<ScriptCore<Api>>() {
                Ok(core) => {
                    log::trace!(target: "script_loader", "reusing declaration `{key}`");
                    Ok(ScriptInstance::from_core(core))
                }
                Err(_) => {
                    log::warn!(target: "script_loader", "`{key}` redeclared with another API type");
                    Err(ScriptError::ApiMismatch { key })
                }
            };
        }

        let side = self.head.side();
        let trigger = options.trigger.unwrap_or(if side.is_server() {
            Trigger::Server
        } else {
            Trigger::Client
        });
        let tag = descriptor.to_tag(options.key.as_deref());
        let server_only = trigger.is_server();
        let entry_options = EntryOptions::default().priority(options.priority);
        let entry = if server_only {
            self.head
                .push(vec![tag.clone()], entry_options.mode(Mode::Server))
        } else {
            self.head.push(Vec::new(), entry_options.mode(Mode::Client))
        };

        let id = ScriptId::next(&mut self.state.borrow_mut().next_id);
        let core = ScriptCore::new(CoreParts {
            id,
            key: key.clone(),
            tag,
            entry,
            server_only,
            head: self.head.clone(),
            resolve: options.resolve,
            stub: options.stub,
            methods: options.methods,
            loader: Rc::downgrade(&self.state),
        });
        let control: Rc<dyn ScriptControl> = core.clone();
        let instance: Rc<dyn Any> = core.clone();
        {
            let mut state = self.state.borrow_mut();
            state.by_key.insert(key.clone(), Registered { id, instance });
            state.by_id.insert(id, Rc::clone(&control));
        }
        log::debug!(target: "script_loader", "{id} `{key}` declared with {trigger:?} on {side:?}");

        match trigger {
            Trigger::Server | Trigger::Manual => {}
            _ if side.is_server() => {}
            Trigger::Client => {
                if self.is_hydrated() {
                    control.begin();
                } else {
                    self.state
                        .borrow_mut()
                        .awaiting_hydration
                        .push(Rc::downgrade(&control));
                }
            }
            Trigger::Deferred(ready) => self.spawn_deferred(id, &control, ready),
        }
        Ok(ScriptInstance::from_core(core))
    }

    fn spawn_deferred(
        &self,
        id: ScriptId,
        control: &Rc<dyn ScriptControl>,
        ready: LocalBoxFuture<'static, bool>,
    ) {
        let control = Rc::downgrade(control);
        let task = async move {
            if ready.await
                && let Some(control) = control.upgrade()
            {
                control.begin();
            }
        };
        if let Err(err) = self.spawner.spawn_local(task) {
            log::warn!(target: "script_loader", "{id}: deferred trigger not scheduled: {err}");
        }
    }

    /// Marks the document hydrated and starts every waiting `Client` script.
    pub fn hydrate(&self) {
        let waiting = {
            let mut state = self.state.borrow_mut();
            state.options.hydrated = true;
            std::mem::take(&mut state.awaiting_hydration)
        };
        for control in waiting.iter().filter_map(Weak::upgrade) {
            control.begin();
        }
    }

    /// Host report: the script element finished loading. Returns `false`
    /// for ids this loader no longer tracks.
    pub fn on_script_loaded(&self, id: ScriptId) -> bool {
        self.route(id, |control| control.loaded())
    }

    /// Host report: the script element failed to load.
    pub fn on_script_error(&self, id: ScriptId, reason: impl Into<String>) -> bool {
        let error = ScriptError::LoadFailed(reason.into());
        self.route(id, move |control| control.failed(error))
    }

    fn route(&self, id: ScriptId, deliver: impl FnOnce(&dyn ScriptControl)) -> bool {
        let control = self.state.borrow().by_id.get(&id).cloned();
        let Some(control) = control else {
            log::trace!(target: "script_loader", "{id}: report for unknown script");
            return false;
        };
        deliver(&*control);
        if control.is_retired() {
            self.state.borrow_mut().by_id.remove(&id);
        }
        true
    }
}

/// Drops a removed script from the loader's maps. An in-flight script stays
/// routable by id so its late outcome can still be delivered.
pub(crate) fn forget(
    state: &Weak<RefCell<LoaderState>>,
    id: ScriptId,
    key: &str,
    in_flight: bool,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.borrow_mut();
    if state.by_key.get(key).is_some_and(|r| r.id == id) {
        state.by_key.remove(key);
    }
    if !in_flight {
        state.by_id.remove(&id);
    }
}
