//! Declarative third-party script loading on top of a [`head::Head`].
//!
//! A declared script owns one head entry. The entry stays empty until the
//! script's trigger fires, then carries the `<script>` tag; the host reports
//! the element's load or error back by [`core_types::ScriptId`].

mod error;
mod instance;
mod loader;
mod observers;
mod trigger;

pub use error::ScriptError;
pub use instance::{
    CallOutcome, CallReceipt, LoadFuture, LoadResult, Proxy, ProxyMethod, ScriptInstance,
    ScriptStatus,
};
pub use loader::{LoaderOptions, ScriptDescriptor, ScriptLoader, ScriptOptions};
pub use observers::Disposer;
pub use trigger::{Trigger, TriggerSignal};
