//! When a declared script starts loading.
//!
//! `Client`, `Manual` and `Server` are handled by the loader directly. Every
//! deferred trigger is adapted into one single-shot readiness future that
//! resolves to `true` when loading should begin and `false` when it never
//! will (the signal was dropped unfired).

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use std::future::Future;

pub enum Trigger {
    /// Load once the document is hydrated, immediately if it already is.
    Client,
    /// Load only on an explicit `load()`.
    Manual,
    /// Render the tag into server output and never transition on the client.
    Server,
    /// Load when the readiness future resolves to `true`.
    Deferred(LocalBoxFuture<'static, bool>),
}

impl Trigger {
    /// Load once `ready` completes.
    pub fn when(ready: impl Future<Output = ()> + 'static) -> Self {
        Trigger::Deferred(ready.map(|()| true).boxed_local())
    }

    /// Hands `register` a [`TriggerSignal`]; loading begins when it fires.
    pub fn on(register: impl FnOnce(TriggerSignal)) -> Self {
        let (tx, rx) = oneshot::channel();
        register(TriggerSignal(tx));
        Trigger::Deferred(rx.map(|fired| fired.is_ok()).boxed_local())
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Trigger::Server)
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Client => f.write_str("Client"),
            Trigger::Manual => f.write_str("Manual"),
            Trigger::Server => f.write_str("Server"),
            Trigger::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Single-use handle that starts a deferred load.
#[derive(Debug)]
pub struct TriggerSignal(oneshot::Sender<()>);

impl TriggerSignal {
    pub fn fire(self) {
        let _ = self.0.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn readiness(trigger: Trigger) -> LocalBoxFuture<'static, bool> {
        match trigger {
            Trigger::Deferred(ready) => ready,
            other => panic!("expected a deferred trigger, got {other:?}"),
        }
    }

    #[test]
    fn fired_signal_is_ready() {
        let mut slot = None;
        let ready = readiness(Trigger::on(|signal| slot = Some(signal)));
        slot.take().unwrap().fire();
        assert!(block_on(ready));
    }

    #[test]
    fn dropped_signal_never_loads() {
        let ready = readiness(Trigger::on(drop));
        assert!(!block_on(ready));
    }

    #[test]
    fn when_wraps_any_future() {
        assert!(block_on(readiness(Trigger::when(async {}))));
    }
}
