//! Event publishing/subscription registry.
//!
//! `DispatchBus` maps an event *kind* to an ordered list of handlers and
//! delivers every published message to the handlers registered for its kind.
//!
//! ## Delivery Semantics
//!
//! - **Synchronous**: `publish()` runs every handler on the caller's task before
//!   returning. There is no queue, batching or reordering.
//! - **Registration order**: handlers for one kind fire in the order they
//!   subscribed.
//! - **Isolated failures**: a handler returning `Err` or panicking is logged and
//!   skipped; the remaining handlers still receive the message.
//! - **No replay**: a handler only sees messages published after it
//!   subscribed. Nothing is persisted.
//!
//! Handlers are invoked on a snapshot of the registry taken at publish time, so
//! a handler may subscribe or unsubscribe (including itself) without
//! deadlocking; such changes take effect from the next publish.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::subscription::Subscription;

/// A message that knows which kind it belongs to.
pub trait Routable {
    type Kind: Copy + Eq + Hash + core::fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

type Handler<M> = Arc<dyn Fn(&M) -> anyhow::Result<()> + Send + Sync>;

struct Registry<M: Routable> {
    handlers: RwLock<HashMap<M::Kind, Vec<(u64, Handler<M>)>>>,
    next_id: AtomicU64,
}

impl<M: Routable> Registry<M> {
    fn remove(&self, kind: M::Kind, id: u64) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(&kind) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(&kind);
            }
        }
    }
}

/// Outcome of a single `publish()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned `Err` or panicked.
    pub failed: usize,
}

/// In-process pub/sub bus keyed by message kind.
///
/// Cheap to clone; clones share one registry.
pub struct DispatchBus<M: Routable> {
    registry: Arc<Registry<M>>,
}

impl<M: Routable> Clone for DispatchBus<M> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<M: Routable> Default for DispatchBus<M> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                handlers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl<M: Routable> core::fmt::Debug for DispatchBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let handlers = self
            .registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DispatchBus")
            .field("kinds", &handlers.len())
            .finish()
    }
}

impl<M> DispatchBus<M>
where
    M: Routable + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages of `kind`.
    ///
    /// The returned [`Subscription`] removes exactly this handler when
    /// dropped or unsubscribed.
    pub fn subscribe<F>(&self, kind: M::Kind, handler: F) -> Subscription
    where
        F: Fn(&M) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut handlers = self
                .registry
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            handlers.entry(kind).or_default().push((id, Arc::new(handler)));
        }
        tracing::debug!(kind = ?kind, handler_id = id, "handler subscribed");

        let registry: Weak<Registry<M>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(kind, id);
                tracing::debug!(kind = ?kind, handler_id = id, "handler unsubscribed");
            }
        })
    }

    /// Deliver `message` to every handler currently registered for its kind.
    pub fn publish(&self, message: &M) -> Delivery {
        let kind = message.kind();
        let snapshot: Vec<(u64, Handler<M>)> = {
            let handlers = self
                .registry
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match handlers.get(&kind) {
                Some(list) => list.clone(),
                None => return Delivery::default(),
            }
        };

        let mut delivery = Delivery::default();
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(err)) => {
                    delivery.failed += 1;
                    tracing::error!(kind = ?kind, handler_id = id, error = %format!("{err:#}"), "event handler failed");
                }
                Err(_) => {
                    delivery.failed += 1;
                    tracing::error!(kind = ?kind, handler_id = id, "event handler panicked");
                }
            }
        }
        delivery
    }

    /// Whether at least one handler is registered for `kind`.
    pub fn has_subscribers(&self, kind: M::Kind) -> bool {
        self.subscriber_count(kind) > 0
    }

    pub fn subscriber_count(&self, kind: M::Kind) -> usize {
        self.registry
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        Ping,
        Pong,
    }

    #[derive(Debug, Clone)]
    struct Msg {
        kind: Kind,
        n: u32,
    }

    impl Routable for Msg {
        type Kind = Kind;

        fn kind(&self) -> Kind {
            self.kind
        }
    }

    fn ping(n: u32) -> Msg {
        Msg { kind: Kind::Ping, n }
    }

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = DispatchBus::<Msg>::new();
        let log = recorder();

        let subs: Vec<Subscription> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let log = log.clone();
                bus.subscribe(Kind::Ping, move |m: &Msg| {
                    log.lock().unwrap().push(format!("{name}{}", m.n));
                    Ok(())
                })
            })
            .collect();

        let delivery = bus.publish(&ping(1));
        assert_eq!(delivery, Delivery { delivered: 3, failed: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["a1", "b1", "c1"]);
        drop(subs);
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_block_later_ones() {
        let bus = DispatchBus::<Msg>::new();
        let log = recorder();

        let _err = bus.subscribe(Kind::Ping, |_| anyhow::bail!("boom"));
        let _panic = bus.subscribe(Kind::Ping, |_| panic!("handler bug"));
        let log2 = log.clone();
        let _ok = bus.subscribe(Kind::Ping, move |m| {
            log2.lock().unwrap().push(format!("ok{}", m.n));
            Ok(())
        });

        let delivery = bus.publish(&ping(7));
        assert_eq!(delivery, Delivery { delivered: 1, failed: 2 });
        assert_eq!(*log.lock().unwrap(), vec!["ok7"]);

        // The bus stays usable after a panic.
        let delivery = bus.publish(&ping(8));
        assert_eq!(delivery.delivered, 1);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_handler() {
        let bus = DispatchBus::<Msg>::new();
        let log = recorder();

        let l1 = log.clone();
        let first = bus.subscribe(Kind::Ping, move |_| {
            l1.lock().unwrap().push("first".into());
            Ok(())
        });
        let l2 = log.clone();
        let _second = bus.subscribe(Kind::Ping, move |_| {
            l2.lock().unwrap().push("second".into());
            Ok(())
        });

        first.unsubscribe();
        bus.publish(&ping(1));

        assert_eq!(*log.lock().unwrap(), vec!["second"]);
        assert_eq!(bus.subscriber_count(Kind::Ping), 1);
    }

    #[test]
    fn dropping_the_handle_unsubscribes() {
        let bus = DispatchBus::<Msg>::new();
        {
            let _sub = bus.subscribe(Kind::Ping, |_| Ok(()));
            assert!(bus.has_subscribers(Kind::Ping));
        }
        assert!(!bus.has_subscribers(Kind::Ping));
        assert_eq!(bus.publish(&ping(1)), Delivery::default());
    }

    #[test]
    fn late_subscriber_sees_no_earlier_messages() {
        let bus = DispatchBus::<Msg>::new();
        bus.publish(&ping(1));

        let log = recorder();
        let l = log.clone();
        let _sub = bus.subscribe(Kind::Ping, move |m| {
            l.lock().unwrap().push(m.n.to_string());
            Ok(())
        });
        bus.publish(&ping(2));

        assert_eq!(*log.lock().unwrap(), vec!["2"]);
    }

    #[test]
    fn kinds_are_routed_independently() {
        let bus = DispatchBus::<Msg>::new();
        let log = recorder();
        let l = log.clone();
        let _sub = bus.subscribe(Kind::Pong, move |m| {
            l.lock().unwrap().push(m.n.to_string());
            Ok(())
        });

        bus.publish(&ping(1));
        bus.publish(&Msg { kind: Kind::Pong, n: 2 });

        assert_eq!(*log.lock().unwrap(), vec!["2"]);
    }

    #[test]
    fn handler_may_subscribe_during_publish() {
        let bus = DispatchBus::<Msg>::new();
        let spawned: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let store = spawned.clone();
        let _sub = bus.subscribe(Kind::Ping, move |_| {
            let sub = inner_bus.subscribe(Kind::Ping, |_| Ok(()));
            store.lock().unwrap().push(sub);
            Ok(())
        });

        // The handler added during this publish is not invoked until the next one.
        assert_eq!(bus.publish(&ping(1)).delivered, 1);
        assert_eq!(bus.subscriber_count(Kind::Ping), 2);
    }

    #[test]
    fn subscription_outliving_the_bus_is_harmless() {
        let bus = DispatchBus::<Msg>::new();
        let sub = bus.subscribe(Kind::Ping, |_| Ok(()));
        drop(bus);
        sub.unsubscribe();
    }
}
