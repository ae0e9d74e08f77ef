//! Page lifetime: everything a page registers is released in one place.

use pantry_events::Subscription;

use crate::poller::WorkerHandle;

/// Owns a page's subscriptions, workers and teardown hooks.
///
/// [`PageScope::teardown`] (or dropping the scope) unsubscribes every
/// handler, stops every worker and runs the hooks in reverse registration
/// order.
pub struct PageScope {
    name: &'static str,
    subscriptions: Vec<Subscription>,
    workers: Vec<WorkerHandle>,
    hooks: Vec<Box<dyn FnOnce() + Send>>,
}

impl core::fmt::Debug for PageScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageScope")
            .field("name", &self.name)
            .field("subscriptions", &self.subscriptions.len())
            .field("workers", &self.workers.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl PageScope {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscriptions: Vec::new(),
            workers: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn hold(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn hold_worker(&mut self, worker: WorkerHandle) {
        self.workers.push(worker);
    }

    pub fn on_teardown(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.subscriptions.is_empty() && self.workers.is_empty() && self.hooks.is_empty() {
            return;
        }
        tracing::debug!(
            page = self.name,
            subscriptions = self.subscriptions.len(),
            workers = self.workers.len(),
            "tearing down page"
        );
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        for worker in self.workers.drain(..) {
            worker.shutdown();
        }
        while let Some(hook) = self.hooks.pop() {
            hook();
        }
    }
}

impl Drop for PageScope {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use pantry_events::{DispatchBus, Routable};

    #[derive(Debug)]
    struct Ping;

    impl Routable for Ping {
        type Kind = ();

        fn kind(&self) {}
    }

    #[test]
    fn fresh_scope_holds_nothing() {
        let scope = PageScope::new("analytics");
        assert_eq!(scope.name(), "analytics");
        assert_eq!(scope.subscription_count(), 0);
        // Nothing to release; teardown is a no-op.
        scope.teardown();
    }

    #[test]
    fn teardown_releases_everything() {
        let bus = DispatchBus::<Ping>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut scope = PageScope::new("products");
        scope.hold(bus.subscribe((), |_| Ok(())));
        scope.hold(bus.subscribe((), |_| Ok(())));
        for n in 1..=2 {
            let order = order.clone();
            scope.on_teardown(move || order.lock().unwrap().push(n));
        }
        assert_eq!(bus.subscriber_count(()), 2);

        scope.teardown();
        assert_eq!(bus.subscriber_count(()), 0);
        assert_eq!(*order.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn dropping_the_scope_tears_down() {
        let bus = DispatchBus::<Ping>::new();
        {
            let mut scope = PageScope::new("detail");
            scope.hold(bus.subscribe((), |_| Ok(())));
        }
        assert!(!bus.has_subscribers(()));
    }

    #[tokio::test(start_paused = true)]
    async fn workers_are_stopped() {
        let mut scope = PageScope::new("alerts");
        let worker = crate::poller::RefreshWorker::every("alerts", std::time::Duration::from_secs(1))
            .start(|| async { Ok(()) });
        let trigger = worker.trigger();
        scope.hold_worker(worker);

        scope.teardown();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // The trigger outlives the worker harmlessly.
        trigger.request();
    }
}
