//! Background refresh worker: periodic and on-demand full reloads.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Periodic reload of one page's data.
///
/// The job runs every `period` (first run after `offset + period`, so
/// workers sharing a period can be staggered) and whenever a reload is
/// requested through a [`ReloadTrigger`]. A failing job is logged and retried
/// on the next tick; it never stops the worker.
#[derive(Debug, Clone)]
pub struct RefreshWorker {
    name: &'static str,
    period: Duration,
    offset: Duration,
    trigger: Option<ReloadTrigger>,
}

impl RefreshWorker {
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            offset: Duration::ZERO,
            trigger: None,
        }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    /// Listen on a trigger handed out before the worker starts. Requests
    /// made in the meantime run as soon as it does.
    pub fn with_trigger(mut self, trigger: ReloadTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn start<F, Fut>(self, job: F) -> WorkerHandle
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let trigger = self.trigger.clone().unwrap_or_default();
        let reload = trigger.notify.clone();
        let name = self.name;

        let task = {
            let shutdown = shutdown.clone();
            let reload = reload.clone();
            tokio::spawn(async move {
                tracing::debug!(worker = name, "refresh worker started");

                let mut ticker = tokio::time::interval_at(Instant::now() + self.offset + self.period, self.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    let reason = tokio::select! {
                        _ = shutdown.notified() => break,
                        _ = reload.notified() => "requested",
                        _ = ticker.tick() => "scheduled",
                    };
                    if let Err(err) = job().await {
                        tracing::warn!(worker = name, reason, error = %format!("{err:#}"), "refresh failed");
                    }
                }

                tracing::debug!(worker = name, "refresh worker stopped");
            })
        };

        WorkerHandle {
            name,
            trigger,
            shutdown,
            task,
        }
    }
}

/// Requests an immediate reload from a running worker.
///
/// Requests made while a reload is running coalesce into one follow-up run.
#[derive(Debug, Clone, Default)]
pub struct ReloadTrigger {
    notify: Arc<Notify>,
}

impl ReloadTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.notify.notify_one();
    }
}

#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    trigger: ReloadTrigger,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn trigger(&self) -> ReloadTrigger {
        self.trigger.clone()
    }

    pub fn request_reload(&self) {
        self.trigger.request();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the worker to stop after its current run.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, impl Fn() -> std::future::Ready<anyhow::Result<()>> + Send + 'static) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let job = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(()))
        };
        (runs, job)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_on_period_after_offset() {
        let (runs, job) = counting();
        let handle = RefreshWorker::every("alerts", Duration::from_secs(60))
            .with_offset(Duration::from_secs(10))
            .start(job);

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn reload_request_runs_immediately() {
        let (runs, job) = counting();
        let handle = RefreshWorker::every("detail", Duration::from_secs(3600)).start(job);

        handle.request_reload();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // The schedule is unaffected by the extra run.
        tokio::time::sleep(Duration::from_secs(3590)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn early_requests_run_once_started() {
        let (runs, job) = counting();
        let trigger = ReloadTrigger::new();
        trigger.request();
        trigger.request();

        let handle = RefreshWorker::every("products", Duration::from_secs(30))
            .with_trigger(trigger)
            .start(job);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_worker() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = RefreshWorker::every("products", Duration::from_secs(30)).start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("backend down") }
        });

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(!handle.is_finished());
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_task() {
        let (runs, job) = counting();
        let handle = RefreshWorker::every("products", Duration::from_secs(30)).start(job);

        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }
}
