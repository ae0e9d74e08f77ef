//! Dashboard: summary counters, recent activity, alerts and sales trends.

use std::sync::{Arc, Mutex};

use pantry_products::{ActivityEvent, ActivityFeed, LowStockAlert};

use crate::api::{DashboardSummary, SalesTrends, TrendPeriod, TrendSeries};
use crate::poller::{RefreshWorker, ReloadTrigger};
use crate::scope::PageScope;
use crate::state::AppState;
use crate::wire::{EventKind, Message};

use super::{lock, reload_on_reconnect};

#[derive(Debug, Clone)]
pub struct DashboardStore {
    pub summary: DashboardSummary,
    pub activity: ActivityFeed,
    pub alerts: Vec<LowStockAlert>,
    pub trends: SalesTrends,
    pub period: TrendPeriod,
}

impl DashboardStore {
    pub fn new(activity_window: usize) -> Self {
        Self {
            summary: DashboardSummary::default(),
            activity: ActivityFeed::new(activity_window),
            alerts: Vec::new(),
            trends: SalesTrends::new(),
            period: TrendPeriod::Week,
        }
    }

    /// Series for the selected period; empty when the backend sent none.
    pub fn selected_trend(&self) -> TrendSeries {
        self.trends.get(&self.period).cloned().unwrap_or_default()
    }
}

pub struct DashboardPage {
    store: Arc<Mutex<DashboardStore>>,
    reload: ReloadTrigger,
    scope: PageScope,
}

impl core::fmt::Debug for DashboardPage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DashboardPage").field("scope", &self.scope).finish()
    }
}

/// Fetch every section; a failing section keeps its previous contents.
async fn load(state: &AppState, store: &Mutex<DashboardStore>) -> anyhow::Result<()> {
    let api = &state.api;
    let (summary, activity, alerts, trends) = tokio::join!(
        api.dashboard_summary(),
        api.recent_activity(),
        api.dashboard_alerts(),
        api.sales_trends(),
    );

    let mut failed = Vec::new();
    {
        let mut store = lock(store);
        match summary {
            Ok(summary) => store.summary = summary,
            Err(err) => failed.push(("summary", err)),
        }
        match activity {
            Ok(activity) => store.activity.replace(activity),
            Err(err) => failed.push(("activity", err)),
        }
        match alerts {
            Ok(alerts) => store.alerts = alerts,
            Err(err) => failed.push(("alerts", err)),
        }
        match trends {
            Ok(trends) => store.trends = trends,
            Err(err) => failed.push(("trends", err)),
        }
    }

    if failed.is_empty() {
        return Ok(());
    }
    for (section, err) in &failed {
        tracing::warn!(section, error = %err, "dashboard section failed to load");
    }
    state.notifications.error("Failed to load dashboard data");
    anyhow::bail!("{} dashboard section(s) failed", failed.len())
}

impl DashboardPage {
    pub async fn mount(state: &AppState) -> Self {
        let store = Arc::new(Mutex::new(DashboardStore::new(state.config.activity_window)));
        let reload = ReloadTrigger::new();
        let mut scope = PageScope::new("dashboard");

        {
            let store = store.clone();
            scope.hold(state.bus().subscribe(EventKind::ActivityUpdate, move |message| {
                if let Message::ActivityUpdate(event) = message {
                    lock(&store).activity.push(event.clone());
                }
                Ok(())
            }));
        }
        {
            let notifications = state.notifications.clone();
            scope.hold(state.bus().subscribe(EventKind::NewEvent, move |message| {
                if let Message::NewEvent(notice) = message {
                    notifications.info(notice.summary());
                }
                Ok(())
            }));
        }
        {
            // Counters and alerts are server-computed; refetch on any change.
            let reload = reload.clone();
            scope.hold(state.bus().subscribe(EventKind::ProductUpdate, move |_| {
                reload.request();
                Ok(())
            }));
        }
        reload_on_reconnect(state, &mut scope, &[&reload]);
        state.connection.sync_streams();

        if let Err(err) = load(state, &store).await {
            tracing::warn!(error = %format!("{err:#}"), "initial dashboard load failed");
        }
        let job = {
            let state = state.clone();
            let store = store.clone();
            move || {
                let state = state.clone();
                let store = store.clone();
                async move { load(&state, &store).await }
            }
        };
        scope.hold_worker(
            RefreshWorker::every("dashboard", state.config.products_refresh)
                .with_trigger(reload.clone())
                .start(job),
        );

        Self { store, reload, scope }
    }

    pub fn summary(&self) -> DashboardSummary {
        lock(&self.store).summary.clone()
    }

    /// Recent activity, newest first.
    pub fn activity(&self) -> Vec<ActivityEvent> {
        lock(&self.store).activity.to_vec()
    }

    pub fn alerts(&self) -> Vec<LowStockAlert> {
        lock(&self.store).alerts.clone()
    }

    pub fn select_period(&self, period: TrendPeriod) {
        lock(&self.store).period = period;
    }

    pub fn trend(&self) -> TrendSeries {
        lock(&self.store).selected_trend()
    }

    pub fn request_reload(&self) {
        self.reload.request();
    }

    pub fn teardown(self) {
        self.scope.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pantry_events::DispatchBus;
    use pantry_products::{ActivityAction, Product};
    use serde_json::json;

    use crate::connection::ConnectionManager;
    use crate::notifications::ToastKind;
    use crate::testing::FakeApi;
    use crate::transport::MemoryConnector;
    use crate::wire::ResourceNotice;

    fn state(api: FakeApi) -> AppState {
        let connection = ConnectionManager::new(
            Arc::new(MemoryConnector::new()),
            DispatchBus::new(),
            Duration::from_secs(3),
        );
        AppState::new(Arc::new(api), connection, Default::default())
    }

    #[tokio::test(start_paused = true)]
    async fn pushed_activity_is_prepended_and_capped() {
        let state = state(FakeApi::default());
        let page = DashboardPage::mount(&state).await;

        for n in 0..12 {
            let event = ActivityEvent::new(ActivityAction::Update, format!("change {n}"));
            state.bus().publish(&Message::ActivityUpdate(event));
        }
        let activity = page.activity();
        assert_eq!(activity.len(), 10);
        assert_eq!(activity[0].description, "change 11");
        page.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_keeps_other_sections() {
        let api = FakeApi::with_products(vec![Product::new("p1", "Milk", 0.0, 5.0)]);
        api.fail("sales_trends");
        let state = state(api);

        let page = DashboardPage::mount(&state).await;
        assert_eq!(page.summary().total_products, 1);
        assert_eq!(page.alerts().len(), 1);
        assert!(page.trend().labels.is_empty());
        assert!(state.notifications.toasts().iter().any(|t| t.kind == ToastKind::Error));
        page.teardown();
    }

    #[tokio::test(start_paused = true)]
    async fn new_events_raise_info_toasts() {
        let state = state(FakeApi::default());
        let page = DashboardPage::mount(&state).await;

        let notice: ResourceNotice =
            serde_json::from_value(json!({ "type": "create", "resourceType": "product", "data": { "name": "Oats" } }))
                .unwrap();
        state.bus().publish(&Message::NewEvent(notice));

        let toasts = state.notifications.toasts();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Info);
        assert_eq!(toasts[0].message, "product \"Oats\" created");
        page.teardown();
    }
}
