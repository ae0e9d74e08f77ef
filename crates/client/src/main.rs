use std::sync::Arc;

use anyhow::Context;

use pantry_client::views::{AlertsPage, DashboardPage, ProductsPage};
use pantry_client::{
    ApiClient, AppState, ClientConfig, ConnectionManager, EventKind, Message, ServerSnapshot, WebSocketConnector,
};
use pantry_products::format::format_currency;
use pantry_events::DispatchBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pantry_observability::init();

    let config = ClientConfig::from_env().context("reading client configuration")?;
    tracing::info!(api_url = %config.api_url, push_url = %config.push_url, "starting pantry-watch");

    let api = match &config.auth_token {
        Some(token) => ApiClient::with_token(config.api_url.clone(), token.clone()),
        None => ApiClient::new(config.api_url.clone()),
    };
    let connection = ConnectionManager::new(
        Arc::new(WebSocketConnector::new(config.push_url.clone())),
        DispatchBus::new(),
        config.reconnect_delay,
    );
    let state = AppState::new(Arc::new(api), connection, config);

    // Log every push message before any page reacts to it.
    let log: Vec<_> = EventKind::ALL
        .into_iter()
        .map(|kind| {
            state.bus().subscribe(kind, move |message: &Message| {
                tracing::info!(event = %kind, message = ?message, "push message");
                Ok(())
            })
        })
        .collect();

    if let Err(err) = state.connection.connect().await {
        tracing::warn!(error = %err, "push channel unavailable; retrying in the background");
    }

    let products = ProductsPage::mount(&state).await;
    let alerts = AlertsPage::mount(&state).await;
    let dashboard = DashboardPage::mount(&state).await;

    let stats = products.stats();
    tracing::info!(
        products = stats.total_products,
        low_stock = stats.low_stock_count,
        stock_value = %format_currency(stats.total_retail_value),
        alerts = alerts.alerts().len(),
        unread = state.notifications.unread_count(),
        activity = dashboard.activity().len(),
        "pages mounted"
    );

    match ServerSnapshot::fetch(state.api.as_ref()).await {
        Ok(snapshot) => {
            tracing::info!(summary = %snapshot.summary(), "server inventory");
            for drift in snapshot.drift(&stats) {
                tracing::warn!(%drift, "pages disagree with the server");
            }
            for line in snapshot.low_stock_lines() {
                tracing::info!(product = %line, "low stock");
            }
            if let Some(latest) = snapshot.latest_activity(chrono::Utc::now()) {
                tracing::info!(%latest, "latest activity");
            }
        }
        Err(err) => tracing::warn!(error = %err, "server snapshot unavailable"),
    }

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutting down");

    dashboard.teardown();
    alerts.teardown();
    products.teardown();
    drop(log);
    state.connection.disconnect();
    Ok(())
}
