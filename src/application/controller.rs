// Dashboard controller - Serialises manual fetches and the auto-refresh timer
use crate::application::auto_refresh::{AutoRefresh, Tick};
use crate::application::session::{DashboardSession, FetchOutcome, SessionError};
use crate::domain::telemetry::TimeWindow;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResult {
    pub status: &'static str,
    pub new_data: bool,
    pub redraw_needed: bool,
    pub failed_tags: Vec<String>,
}

pub struct DashboardController {
    session: Arc<Mutex<DashboardSession>>,
    auto_refresh: Mutex<AutoRefresh>,
}

impl DashboardController {
    pub fn new(session: DashboardSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            auto_refresh: Mutex::new(AutoRefresh::new()),
        }
    }

    pub async fn session(&self) -> MutexGuard<'_, DashboardSession> {
        self.session.lock().await
    }

    /// Manual fetch. Any running auto-refresh is stopped first.
    pub async fn graph(&self, window: TimeWindow) -> Result<GraphResult, SessionError> {
        if self.auto_refresh.lock().await.stop() {
            tracing::info!("Auto-refresh stopped by manual fetch");
        }

        let mut session = self.session.lock().await;
        let previous = session.window();
        let outcome = session.fetch(window).await?;
        Ok(GraphResult {
            status: "success",
            new_data: outcome.new_data,
            redraw_needed: outcome.new_data || previous != Some(window),
            failed_tags: outcome.failed_tags,
        })
    }

    /// Start polling every `period`. Returns false when the display window is
    /// not live, in which case nothing is started.
    pub async fn start_auto_refresh(&self, period: Duration) -> bool {
        if !self.session.lock().await.is_live(now_ms()) {
            tracing::info!("Auto-refresh not started: display window is not live");
            return false;
        }

        let session = self.session.clone();
        self.auto_refresh.lock().await.start(period, move || {
            let session = session.clone();
            async move { refresh_tick(&session).await }
        });
        tracing::info!("Auto-refresh started every {:?}", period);
        true
    }

    pub async fn stop_auto_refresh(&self) -> bool {
        self.auto_refresh.lock().await.stop()
    }

    pub async fn auto_refresh_running(&self) -> bool {
        self.auto_refresh.lock().await.is_running()
    }

    /// Stop the timer and forget all session state
    pub async fn dispose(&self) {
        self.stop_auto_refresh().await;
        self.session.lock().await.reset();
    }

    /// `dispose` plus dropping every cached tag list
    pub async fn clear_cache(&self) -> anyhow::Result<()> {
        self.stop_auto_refresh().await;
        self.session.lock().await.clear_cache().await
    }
}

async fn refresh_tick(session: &Mutex<DashboardSession>) -> Tick {
    let now = now_ms();
    let mut session = session.lock().await;
    if !session.is_live(now) {
        tracing::info!("Display window left the live range");
        return Tick::Stop;
    }
    match session.refresh_until(now).await {
        Ok(FetchOutcome { new_data: true, fetched_points, .. }) => {
            tracing::debug!("Auto-refresh fetched {} points", fetched_points);
            Tick::Continue
        }
        Ok(_) => Tick::Continue,
        Err(SessionError::NoTagsSelected) => Tick::Stop,
        Err(e) => {
            tracing::warn!("Auto-refresh fetch failed: {}", e);
            Tick::Continue
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
