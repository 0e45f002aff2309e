// Collaborator traits for tag lists, series values and persisted settings
use crate::domain::coverage::TagCoverage;
use crate::domain::settings::{SiteSettings, TagSettings};
use crate::domain::tag::TagRecord;
use crate::domain::telemetry::{TimeSeriesPoint, TimeWindow};
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait TagSource: Send + Sync {
    /// List all known tags. `refresh` bypasses any cache.
    async fn list_tags(&self, refresh: bool) -> anyhow::Result<Vec<TagRecord>>;

    /// Drop cached tag lists
    async fn clear_cache(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Readings of one tag inside `window`, in any order
    async fn fetch_series(&self, tag: &str, window: TimeWindow) -> anyhow::Result<Vec<TimeSeriesPoint>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_site_settings(&self) -> anyhow::Result<SiteSettings>;

    async fn save_site_settings(&self, settings: &SiteSettings) -> anyhow::Result<()>;

    /// Load, apply `change` and save as one step; returns the saved settings
    async fn update_site_settings(
        &self,
        change: Box<dyn for<'a> FnOnce(&'a mut SiteSettings) + Send>,
    ) -> anyhow::Result<SiteSettings>;

    async fn load_tag_settings(&self) -> anyhow::Result<TagSettings>;

    async fn save_tag_settings(&self, settings: &TagSettings) -> anyhow::Result<()>;
}

/// Fetched readings and the ranges they cover, kept across restarts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub raw: HashMap<String, Vec<TimeSeriesPoint>>,
    pub coverage: TagCoverage,
}

#[async_trait]
pub trait SessionCache: Send + Sync {
    /// `Ok(None)` when nothing was saved yet
    async fn load(&self) -> anyhow::Result<Option<SessionSnapshot>>;

    async fn save(&self, raw: &HashMap<String, Vec<TimeSeriesPoint>>, coverage: &TagCoverage) -> anyhow::Result<()>;

    async fn clear(&self) -> anyhow::Result<()>;
}
