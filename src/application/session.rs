// Dashboard session - Per page view state and the fetch/merge pipeline
use crate::application::sources::{SeriesSource, SessionCache, SessionSnapshot, TagSource};
use crate::application::tree_view::{render_nodes, TreeView};
use crate::domain::coverage::{Interval, TagCoverage};
use crate::domain::expansion::ExpansionState;
use crate::domain::forward_fill::forward_fill_all;
use crate::domain::grouping::{group_tags, GroupingDepth, SortOrder, TagTree};
use crate::domain::header::{project_header, MultiLevelHeader};
use crate::domain::selection::SelectionSet;
use crate::domain::settings::{SiteSettings, TagSettings};
use crate::domain::table::{merge_series, MergedTable};
use crate::domain::tag::TagRecord;
use crate::domain::telemetry::{is_live_window, Series, TimeSeriesPoint, TimeWindow};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no tags selected")]
    NoTagsSelected,
    #[error("invalid time window {start_ms}..{end_ms}")]
    InvalidWindow { start_ms: i64, end_ms: i64 },
    #[error("tag list unavailable: {0:#}")]
    TagSource(anyhow::Error),
    #[error("series fetch failed for every requested tag ({})", .failed.join(", "))]
    FetchFailed { failed: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub new_data: bool,
    pub requests: usize,
    pub fetched_points: usize,
    pub failed_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkingTable {
    pub header: MultiLevelHeader,
    #[serde(skip)]
    pub table: MergedTable,
}

struct FetchRequest {
    tag: String,
    range: Interval,
}

pub struct DashboardSession {
    tag_source: Arc<dyn TagSource>,
    series_source: Arc<dyn SeriesSource>,
    cache: Option<Arc<dyn SessionCache>>,
    max_concurrent_fetches: usize,

    all_tags: Vec<TagRecord>,
    filter: String,
    grouping: GroupingDepth,
    sort_order: SortOrder,
    selection: SelectionSet,
    expansion: ExpansionState,

    raw: HashMap<String, Vec<TimeSeriesPoint>>,
    coverage: TagCoverage,
    window: Option<TimeWindow>,
}

impl DashboardSession {
    pub fn new(
        tag_source: Arc<dyn TagSource>,
        series_source: Arc<dyn SeriesSource>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            tag_source,
            series_source,
            cache: None,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
            all_tags: Vec::new(),
            filter: String::new(),
            grouping: GroupingDepth::default(),
            sort_order: SortOrder::default(),
            selection: SelectionSet::new(),
            expansion: ExpansionState::new(),
            raw: HashMap::new(),
            coverage: TagCoverage::default(),
            window: None,
        }
    }

    /// Persist fetched data to `cache` whenever a fetch brings new data
    pub fn with_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Load previously fetched readings and coverage. Coverage is only kept
    /// for tags whose readings were restored.
    pub async fn restore_cache(&mut self) -> anyhow::Result<bool> {
        let Some(cache) = self.cache.clone() else {
            return Ok(false);
        };
        let Some(SessionSnapshot { raw, mut coverage }) = cache.load().await? else {
            return Ok(false);
        };
        let orphaned: Vec<String> = coverage
            .tags()
            .filter(|t| !raw.contains_key(*t))
            .map(str::to_string)
            .collect();
        for tag in orphaned {
            coverage.remove(&tag);
        }
        tracing::info!("Restored cached readings for {} tags", raw.len());
        self.raw = raw;
        self.coverage = coverage;
        Ok(true)
    }

    async fn persist_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(&self.raw, &self.coverage).await {
                tracing::warn!("Failed to persist fetched data: {:#}", e);
            }
        }
    }

    // ---- tag list & tree ----

    /// Replace the tag list. On failure the previous list is kept.
    pub async fn load_tags(&mut self, refresh: bool) -> Result<usize, SessionError> {
        let tags = self
            .tag_source
            .list_tags(refresh)
            .await
            .map_err(SessionError::TagSource)?;
        tracing::info!("Loaded {} tags (refresh={})", tags.len(), refresh);
        self.all_tags = tags;
        Ok(self.all_tags.len())
    }

    pub fn tags(&self) -> &[TagRecord] {
        &self.all_tags
    }

    pub fn displayed_tags(&self) -> Vec<&TagRecord> {
        let filter = self.filter.trim();
        self.all_tags
            .iter()
            .filter(|t| filter.is_empty() || t.matches_filter(filter))
            .collect()
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.expansion.apply_filter_text(filter);
        self.filter = filter.trim().to_string();
    }

    pub fn set_view(&mut self, grouping: Option<GroupingDepth>, sort_order: Option<SortOrder>) {
        if let Some(grouping) = grouping {
            self.grouping = grouping;
        }
        if let Some(sort_order) = sort_order {
            self.sort_order = sort_order;
        }
    }

    pub fn apply_site_settings(&mut self, settings: &SiteSettings) {
        self.set_view(Some(settings.grouping_mode), Some(settings.sort_order));
    }

    pub fn tree(&self) -> TagTree {
        let tags: Vec<&str> = self.displayed_tags().iter().map(|t| t.tag.as_str()).collect();
        group_tags(&tags, self.grouping, self.sort_order)
    }

    pub fn tree_view(&self) -> TreeView {
        let displayed = self.displayed_tags().len();
        TreeView {
            grouping_mode: self.grouping,
            sort_order: self.sort_order,
            filter: self.filter.clone(),
            nodes: render_nodes(&self.tree(), &self.expansion, &self.selection),
            selected: self.selection.len(),
            displayed,
        }
    }

    pub fn toggle_group(&mut self, path: &str) -> bool {
        self.expansion.toggle(path)
    }

    #[cfg(test)]
    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    // ---- selection ----

    pub fn toggle_tag(&mut self, tag: &str) -> bool {
        self.selection.toggle(tag)
    }

    pub fn select_displayed(&mut self) {
        let tags: Vec<String> = self.displayed_tags().iter().map(|t| t.tag.clone()).collect();
        self.selection.extend(tags.iter().map(String::as_str));
    }

    pub fn deselect_displayed(&mut self) {
        let tags: Vec<String> = self.displayed_tags().iter().map(|t| t.tag.clone()).collect();
        self.selection.remove_all(tags.iter().map(String::as_str));
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    // ---- fetch pipeline ----

    /// Manual fetch: request the uncovered parts of `window` for every
    /// selected tag, then make `window` the display window.
    pub async fn fetch(&mut self, window: TimeWindow) -> Result<FetchOutcome, SessionError> {
        if !window.is_valid() {
            return Err(SessionError::InvalidWindow {
                start_ms: window.start_ms,
                end_ms: window.end_ms,
            });
        }
        if self.selection.is_empty() {
            return Err(SessionError::NoTagsSelected);
        }

        let requests = self.plan_requests(window);
        tracing::info!(
            "Fetching {} ranges for {} tags ({}..{})",
            requests.len(),
            self.selection.len(),
            window.start_secs(),
            window.end_secs()
        );
        let results = self.run_requests(requests).await;
        let outcome = self.apply_results(results)?;
        self.window = Some(window);
        if outcome.new_data {
            self.persist_cache().await;
        }
        Ok(outcome)
    }

    /// Auto-refresh fetch of `[display end, now]`. The display window only
    /// grows when new data arrived.
    pub async fn refresh_until(&mut self, now_ms: i64) -> Result<FetchOutcome, SessionError> {
        let Some(current) = self.window else {
            return Ok(FetchOutcome::default());
        };
        if current.end_ms >= now_ms {
            tracing::debug!("Auto-refresh: no new range to fetch");
            return Ok(FetchOutcome::default());
        }
        if self.selection.is_empty() {
            return Err(SessionError::NoTagsSelected);
        }

        let tail = TimeWindow::new(current.end_ms, now_ms);
        let requests = self.plan_requests(tail);
        let results = self.run_requests(requests).await;
        let outcome = self.apply_results(results)?;
        if outcome.new_data {
            self.window = Some(TimeWindow::new(current.start_ms, now_ms));
            self.persist_cache().await;
        }
        Ok(outcome)
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    pub fn is_live(&self, now_ms: i64) -> bool {
        self.window.is_some_and(|w| is_live_window(w.end_ms, now_ms))
    }

    fn plan_requests(&self, window: TimeWindow) -> Vec<FetchRequest> {
        self.selection
            .iter()
            .flat_map(|tag| {
                self.coverage
                    .missing(tag, window.start_secs(), window.end_secs())
                    .into_iter()
                    .map(move |range| FetchRequest {
                        tag: tag.to_string(),
                        range,
                    })
            })
            .collect()
    }

    async fn run_requests(
        &self,
        requests: Vec<FetchRequest>,
    ) -> Vec<(FetchRequest, anyhow::Result<Vec<TimeSeriesPoint>>)> {
        let source = self.series_source.clone();
        stream::iter(requests)
            .map(|request| {
                let source = source.clone();
                async move {
                    let window = TimeWindow::from_unix_seconds(request.range.0, request.range.1);
                    let result = source.fetch_series(&request.tag, window).await;
                    (request, result)
                }
            })
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await
    }

    // State is only touched here, after the whole batch completed.
    fn apply_results(
        &mut self,
        results: Vec<(FetchRequest, anyhow::Result<Vec<TimeSeriesPoint>>)>,
    ) -> Result<FetchOutcome, SessionError> {
        let mut outcome = FetchOutcome {
            requests: results.len(),
            ..FetchOutcome::default()
        };

        let mut succeeded = Vec::new();
        for (request, result) in results {
            match result {
                Ok(points) => succeeded.push((request, points)),
                Err(e) => {
                    tracing::error!(
                        "Series fetch failed for {} {}-{}: {:#}",
                        request.tag,
                        request.range.0,
                        request.range.1,
                        e
                    );
                    if !outcome.failed_tags.contains(&request.tag) {
                        outcome.failed_tags.push(request.tag);
                    }
                }
            }
        }

        if outcome.requests > 0 && succeeded.is_empty() {
            return Err(SessionError::FetchFailed {
                failed: outcome.failed_tags,
            });
        }

        // Tags dropped from the selection lose their data
        let stale: Vec<String> = self
            .raw
            .keys()
            .map(String::as_str)
            .chain(self.coverage.tags())
            .filter(|t| !self.selection.contains(t))
            .map(str::to_string)
            .collect();
        for tag in stale {
            if self.raw.remove(&tag).is_some() {
                outcome.new_data = true;
            }
            self.coverage.remove(&tag);
        }

        for (request, points) in succeeded {
            outcome.fetched_points += points.len();
            let existing = self.raw.entry(request.tag.clone()).or_default();
            if merge_points(existing, points) {
                outcome.new_data = true;
            }
            self.coverage.record(&request.tag, request.range);
        }

        Ok(outcome)
    }

    // ---- working table ----

    /// Selected series after tag settings, offset shift and optional
    /// forward-fill, merged over the shifted display window and narrowed to
    /// `view` when given.
    pub fn working_table(
        &self,
        site: &SiteSettings,
        tag_settings: &TagSettings,
        view: Option<TimeWindow>,
    ) -> WorkingTable {
        let offset_ms = site.offset_ms();
        let mut series: Vec<Series> = self
            .selection
            .iter()
            .map(|tag| {
                let points = self
                    .raw
                    .get(tag)
                    .map(|points| {
                        points
                            .iter()
                            .map(|p| {
                                TimeSeriesPoint::new(
                                    p.time_ms.saturating_add(offset_ms),
                                    tag_settings.apply(tag, p.value),
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Series::new(tag, points)
            })
            .collect();

        if site.forward_fill || tag_settings.global_forward_fill {
            series = forward_fill_all(&series);
        }

        let mut table = merge_series(&series, self.window.map(|w| w.shifted(offset_ms)));
        if let Some(view) = view {
            table = table.within(view);
        }
        WorkingTable {
            header: project_header(&table.columns),
            table,
        }
    }

    /// Forget fetched data, selection and expansion; keep the tag list.
    pub fn reset(&mut self) {
        self.selection.clear();
        self.expansion.clear();
        self.filter.clear();
        self.raw.clear();
        self.coverage.clear();
        self.window = None;
    }

    /// `reset` plus dropping the tag list and every persisted cache
    pub async fn clear_cache(&mut self) -> anyhow::Result<()> {
        self.reset();
        self.all_tags.clear();
        self.tag_source.clear_cache().await?;
        if let Some(cache) = &self.cache {
            cache.clear().await?;
        }
        Ok(())
    }
}

/// Merge `incoming` into a time-sorted point list. A non-empty incoming
/// reading replaces the stored one. Returns true if anything changed.
fn merge_points(existing: &mut Vec<TimeSeriesPoint>, incoming: Vec<TimeSeriesPoint>) -> bool {
    let mut by_time: BTreeMap<i64, Option<f64>> = existing.iter().map(|p| (p.time_ms, p.value)).collect();
    let mut changed = false;
    for point in incoming {
        match by_time.get_mut(&point.time_ms) {
            Some(slot) => {
                if point.value.is_some() && *slot != point.value {
                    *slot = point.value;
                    changed = true;
                }
            }
            None => {
                by_time.insert(point.time_ms, point.value);
                changed = true;
            }
        }
    }
    if changed {
        *existing = by_time
            .into_iter()
            .map(|(t, v)| TimeSeriesPoint::new(t, v))
            .collect();
    }
    changed
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    pub struct FakeTags {
        pub tags: Mutex<Option<Vec<String>>>,
    }

    #[async_trait]
    impl TagSource for FakeTags {
        async fn list_tags(&self, _refresh: bool) -> anyhow::Result<Vec<TagRecord>> {
            match self.tags.lock().unwrap().as_ref() {
                Some(tags) => Ok(tags.iter().map(TagRecord::new).collect()),
                None => anyhow::bail!("upstream down"),
            }
        }
    }

    /// Serves one reading per minute with value = minute index; fails for tags in `failing`
    pub struct FakeSeries {
        pub calls: Mutex<Vec<(String, i64, i64)>>,
        pub failing: Vec<String>,
    }

    #[async_trait]
    impl SeriesSource for FakeSeries {
        async fn fetch_series(&self, tag: &str, window: TimeWindow) -> anyhow::Result<Vec<TimeSeriesPoint>> {
            self.calls
                .lock()
                .unwrap()
                .push((tag.to_string(), window.start_secs(), window.end_secs()));
            if self.failing.iter().any(|t| t == tag) {
                anyhow::bail!("boom");
            }
            let first = (window.start_ms + 59_999).div_euclid(60_000);
            let last = window.end_ms.div_euclid(60_000);
            Ok((first..=last)
                .map(|m| TimeSeriesPoint::new(m * 60_000, Some(m as f64)))
                .collect())
        }
    }

    pub fn session_with(tags: &[&str], failing: &[&str]) -> (DashboardSession, Arc<FakeSeries>) {
        let tag_source = Arc::new(FakeTags {
            tags: Mutex::new(Some(tags.iter().map(|t| t.to_string()).collect())),
        });
        let series = Arc::new(FakeSeries {
            calls: Mutex::new(Vec::new()),
            failing: failing.iter().map(|t| t.to_string()).collect(),
        });
        (DashboardSession::new(tag_source, series.clone(), 4), series)
    }

    /// In-memory cache that counts saves
    #[derive(Default)]
    pub struct MemoryCache {
        pub snapshot: Mutex<Option<SessionSnapshot>>,
        pub saves: Mutex<usize>,
    }

    #[async_trait]
    impl SessionCache for MemoryCache {
        async fn load(&self) -> anyhow::Result<Option<SessionSnapshot>> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn save(&self, raw: &HashMap<String, Vec<TimeSeriesPoint>>, coverage: &TagCoverage) -> anyhow::Result<()> {
            *self.saves.lock().unwrap() += 1;
            *self.snapshot.lock().unwrap() = Some(SessionSnapshot {
                raw: raw.clone(),
                coverage: coverage.clone(),
            });
            Ok(())
        }

        async fn clear(&self) -> anyhow::Result<()> {
            *self.snapshot.lock().unwrap() = None;
            Ok(())
        }
    }

    fn no_offset() -> SiteSettings {
        SiteSettings {
            data_offset: 0.0,
            ..SiteSettings::default()
        }
    }

    #[tokio::test]
    async fn test_load_tags_failure_keeps_previous_list() {
        let tag_source = Arc::new(FakeTags {
            tags: Mutex::new(Some(vec!["A.B.C".to_string()])),
        });
        let (_, series) = session_with(&[], &[]);
        let mut session = DashboardSession::new(tag_source.clone(), series, 4);
        assert_eq!(session.load_tags(false).await.unwrap(), 1);

        *tag_source.tags.lock().unwrap() = None;
        let err = session.load_tags(true).await.unwrap_err();
        assert!(matches!(err, SessionError::TagSource(_)));
        assert_eq!(session.tags().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_and_select_displayed() {
        let (mut session, _) = session_with(&["Tank1.Level", "Engine1.GenA.Power", "Engine1.GenA.Temp"], &[]);
        session.load_tags(false).await.unwrap();

        session.set_filter("engine");
        assert_eq!(session.displayed_tags().len(), 2);
        session.select_displayed();
        assert_eq!(session.selection().len(), 2);

        session.set_filter("");
        assert_eq!(session.tree_view().summary(), "2/3");
        session.deselect_displayed();
        assert!(session.selection().is_empty());
    }

    #[tokio::test]
    async fn test_expansion_survives_filter_round_trip() {
        let (mut session, _) = session_with(&["Engine1.GenA.Power", "Tank1.Level"], &[]);
        session.load_tags(false).await.unwrap();
        assert!(session.toggle_group("Engine1"));

        session.set_filter("tank");
        assert!(session.expansion().is_expanded("Tank1"));
        session.toggle_group("Engine1");
        session.toggle_group("Tank1");

        session.set_filter("");
        assert!(session.expansion().is_expanded("Engine1"));
        assert!(!session.expansion().is_expanded("Tank1"));
    }

    #[tokio::test]
    async fn test_fetch_requires_selection_and_valid_window() {
        let (mut session, _) = session_with(&["A"], &[]);
        let err = session.fetch(TimeWindow::new(0, 60_000)).await.unwrap_err();
        assert!(matches!(err, SessionError::NoTagsSelected));

        session.toggle_tag("A");
        let err = session.fetch(TimeWindow::new(60_000, 0)).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidWindow { .. }));
    }

    #[tokio::test]
    async fn test_fetch_only_requests_uncovered_ranges() {
        let (mut session, series) = session_with(&["A"], &[]);
        session.toggle_tag("A");

        let outcome = session.fetch(TimeWindow::from_unix_seconds(0, 600)).await.unwrap();
        assert!(outcome.new_data);
        assert_eq!(outcome.fetched_points, 11);

        let outcome = session.fetch(TimeWindow::from_unix_seconds(300, 900)).await.unwrap();
        assert_eq!(outcome.requests, 1);
        assert!(outcome.new_data);

        let outcome = session.fetch(TimeWindow::from_unix_seconds(0, 900)).await.unwrap();
        assert_eq!(outcome.requests, 0);
        assert!(!outcome.new_data);

        let calls = series.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("A".to_string(), 0, 600), ("A".to_string(), 600, 900)]);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_tags() {
        let (mut session, _) = session_with(&["A", "B"], &["B"]);
        session.toggle_tag("A");
        session.toggle_tag("B");

        let outcome = session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        assert_eq!(outcome.failed_tags, vec!["B".to_string()]);

        let working = session.working_table(&no_offset(), &TagSettings::default(), None);
        assert_eq!(working.table.columns, vec!["A", "B"]);
        assert_eq!(working.table.rows.len(), 3);
        assert!(working.table.rows.iter().all(|r| r.values[1].is_none()));
    }

    #[tokio::test]
    async fn test_total_failure_leaves_state_untouched() {
        let (mut session, _) = session_with(&["A", "B"], &["B"]);
        session.toggle_tag("A");
        session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        let before = session.working_table(&no_offset(), &TagSettings::default(), None);

        session.toggle_tag("A");
        session.toggle_tag("B");
        let err = session.fetch(TimeWindow::from_unix_seconds(0, 600)).await.unwrap_err();
        assert!(matches!(err, SessionError::FetchFailed { .. }));
        assert_eq!(session.window(), Some(TimeWindow::from_unix_seconds(0, 120)));

        // Reselecting A shows the data that was there before the failed fetch
        session.toggle_tag("B");
        session.toggle_tag("A");
        let after = session.working_table(&no_offset(), &TagSettings::default(), None);
        assert_eq!(after.table, before.table);
    }

    #[tokio::test]
    async fn test_deselected_tags_are_dropped_on_next_fetch() {
        let (mut session, series) = session_with(&["A", "B"], &[]);
        session.toggle_tag("A");
        session.toggle_tag("B");
        session.fetch(TimeWindow::from_unix_seconds(0, 60)).await.unwrap();

        session.toggle_tag("A");
        let outcome = session.fetch(TimeWindow::from_unix_seconds(0, 60)).await.unwrap();
        assert!(outcome.new_data);
        assert_eq!(outcome.requests, 0);

        // A lost its coverage, so selecting it again refetches
        session.toggle_tag("A");
        session.fetch(TimeWindow::from_unix_seconds(0, 60)).await.unwrap();
        let a_calls = series.calls.lock().unwrap().iter().filter(|c| c.0 == "A").count();
        assert_eq!(a_calls, 2);
    }

    #[tokio::test]
    async fn test_working_table_applies_settings_offset_and_fill() {
        let (mut session, _) = session_with(&["Engine1.GenA.Power"], &[]);
        session.toggle_tag("Engine1.GenA.Power");
        session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();

        let mut tag_settings = TagSettings::default();
        tag_settings.scale_factors.insert("Engine1.GenA.Power".to_string(), 10.0);
        tag_settings.error_value.insert("Engine1.GenA.Power".to_string(), 1.0);

        let site = SiteSettings::default();
        let working = session.working_table(&site, &tag_settings, None);
        assert_eq!(working.table.rows.len(), 3);
        assert_eq!(working.table.rows[0].timestamp, "01/01/1970 01:00:00");
        let values: Vec<Option<f64>> = working.table.rows.iter().map(|r| r.values[0]).collect();
        assert_eq!(values, vec![Some(0.0), None, Some(20.0)]);
        assert_eq!(working.header.groups[0].content, "Engine1");

        let filled = SiteSettings {
            forward_fill: true,
            ..site
        };
        let working = session.working_table(&filled, &tag_settings, None);
        let values: Vec<Option<f64>> = working.table.rows.iter().map(|r| r.values[0]).collect();
        assert_eq!(values, vec![Some(0.0), Some(0.0), Some(20.0)]);

        // Zoomed view in shifted time keeps the last two minutes
        let zoom = TimeWindow::new(3_660_000, 3_720_000);
        let working = session.working_table(&filled, &tag_settings, Some(zoom));
        assert_eq!(working.table.rows.len(), 2);
        assert_eq!(working.table.rows[0].values[0], Some(0.0));
    }

    #[tokio::test]
    async fn test_refresh_until_extends_window() {
        let (mut session, _) = session_with(&["A"], &[]);
        session.toggle_tag("A");
        assert_eq!(session.refresh_until(1_000_000).await.unwrap(), FetchOutcome::default());

        session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        let outcome = session.refresh_until(300_000).await.unwrap();
        assert!(outcome.new_data);
        assert_eq!(session.window(), Some(TimeWindow::new(0, 300_000)));

        let outcome = session.refresh_until(300_000).await.unwrap();
        assert_eq!(outcome.requests, 0);
        assert!(session.is_live(300_000 + 1000));
    }

    #[tokio::test]
    async fn test_huge_offset_does_not_overflow() {
        let (mut session, _) = session_with(&["A"], &[]);
        session.toggle_tag("A");
        session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();

        for data_offset in [1e300, -1e300] {
            let site = SiteSettings {
                data_offset,
                ..SiteSettings::default()
            };
            let working = session.working_table(&site, &TagSettings::default(), None);
            assert_eq!(working.table.columns, vec!["A"]);
        }
    }

    #[tokio::test]
    async fn test_new_data_is_persisted_and_restored() {
        let cache = Arc::new(MemoryCache::default());
        let (session, _) = session_with(&["A", "B"], &[]);
        let mut session = session.with_cache(cache.clone());
        session.toggle_tag("A");

        session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        assert_eq!(*cache.saves.lock().unwrap(), 1);
        // Nothing new, nothing written
        session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        assert_eq!(*cache.saves.lock().unwrap(), 1);

        let (fresh, series) = session_with(&["A", "B"], &[]);
        let mut fresh = fresh.with_cache(cache.clone());
        assert!(fresh.restore_cache().await.unwrap());
        fresh.toggle_tag("A");
        let outcome = fresh.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        assert_eq!(outcome.requests, 0);
        assert!(series.calls.lock().unwrap().is_empty());
        let working = fresh.working_table(&no_offset(), &TagSettings::default(), None);
        assert_eq!(working.table.rows.len(), 3);

        fresh.clear_cache().await.unwrap();
        assert!(cache.snapshot.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_drops_coverage_without_readings() {
        let mut coverage = TagCoverage::default();
        coverage.record("A", (0, 120));
        let cache = Arc::new(MemoryCache {
            snapshot: Mutex::new(Some(SessionSnapshot {
                raw: HashMap::new(),
                coverage,
            })),
            saves: Mutex::new(0),
        });
        let (session, _) = session_with(&["A"], &[]);
        let mut session = session.with_cache(cache);
        assert!(session.restore_cache().await.unwrap());
        session.toggle_tag("A");
        let outcome = session.fetch(TimeWindow::from_unix_seconds(0, 120)).await.unwrap();
        assert_eq!(outcome.requests, 1);
    }

    #[test]
    fn test_merge_points() {
        let mut existing = vec![TimeSeriesPoint::new(100, Some(1.0)), TimeSeriesPoint::new(300, Some(3.0))];
        assert!(merge_points(&mut existing, vec![TimeSeriesPoint::new(200, Some(2.0))]));
        assert_eq!(existing.len(), 3);
        assert_eq!(existing[1].time_ms, 200);

        // Empty readings never overwrite stored values
        assert!(!merge_points(&mut existing, vec![TimeSeriesPoint::new(100, None)]));
        assert!(!merge_points(&mut existing, vec![TimeSeriesPoint::new(300, Some(3.0))]));
        assert!(merge_points(&mut existing, vec![TimeSeriesPoint::new(300, Some(4.0))]));
        assert_eq!(existing[2].value, Some(4.0));
    }
}
