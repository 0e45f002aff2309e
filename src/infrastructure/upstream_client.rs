// Upstream tag/value API client with a cached tag list
use crate::application::sources::{SeriesSource, TagSource};
use crate::domain::tag::TagRecord;
use crate::domain::telemetry::{TimeSeriesPoint, TimeWindow};
use crate::infrastructure::atomic_file::{remove_if_exists, write_atomic};
use crate::infrastructure::config::{prepare_query, UpstreamSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
    taglist_url: String,
    values_url: String,
    cache_path: PathBuf,
    cached_tags: Mutex<Option<Vec<TagRecord>>>,
}

#[derive(Debug, Deserialize)]
struct ValueRecord {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Value", default)]
    value: serde_json::Value,
}

impl UpstreamClient {
    pub fn new(settings: &UpstreamSettings, cache_path: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            taglist_url: settings.taglist_url.clone(),
            values_url: settings.values_url.clone(),
            cache_path,
            cached_tags: Mutex::new(None),
        })
    }

    fn build_values_url(&self, tag: &str, window: TimeWindow) -> String {
        let mut vars = HashMap::new();
        vars.insert("tag".to_string(), urlencoding::encode(tag).into_owned());
        vars.insert("start".to_string(), window.start_secs().to_string());
        vars.insert("end".to_string(), window.end_secs().to_string());
        prepare_query(&self.values_url, &vars)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Upstream request failed with status {}: {}", status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn read_cache_file(&self) -> Result<Vec<TagRecord>> {
        let raw = tokio::fs::read(&self.cache_path)
            .await
            .with_context(|| format!("Failed to read {}", self.cache_path.display()))?;
        serde_json::from_slice(&raw).context("Tag list cache is not valid JSON")
    }

    async fn write_cache_file(&self, tags: &[TagRecord]) -> Result<()> {
        write_atomic(&self.cache_path, serde_json::to_vec(tags)?).await
    }
}

#[async_trait]
impl TagSource for UpstreamClient {
    async fn list_tags(&self, refresh: bool) -> Result<Vec<TagRecord>> {
        let mut cached = self.cached_tags.lock().await;

        if !refresh {
            if let Some(tags) = cached.as_ref() {
                return Ok(tags.clone());
            }
            match self.read_cache_file().await {
                Ok(tags) => {
                    tracing::info!("Loaded tag list from cache: {}", self.cache_path.display());
                    *cached = Some(tags.clone());
                    return Ok(tags);
                }
                Err(e) => tracing::debug!("No usable tag list cache: {:#}", e),
            }
        }

        match self.get_json::<Vec<TagRecord>>(&self.taglist_url).await {
            Ok(tags) => {
                if let Err(e) = self.write_cache_file(&tags).await {
                    tracing::warn!("Failed to write tag list cache: {:#}", e);
                }
                tracing::info!("Fetched {} tags from upstream", tags.len());
                *cached = Some(tags.clone());
                Ok(tags)
            }
            Err(e) => {
                tracing::error!("Error fetching tag list: {:#}", e);
                if let Some(tags) = cached.as_ref() {
                    tracing::warn!("Serving last cached tag list");
                    return Ok(tags.clone());
                }
                let tags = self.read_cache_file().await.map_err(|_| e)?;
                tracing::warn!("Serving tag list from cache file");
                *cached = Some(tags.clone());
                Ok(tags)
            }
        }
    }

    async fn clear_cache(&self) -> Result<()> {
        *self.cached_tags.lock().await = None;
        remove_if_exists(&self.cache_path).await?;
        tracing::info!("Cleared tag list cache");
        Ok(())
    }
}

#[async_trait]
impl SeriesSource for UpstreamClient {
    async fn fetch_series(&self, tag: &str, window: TimeWindow) -> Result<Vec<TimeSeriesPoint>> {
        let url = self.build_values_url(tag, window);
        tracing::debug!("Fetching values: {}", url);
        let records: Vec<ValueRecord> = self.get_json(&url).await?;

        let mut skipped = 0usize;
        let points: Vec<TimeSeriesPoint> = records
            .iter()
            .filter_map(|r| match parse_upstream_date(&r.date) {
                Some(time_ms) => Some(TimeSeriesPoint::new(time_ms, parse_upstream_value(&r.value))),
                None => {
                    skipped += 1;
                    None
                }
            })
            .collect();

        if skipped > 0 {
            tracing::warn!("Skipped {} records with unparseable dates for {}", skipped, tag);
        }
        Ok(points)
    }
}

/// RFC 3339, naive ISO 8601 (taken as UTC) or `dd:mm:YYYY:HH:MM:SS`
pub fn parse_upstream_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%d:%m:%Y:%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Numbers and numeric strings; everything else is an empty reading
pub fn parse_upstream_value(raw: &serde_json::Value) -> Option<f64> {
    let value = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::String(s) => match s.trim() {
            "" | "None" | "null" => None,
            s => s.parse::<f64>().ok(),
        },
        _ => None,
    };
    value.filter(|v| v.is_finite())
}
