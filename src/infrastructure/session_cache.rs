// Fetched readings as a CSV table and their coverage as JSON, on disk
use crate::application::sources::{SessionCache, SessionSnapshot};
use crate::domain::coverage::TagCoverage;
use crate::domain::table::merge_series;
use crate::domain::telemetry::{Series, TimeSeriesPoint};
use crate::infrastructure::atomic_file::{read_json, remove_if_exists, write_atomic, write_json_atomic};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

const EPOCH_COLUMN: &str = "NumericTimestamp";
const DISPLAY_COLUMN: &str = "Timestamp";

#[derive(Debug, Clone)]
pub struct FileSessionCache {
    raw_path: PathBuf,
    coverage_path: PathBuf,
}

impl FileSessionCache {
    pub fn new(raw_path: PathBuf, coverage_path: PathBuf) -> Self {
        Self { raw_path, coverage_path }
    }
}

/// One row per timestamp: epoch milliseconds, display time, then one column
/// per tag with empty cells for missing readings
fn raw_to_csv(raw: &HashMap<String, Vec<TimeSeriesPoint>>) -> Result<Vec<u8>> {
    let mut tags: Vec<&String> = raw.keys().collect();
    tags.sort();
    let series: Vec<Series> = tags
        .iter()
        .map(|tag| Series::new(tag.as_str(), raw[*tag].clone()))
        .collect();
    let table = merge_series(&series, None);

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    let mut header = vec![EPOCH_COLUMN.to_string(), DISPLAY_COLUMN.to_string()];
    header.extend(table.columns.iter().cloned());
    writer.write_record(&header).context("Failed to write raw table header")?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.values.len() + 2);
        record.push(row.time_ms.to_string());
        record.push(row.timestamp.clone());
        record.extend(row.values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
        writer.write_record(&record).context("Failed to write raw table row")?;
    }
    writer.into_inner().context("Failed to flush raw table")
}

fn raw_from_csv(bytes: &[u8]) -> Result<HashMap<String, Vec<TimeSeriesPoint>>> {
    let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
    let headers = reader.headers().context("Raw table has no header")?.clone();
    if headers.get(0) != Some(EPOCH_COLUMN) {
        anyhow::bail!("Raw table does not start with {}", EPOCH_COLUMN);
    }
    let tags: Vec<String> = headers.iter().skip(2).map(str::to_string).collect();
    let mut raw: HashMap<String, Vec<TimeSeriesPoint>> = tags.iter().map(|t| (t.clone(), Vec::new())).collect();

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Bad raw table row {}", line + 1))?;
        let time_ms: i64 = record
            .get(0)
            .unwrap_or_default()
            .parse()
            .with_context(|| format!("Bad timestamp in raw table row {}", line + 1))?;
        for (tag, cell) in tags.iter().zip(record.iter().skip(2)) {
            if cell.is_empty() {
                continue;
            }
            let value: f64 = cell
                .parse()
                .with_context(|| format!("Bad value for {} in raw table row {}", tag, line + 1))?;
            if let Some(points) = raw.get_mut(tag) {
                points.push(TimeSeriesPoint::new(time_ms, Some(value)));
            }
        }
    }
    Ok(raw)
}

#[async_trait]
impl SessionCache for FileSessionCache {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        let raw = match tokio::fs::read(&self.raw_path).await {
            Ok(bytes) => raw_from_csv(&bytes).with_context(|| format!("Invalid {}", self.raw_path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.raw_path.display())),
        };
        let Some(coverage) = read_json::<TagCoverage>(&self.coverage_path).await? else {
            tracing::warn!("Raw table cache has no coverage file, ignoring it");
            return Ok(None);
        };
        Ok(Some(SessionSnapshot { raw, coverage }))
    }

    async fn save(&self, raw: &HashMap<String, Vec<TimeSeriesPoint>>, coverage: &TagCoverage) -> Result<()> {
        write_atomic(&self.raw_path, raw_to_csv(raw)?).await?;
        write_json_atomic(&self.coverage_path, coverage).await?;
        tracing::debug!("Saved raw table for {} tags", raw.len());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        remove_if_exists(&self.raw_path).await?;
        remove_if_exists(&self.coverage_path).await?;
        tracing::info!("Cleared raw table and coverage cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn cache_in(dir: &Path) -> FileSessionCache {
        FileSessionCache::new(
            dir.join("cache").join("RawTable.csv"),
            dir.join("cache").join("TagCoverage.json"),
        )
    }

    fn sample() -> (HashMap<String, Vec<TimeSeriesPoint>>, TagCoverage) {
        let mut raw = HashMap::new();
        raw.insert(
            "Engine1.GenA.Power".to_string(),
            vec![TimeSeriesPoint::new(0, Some(1.5)), TimeSeriesPoint::new(60_000, None)],
        );
        raw.insert("Tank1.Level".to_string(), vec![TimeSeriesPoint::new(60_000, Some(-2.0))]);
        raw.insert("Idle".to_string(), vec![]);
        let mut coverage = TagCoverage::default();
        coverage.record("Engine1.GenA.Power", (0, 60));
        coverage.record("Tank1.Level", (0, 60));
        coverage.record("Idle", (0, 60));
        (raw, coverage)
    }

    #[tokio::test]
    async fn test_missing_cache_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cache_in(dir.path()).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_load_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let (raw, coverage) = sample();
        cache.save(&raw, &coverage).await.unwrap();

        let csv = std::fs::read_to_string(dir.path().join("cache").join("RawTable.csv")).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("NumericTimestamp,Timestamp,Engine1.GenA.Power,Idle,Tank1.Level"));
        assert_eq!(lines.next(), Some("0,01/01/1970 00:00:00,1.5,,"));

        let snapshot = cache.load().await.unwrap().unwrap();
        assert_eq!(snapshot.coverage, coverage);
        assert_eq!(snapshot.raw["Engine1.GenA.Power"], vec![TimeSeriesPoint::new(0, Some(1.5))]);
        assert_eq!(snapshot.raw["Tank1.Level"], vec![TimeSeriesPoint::new(60_000, Some(-2.0))]);
        assert!(snapshot.raw["Idle"].is_empty());

        cache.clear().await.unwrap();
        assert!(cache.load().await.unwrap().is_none());
        assert!(!dir.path().join("cache").join("TagCoverage.json").exists());
    }

    #[tokio::test]
    async fn test_raw_table_without_coverage_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let (raw, coverage) = sample();
        cache.save(&raw, &coverage).await.unwrap();
        std::fs::remove_file(dir.path().join("cache").join("TagCoverage.json")).unwrap();
        assert!(cache.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_raw_table_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("RawTable.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "NumericTimestamp,Timestamp,A\nnot-a-number,x,1\n").unwrap();
        assert!(cache_in(dir.path()).load().await.is_err());
    }
}
