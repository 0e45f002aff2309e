use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub upstream: UpstreamSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub taglist_url: String,
    /// Template with `${tag}`, `${start}` and `${end}` placeholders
    pub values_url: String,
    pub timeout_secs: u64,
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Holds the caches, settings files and logs
    pub base_dir: PathBuf,
}

impl StorageSettings {
    pub fn taglist_cache_path(&self) -> PathBuf {
        self.base_dir.join("cache").join("Taglist.json")
    }

    pub fn raw_table_cache_path(&self) -> PathBuf {
        self.base_dir.join("cache").join("RawTable.csv")
    }

    pub fn coverage_cache_path(&self) -> PathBuf {
        self.base_dir.join("cache").join("TagCoverage.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn site_settings_path(&self) -> PathBuf {
        self.base_dir.join("settings").join("siteSettings.json")
    }

    pub fn tag_settings_path(&self) -> PathBuf {
        self.base_dir.join("settings").join("tagSettings.json")
    }
}

/// Built-in defaults, then `config/detool.*` if present, then `DETOOL__*`
/// environment variables (e.g. `DETOOL__SERVER__PORT=9090`).
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("upstream.taglist_url", "http://localhost:61185/taglist")?
        .set_default(
            "upstream.values_url",
            "http://localhost:61185/values?tag=${tag}&startDateUnixSeconds=${start}&endDateUnixSeconds=${end}",
        )?
        .set_default("upstream.timeout_secs", 3)?
        .set_default("upstream.max_concurrent_fetches", 4)?
        .set_default("storage.base_dir", "data")?
        .add_source(config::File::with_name("config/detool").required(false))
        .add_source(config::Environment::with_prefix("DETOOL").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace template variables in a URL or query string
pub fn prepare_query(query: &str, vars: &HashMap<String, String>) -> String {
    let mut result = query.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
