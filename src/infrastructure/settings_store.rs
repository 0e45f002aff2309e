// JSON file persistence for site and tag settings
use crate::application::sources::SettingsStore;
use crate::domain::settings::{SiteSettings, TagSettings};
use crate::infrastructure::atomic_file::{read_json, write_json_atomic};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Writes are serialised so a read-modify-write never loses a concurrent
/// update
#[derive(Debug)]
pub struct FileSettingsStore {
    site_path: PathBuf,
    tag_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSettingsStore {
    pub fn new(site_path: PathBuf, tag_path: PathBuf) -> Self {
        Self {
            site_path,
            tag_path,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_site(&self) -> SiteSettings {
        let settings: SiteSettings = read_or_default(&self.site_path).await;
        settings.with_default_dates(chrono::Local::now().naive_local())
    }
}

/// Missing or unreadable files fall back to defaults
async fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path).await {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Ignoring settings file: {:#}", e);
            T::default()
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load_site_settings(&self) -> Result<SiteSettings> {
        Ok(self.read_site().await)
    }

    async fn save_site_settings(&self, settings: &SiteSettings) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.site_path, settings).await?;
        tracing::info!("Saved site settings to {}", self.site_path.display());
        Ok(())
    }

    async fn update_site_settings(
        &self,
        change: Box<dyn for<'a> FnOnce(&'a mut SiteSettings) + Send>,
    ) -> Result<SiteSettings> {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.read_site().await;
        change(&mut settings);
        write_json_atomic(&self.site_path, &settings).await?;
        tracing::info!("Updated site settings in {}", self.site_path.display());
        Ok(settings)
    }

    async fn load_tag_settings(&self) -> Result<TagSettings> {
        Ok(read_or_default(&self.tag_path).await)
    }

    async fn save_tag_settings(&self, settings: &TagSettings) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json_atomic(&self.tag_path, settings).await?;
        tracing::info!("Saved tag settings to {}", self.tag_path.display());
        Ok(())
    }
}
