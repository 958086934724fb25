use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::LogFormat;
use crate::model::ItemId;
use crate::table::page_size_option;

pub const NATURE_RUNE: ItemId = ItemId(561);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prices_url: String,
    pub volumes_url: String,
    pub mapping_url: String,
    pub user_agent: String,
    /// Item whose insta-sell price is the consumable cost of an alch.
    pub reference_item_id: ItemId,

    pub price_interval_secs: u64,
    pub volume_interval_secs: u64,
    pub reference_interval_secs: u64,
    pub metadata_retry_secs: u64,

    pub prefs_path: PathBuf,
    pub default_page_size: usize,

    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prices_url: "https://prices.runescape.wiki/api/v1/osrs/latest".to_string(),
            volumes_url: "https://prices.runescape.wiki/api/v1/osrs/volumes".to_string(),
            mapping_url: "https://prices.runescape.wiki/api/v1/osrs/mapping".to_string(),
            user_agent: concat!("osrs_ge_tracker/", env!("CARGO_PKG_VERSION"), " - item table")
                .to_string(),
            reference_item_id: NATURE_RUNE,
            price_interval_secs: 60,
            volume_interval_secs: 24 * 60 * 60,
            reference_interval_secs: 60,
            metadata_retry_secs: 60,
            prefs_path: PathBuf::from("ge_tracker_prefs.db"),
            default_page_size: 10,
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads a JSON config file. Fields missing from the file keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let config = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)?;
                serde_json::from_str(&data)?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("prices_url", &self.prices_url),
            ("volumes_url", &self.volumes_url),
            ("mapping_url", &self.mapping_url),
        ] {
            if url.trim().is_empty() {
                return Err(Error::Config(format!("{name} is empty")));
            }
        }
        for (name, secs) in [
            ("price_interval_secs", self.price_interval_secs),
            ("volume_interval_secs", self.volume_interval_secs),
            ("reference_interval_secs", self.reference_interval_secs),
            ("metadata_retry_secs", self.metadata_retry_secs),
        ] {
            if secs == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        page_size_option(self.default_page_size)?;
        Ok(())
    }

    pub fn price_interval(&self) -> Duration {
        Duration::from_secs(self.price_interval_secs)
    }

    pub fn volume_interval(&self) -> Duration {
        Duration::from_secs(self.volume_interval_secs)
    }

    pub fn reference_interval(&self) -> Duration {
        Duration::from_secs(self.reference_interval_secs)
    }

    pub fn metadata_retry(&self) -> Duration {
        Duration::from_secs(self.metadata_retry_secs)
    }
}
