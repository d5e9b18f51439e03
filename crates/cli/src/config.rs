//! Configuration loading and management

use anyhow::{Context, Result};
use everylot_adapters::{bluesky::DEFAULT_PDS_URL, parcels::ALBANY_FEATURE_SERVER};
use everylot_domain::Platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub streetview: StreetViewConfig,

    #[serde(default)]
    pub bluesky: BlueskyConfig,

    #[serde(default)]
    pub twitter: TwitterConfig,

    #[serde(default)]
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub dry_run: bool,

    /// Used by `post` before anything is posted, and by `ingest` for seeding
    #[serde(default)]
    pub start_pin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_format")]
    pub search_format: String,

    #[serde(default = "default_format")]
    pub print_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreetViewConfig {
    #[serde(default = "default_streetview_key_env")]
    pub api_key_env: String,

    /// Fixed camera pitch; the framing heuristic decides when unset
    #[serde(default)]
    pub pitch: Option<f64>,

    #[serde(default)]
    pub zoom: Option<f64>,

    #[serde(default = "default_image_size")]
    pub size: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_pds_url")]
    pub pds_url: String,

    #[serde(default = "default_bluesky_identifier_env")]
    pub identifier_env: String,

    #[serde(default = "default_bluesky_password_env")]
    pub password_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_x_user_token_env")]
    pub user_token_env: String,

    #[serde(default = "default_x_max_chars")]
    pub max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    #[serde(default = "default_feature_server_url")]
    pub feature_server_url: String,

    #[serde(default = "default_municipality_field")]
    pub municipality_field: String,

    #[serde(default = "default_city")]
    pub city: String,

    #[serde(default = "default_address_contains")]
    pub address_contains: String,

    #[serde(default = "default_locality")]
    pub default_locality: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("./albany_lots.db")
}

fn default_format() -> String {
    "{address}".to_string()
}

fn default_streetview_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_image_size() -> String {
    "1000x1000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_pds_url() -> String {
    DEFAULT_PDS_URL.to_string()
}

fn default_bluesky_identifier_env() -> String {
    "BLUESKY_HANDLE".to_string()
}

fn default_bluesky_password_env() -> String {
    "BLUESKY_APP_PASSWORD".to_string()
}

fn default_x_user_token_env() -> String {
    "X_USER_TOKEN".to_string()
}

fn default_x_max_chars() -> usize {
    280
}

fn default_feature_server_url() -> String {
    ALBANY_FEATURE_SERVER.to_string()
}

fn default_municipality_field() -> String {
    "Parcel_Muni".to_string()
}

fn default_city() -> String {
    "City of Albany".to_string()
}

fn default_address_contains() -> String {
    "albany".to_string()
}

fn default_locality() -> String {
    "Albany, NY".to_string()
}

fn default_batch_size() -> usize {
    1000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            dry_run: false,
            start_pin: None,
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            search_format: default_format(),
            print_format: default_format(),
        }
    }
}

impl Default for StreetViewConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_streetview_key_env(),
            pitch: None,
            zoom: None,
            size: default_image_size(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pds_url: default_pds_url(),
            identifier_env: default_bluesky_identifier_env(),
            password_env: default_bluesky_password_env(),
        }
    }
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user_token_env: default_x_user_token_env(),
            max_chars: default_x_max_chars(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            feature_server_url: default_feature_server_url(),
            municipality_field: default_municipality_field(),
            city: default_city(),
            address_contains: default_address_contains(),
            default_locality: default_locality(),
            batch_size: default_batch_size(),
        }
    }
}

/// `EVERYLOT__SECTION__KEY` overrides. Values stay strings so parcel ids
/// like `0100` survive; typed fields are coerced on deserialize.
fn environment() -> config::Environment {
    config::Environment::with_prefix("EVERYLOT").separator("__")
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Try default config path if none specified
        let default_path = PathBuf::from("./config.toml");
        let path = config_path.unwrap_or(&default_path);

        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else if config_path.is_some() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        builder = builder.add_source(environment());

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Enabled platforms in posting priority order
    pub fn enabled_platforms(&self) -> Vec<Platform> {
        Platform::PRIORITY
            .into_iter()
            .filter(|platform| match platform {
                Platform::Bluesky => self.bluesky.enabled,
                Platform::Twitter => self.twitter.enabled,
            })
            .collect()
    }

    /// Generate example configuration as TOML string
    pub fn example_toml() -> String {
        r#"# everylot configuration

[general]
database_path = "./albany_lots.db"
dry_run = false
# Before anything is posted, start after this parcel id
# start_pin = "65.34-2-1"

[templates]
# Fields: {address}, {id}, {lat}, {lon} and any other lots column.
# {{ and }} are literal braces, {lat:.5} rounds to 5 decimals.
search_format = "{address}"
print_format = "{address}"

[streetview]
api_key_env = "GOOGLE_API_KEY"
size = "1000x1000"
timeout_secs = 30
# Fixed pitch instead of the floors-based framing
# pitch = -10.0
# zoom = 0.8

[bluesky]
enabled = true
pds_url = "https://bsky.social"
identifier_env = "BLUESKY_HANDLE"
password_env = "BLUESKY_APP_PASSWORD"

[twitter]
enabled = false
user_token_env = "X_USER_TOKEN"
max_chars = 280

[ingest]
feature_server_url = "https://services6.arcgis.com/JJzptGyn7EDStgyp/ArcGIS/rest/services/TaxParcelsWithRPS/FeatureServer/0"
municipality_field = "Parcel_Muni"
city = "City of Albany"
address_contains = "albany"
default_locality = "Albany, NY"
batch_size = 1000
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();

        assert_eq!(config.general.database_path, default_database_path());
        assert_eq!(config.templates.print_format, "{address}");
        assert_eq!(config.streetview.pitch, None);
        assert_eq!(config.ingest.feature_server_url, ALBANY_FEATURE_SERVER);
        assert_eq!(config.enabled_platforms(), vec![Platform::Bluesky]);
    }

    #[test]
    fn test_enabled_platforms_priority() {
        let mut config = AppConfig::default();
        config.twitter.enabled = true;
        assert_eq!(
            config.enabled_platforms(),
            vec![Platform::Bluesky, Platform::Twitter]
        );

        config.bluesky.enabled = false;
        assert_eq!(config.enabled_platforms(), vec![Platform::Twitter]);

        config.twitter.enabled = false;
        assert!(config.enabled_platforms().is_empty());
    }

    fn from_env(vars: &[(&str, &str)]) -> AppConfig {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        config::Config::builder()
            .add_source(environment().source(Some(vars)))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_env_start_pin_keeps_leading_zeros() {
        let config = from_env(&[("EVERYLOT__GENERAL__START_PIN", "0100")]);
        assert_eq!(config.general.start_pin.as_deref(), Some("0100"));

        let config = from_env(&[("EVERYLOT__GENERAL__START_PIN", "10.10")]);
        assert_eq!(config.general.start_pin.as_deref(), Some("10.10"));
    }

    #[test]
    fn test_env_values_coerce_to_typed_fields() {
        let config = from_env(&[
            ("EVERYLOT__BLUESKY__ENABLED", "false"),
            ("EVERYLOT__TWITTER__ENABLED", "true"),
            ("EVERYLOT__TWITTER__MAX_CHARS", "25000"),
            ("EVERYLOT__STREETVIEW__PITCH", "-5.5"),
        ]);

        assert_eq!(config.enabled_platforms(), vec![Platform::Twitter]);
        assert_eq!(config.twitter.max_chars, 25000);
        assert_eq!(config.streetview.pitch, Some(-5.5));
    }
}
