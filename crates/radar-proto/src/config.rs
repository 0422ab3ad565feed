use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::platform;
use super::protocol::Product;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub map: MapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where metadata and radar images come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
    /// Prefix joined with each frame's relative file path.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Upper bound on forecast animation length.
    #[serde(default = "default_forecast_max_frames")]
    pub forecast_max_frames: usize,
    #[serde(default = "default_product")]
    pub default_product: Product,
}

/// Geographic placement of the radar raster, corners as `[lat, lon]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default = "default_top_left")]
    pub top_left: [f64; 2],
    #[serde(default = "default_bottom_right")]
    pub bottom_right: [f64; 2],
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_center")]
    pub center: [f64; 2],
    #[serde(default = "default_zoom")]
    pub zoom: u8,
    #[serde(default = "default_min_zoom")]
    pub min_zoom: u8,
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
}

/// South-west and north-east corners, the form map libraries expect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: [f64; 2],
    pub north_east: [f64; 2],
}

impl PlaybackConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl OverlayConfig {
    pub fn bounds(&self) -> Bounds {
        let [tl_lat, tl_lon] = self.top_left;
        let [br_lat, br_lon] = self.bottom_right;
        Bounds {
            south_west: [br_lat, tl_lon.min(br_lon)],
            north_east: [tl_lat, tl_lon.max(br_lon)],
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            metadata_url: default_metadata_url(),
            image_base_url: default_image_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            forecast_max_frames: default_forecast_max_frames(),
            default_product: default_product(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            top_left: default_top_left(),
            bottom_right: default_bottom_right(),
            opacity: default_opacity(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: default_center(),
            zoom: default_zoom(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_metadata_url() -> String {
    "https://radar-soetta.meteo-vei.workers.dev/".to_string()
}

fn default_image_base_url() -> String {
    "https://radar.bmkg.go.id/sidarma-nowcast/".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_frame_interval_ms() -> u64 {
    700
}

fn default_forecast_max_frames() -> usize {
    8
}

fn default_product() -> Product {
    Product::Cmax
}

fn default_top_left() -> [f64; 2] {
    [-3.923728719811228, 104.398987719812]
}

fn default_bottom_right() -> [f64; 2] {
    [-8.41895928018772, 108.894218280188]
}

fn default_opacity() -> f32 {
    0.65
}

// Jakarta
fn default_center() -> [f64; 2] {
    [-6.171344, 106.646603]
}

fn default_zoom() -> u8 {
    10
}

fn default_min_zoom() -> u8 {
    4
}

fn default_max_zoom() -> u8 {
    17
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `config_path`, writing a default file there if it is missing.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing {}", config_path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)
            .with_context(|| format!("writing {}", config_path.display()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
