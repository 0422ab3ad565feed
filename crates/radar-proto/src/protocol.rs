use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A radar dataset published by the metadata endpoint.
///
/// The product decides which node of the metadata document is read, whether
/// its frames are forecasts, and where playback starts after a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Column-maximum reflectivity, observed over the last hour.
    #[serde(rename = "CMAX")]
    Cmax,
    /// STEPS nowcast, a short-range precipitation forecast.
    #[serde(rename = "STEPS")]
    Steps,
}

impl Product {
    pub const ALL: [Product; 2] = [Product::Cmax, Product::Steps];

    /// Key of this product's node in the metadata document.
    pub fn metadata_key(self) -> &'static str {
        match self {
            Product::Cmax => "CMAX",
            Product::Steps => "STEPS",
        }
    }

    pub fn is_forecast(self) -> bool {
        matches!(self, Product::Steps)
    }

    /// Index playback starts at after loading `len` frames.
    ///
    /// Forecasts unfold from now, so they start at the earliest lead time.
    /// Observations replay history up to now, so they start at the newest.
    pub fn initial_index(self, len: usize) -> usize {
        if self.is_forecast() {
            0
        } else {
            len.saturating_sub(1)
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metadata_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown radar product: {0:?}")]
pub struct UnknownProduct(pub String);

impl FromStr for Product {
    type Err = UnknownProduct;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Product::ALL
            .into_iter()
            .find(|p| p.metadata_key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownProduct(s.to_string()))
    }
}

/// Commands accepted by the viewer core from any binding layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    SelectProduct { product: Product },
    Reload,
    Next,
    Prev,
    GoTo { index: i64 },
    Play,
    Stop,
    TogglePlay,
    Opacity { value: f32 },
}

/// Whether the viewer currently has frames to show.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ViewStatus {
    /// A metadata request is in flight and nothing has been shown yet.
    #[default]
    Loading,
    Ready,
    /// The last load failed; `reason` is shown in place of the time badge.
    NoData { reason: String },
}

/// Everything a front-end needs to render the overlay and its badges.
///
/// `rev` increases on every change so pollers can skip identical states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub rev: u64,
    pub product: Product,
    #[serde(flatten)]
    pub status: ViewStatus,
    pub frame_index: Option<usize>,
    pub frame_count: usize,
    pub overlay_url: Option<String>,
    /// `"<local> | <utc>"`, or `"No data"` after a failed load.
    pub time_badge: String,
    /// Lead-time chip text; `None` hides the chip (observational frames).
    pub lead_annotation: Option<String>,
    pub is_playing: bool,
    pub opacity: f32,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl ViewState {
    pub fn new(product: Product, opacity: f32) -> Self {
        Self {
            rev: 0,
            product,
            status: ViewStatus::Loading,
            frame_index: None,
            frame_count: 0,
            overlay_url: None,
            time_badge: String::new(),
            lead_annotation: None,
            is_playing: false,
            opacity: opacity.clamp(0.0, 1.0),
            loaded_at: None,
        }
    }
}

/// Chip text for a forecast frame's lead time.
pub fn lead_annotation(lead_minutes: u32) -> String {
    if lead_minutes > 0 {
        format!("Forecast +{} min", lead_minutes)
    } else {
        "Forecast".to_string()
    }
}
