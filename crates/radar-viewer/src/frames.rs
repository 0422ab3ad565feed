//! Turning the metadata document into displayable frames.

use std::sync::{Arc, OnceLock};

use radar_proto::config::Config;
use radar_proto::protocol::Product;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

/// One radar image plus the labels shown next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub url: String,
    pub time_utc: String,
    pub time_local: String,
    /// Minutes ahead of generation time; 0 for observations.
    pub lead_minutes: u32,
    pub is_forecast: bool,
}

/// Non-empty, immutable run of frames for a single product.
///
/// Clones share the same backing slice, so a sequence handed out once is
/// never changed by a later load.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    product: Product,
    frames: Arc<[Frame]>,
}

impl FrameSequence {
    /// Returns `None` for an empty frame list.
    pub fn new(product: Product, frames: Vec<Frame>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        debug_assert!(frames.iter().all(|f| f.is_forecast == product.is_forecast()));
        Some(Self {
            product,
            frames: frames.into(),
        })
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_forecast(&self) -> bool {
        self.product.is_forecast()
    }

    pub fn shares_storage_with(&self, other: &FrameSequence) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }
}

// ── metadata document shape ──────────────────────────────────────────────────
//
// The feed is loosely typed. Each part of a product node is read on its own
// and any entry that is not a string counts as "".

/// Parallel arrays, all indexed by frame position.
#[derive(Debug, Default, Deserialize)]
struct RecentWindow {
    #[serde(default, deserialize_with = "lenient_list")]
    file: Vec<String>,
    #[serde(rename = "timeUTC", default, deserialize_with = "lenient_list")]
    time_utc: Vec<String>,
    #[serde(rename = "timeLocal", default, deserialize_with = "lenient_list")]
    time_local: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LatestRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    file: String,
    #[serde(rename = "timeUTC", default, deserialize_with = "lenient_text")]
    time_utc: String,
    #[serde(rename = "timeLocal", default, deserialize_with = "lenient_text")]
    time_local: String,
}

fn text_of(value: Value) -> String {
    match value {
        Value::String(s) => s,
        _ => String::new(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(text_of(Value::deserialize(d)?))
}

fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().map(text_of).collect(),
        _ => Vec::new(),
    })
}

/// Reads one part of a product node, logging and skipping it when its shape
/// is unusable.
fn section<T: DeserializeOwned>(node: &Value, key: &str, product: Product) -> Option<T> {
    let value = node.get(key)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("malformed {}.{} in metadata: {}", product, key, e);
            None
        }
    }
}

fn label_at(labels: &[String], i: usize) -> String {
    labels.get(i).cloned().unwrap_or_default()
}

fn lead_pattern() -> &'static Regex {
    static LEAD: OnceLock<Regex> = OnceLock::new();
    LEAD.get_or_init(|| Regex::new(r"(?i)\(\+(\d+)\s*min\)").expect("static regex"))
}

fn lead_in(label: &str) -> Option<u32> {
    let caps = lead_pattern().captures(label)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Lead time in minutes from a `(+176min)` style suffix.
///
/// The local label wins; the UTC label is consulted only when the local one
/// has no match. Unparsable or absent text yields 0.
pub fn extract_lead_minutes(time_local: &str, time_utc: &str) -> u32 {
    lead_in(time_local).or_else(|| lead_in(time_utc)).unwrap_or(0)
}

/// Builds frame lists from raw metadata using the configured policies.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    image_base_url: String,
    forecast_max_frames: usize,
}

impl FrameBuilder {
    pub fn new(image_base_url: impl Into<String>, forecast_max_frames: usize) -> Self {
        Self {
            image_base_url: image_base_url.into(),
            forecast_max_frames,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.source.image_base_url.clone(),
            config.playback.forecast_max_frames,
        )
    }

    /// Frames for `product`, in document order.
    ///
    /// Never fails: a missing product node gives an empty list and the caller
    /// decides whether that is an error. Badly shaped parts of a node are
    /// skipped on their own.
    pub fn build(&self, raw: &Value, product: Product) -> Vec<Frame> {
        let Some(node) = raw.get(product.metadata_key()) else {
            debug!("metadata has no {} node", product);
            return Vec::new();
        };
        let is_forecast = product.is_forecast();
        let mut frames = Vec::new();
        let mut listed = 0;

        if let Some(window) = section::<RecentWindow>(node, "LastOneHour", product) {
            listed = window.file.len();
            for (i, path) in window.file.iter().enumerate() {
                if path.is_empty() {
                    debug!("{}: skipping entry {} with no file path", product, i);
                    continue;
                }
                frames.push(self.frame(
                    path,
                    label_at(&window.time_utc, i),
                    label_at(&window.time_local, i),
                    is_forecast,
                ));
            }
        }

        if frames.is_empty() {
            if let Some(latest) = section::<LatestRecord>(node, "Latest", product) {
                if !latest.file.is_empty() {
                    debug!("{}: recent window empty, using latest frame", product);
                    frames.push(self.frame(
                        &latest.file,
                        latest.time_utc,
                        latest.time_local,
                        is_forecast,
                    ));
                }
            }
        }

        if is_forecast && frames.len() > self.forecast_max_frames {
            frames.truncate(self.forecast_max_frames);
            info!(
                "{}: truncated to first {} frames (of {})",
                product, self.forecast_max_frames, listed
            );
        }

        frames
    }

    fn frame(&self, path: &str, time_utc: String, time_local: String, is_forecast: bool) -> Frame {
        let lead_minutes = if is_forecast {
            extract_lead_minutes(&time_local, &time_utc)
        } else {
            0
        };
        Frame {
            url: format!("{}{}", self.image_base_url, path),
            time_utc,
            time_local,
            lead_minutes,
            is_forecast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://img.example/nowcast/";

    fn builder() -> FrameBuilder {
        FrameBuilder::new(BASE, 8)
    }

    fn steps_window(n: usize) -> Value {
        let files: Vec<String> = (0..n).map(|i| format!("steps/{:02}.png", i)).collect();
        let utc: Vec<String> = (0..n)
            .map(|i| format!("2025-10-24 02:{:02} UTC (+{}min)", i, (i + 1) * 10))
            .collect();
        let local: Vec<String> = (0..n)
            .map(|i| format!("2025-10-24 09:{:02} WIB (+{}min)", i, (i + 1) * 10))
            .collect();
        json!({ "STEPS": { "LastOneHour": { "file": files, "timeUTC": utc, "timeLocal": local } } })
    }

    #[test]
    fn test_lead_minutes_from_local_label() {
        assert_eq!(extract_lead_minutes("2025-10-24 09:07 WIB (+176min)", ""), 176);
        assert_eq!(extract_lead_minutes("09:07 WIB (+30 MIN)", ""), 30);
    }

    #[test]
    fn test_lead_minutes_falls_back_to_utc_label() {
        assert_eq!(extract_lead_minutes("09:07 WIB", "02:07 UTC (+45min)"), 45);
        assert_eq!(
            extract_lead_minutes("09:07 WIB (+5min)", "02:07 UTC (+45min)"),
            5
        );
    }

    #[test]
    fn test_lead_minutes_without_pattern_is_zero() {
        assert_eq!(extract_lead_minutes("2025-10-24 09:07 WIB", "02:07 UTC"), 0);
        assert_eq!(extract_lead_minutes("", ""), 0);
        assert_eq!(extract_lead_minutes("(+99999999999999min)", ""), 0);
    }

    #[test]
    fn test_observational_frames() {
        let raw = json!({
            "CMAX": { "LastOneHour": {
                "file": ["cmax/a.png", "cmax/b.png"],
                "timeUTC": ["02:00 UTC", "02:10 UTC"],
                "timeLocal": ["09:00 WIB (+10min)", "09:10 WIB"]
            } }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].url, "https://img.example/nowcast/cmax/a.png");
        assert_eq!(frames[1].time_local, "09:10 WIB");
        assert!(frames.iter().all(|f| !f.is_forecast && f.lead_minutes == 0));
    }

    #[test]
    fn test_short_label_arrays_default_to_empty() {
        let raw = json!({
            "CMAX": { "LastOneHour": {
                "file": ["a.png", "b.png", "c.png"],
                "timeUTC": ["02:00 UTC", null],
                "timeLocal": []
            } }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].time_utc, "02:00 UTC");
        assert_eq!(frames[1].time_utc, "");
        assert_eq!(frames[2].time_utc, "");
        assert!(frames.iter().all(|f| f.time_local.is_empty()));
    }

    #[test]
    fn test_null_or_mistyped_labels_default_to_empty() {
        let raw = json!({
            "CMAX": { "LastOneHour": {
                "file": ["a.png", "b.png"],
                "timeUTC": null,
                "timeLocal": [7, "09:10 WIB"]
            } }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.time_utc.is_empty()));
        assert_eq!(frames[0].time_local, "");
        assert_eq!(frames[1].time_local, "09:10 WIB");
    }

    #[test]
    fn test_malformed_latest_does_not_hide_window() {
        let raw = json!({
            "CMAX": {
                "LastOneHour": { "file": ["a.png"], "timeUTC": ["02:00 UTC"] },
                "Latest": "n/a"
            }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].time_utc, "02:00 UTC");
    }

    #[test]
    fn test_malformed_window_falls_back_to_latest() {
        let raw = json!({
            "CMAX": {
                "LastOneHour": "n/a",
                "Latest": { "file": "latest.png", "timeUTC": 5 }
            }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].url.ends_with("latest.png"));
        assert_eq!(frames[0].time_utc, "");
    }

    #[test]
    fn test_entries_without_path_are_skipped_keeping_labels_aligned() {
        let raw = json!({
            "CMAX": { "LastOneHour": {
                "file": ["a.png", null, "", "d.png"],
                "timeUTC": ["02:00 UTC", "02:10 UTC", "02:20 UTC", "02:30 UTC"],
                "timeLocal": ["09:00 WIB", "09:10 WIB", "09:20 WIB", "09:30 WIB"]
            } }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 2);
        assert!(frames[0].url.ends_with("a.png"));
        assert_eq!(frames[0].time_utc, "02:00 UTC");
        assert!(frames[1].url.ends_with("d.png"));
        assert_eq!(frames[1].time_utc, "02:30 UTC");
        assert_eq!(frames[1].time_local, "09:30 WIB");
    }

    #[test]
    fn test_forecast_truncated_to_first_eight_in_order() {
        let frames = builder().build(&steps_window(12), Product::Steps);
        assert_eq!(frames.len(), 8);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.url, format!("{}steps/{:02}.png", BASE, i));
            assert_eq!(frame.lead_minutes, (i as u32 + 1) * 10);
            assert!(frame.is_forecast);
        }
    }

    #[test]
    fn test_observations_are_not_truncated() {
        let files: Vec<String> = (0..12).map(|i| format!("{}.png", i)).collect();
        let raw = json!({ "CMAX": { "LastOneHour": { "file": files } } });
        assert_eq!(builder().build(&raw, Product::Cmax).len(), 12);
    }

    #[test]
    fn test_latest_fallback_when_window_empty() {
        let raw = json!({
            "STEPS": {
                "LastOneHour": { "file": [], "timeUTC": [], "timeLocal": [] },
                "Latest": {
                    "file": "steps/latest.png",
                    "timeUTC": "02:07 UTC",
                    "timeLocal": "2025-10-24 09:07 WIB (+176min)"
                }
            }
        });
        let frames = builder().build(&raw, Product::Steps);
        assert_eq!(
            frames,
            vec![Frame {
                url: format!("{}steps/latest.png", BASE),
                time_utc: "02:07 UTC".to_string(),
                time_local: "2025-10-24 09:07 WIB (+176min)".to_string(),
                lead_minutes: 176,
                is_forecast: true,
            }]
        );
    }

    #[test]
    fn test_latest_fallback_when_window_missing() {
        let raw = json!({ "CMAX": { "Latest": { "file": "cmax/latest.png" } } });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].time_local, "");
    }

    #[test]
    fn test_latest_ignored_when_window_has_frames() {
        let raw = json!({
            "CMAX": {
                "LastOneHour": { "file": ["a.png"] },
                "Latest": { "file": "latest.png" }
            }
        });
        let frames = builder().build(&raw, Product::Cmax);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].url.ends_with("a.png"));
    }

    #[test]
    fn test_missing_or_malformed_node_yields_nothing() {
        let b = builder();
        assert!(b.build(&json!({ "CMAX": {} }), Product::Steps).is_empty());
        assert!(b.build(&json!({ "CMAX": {} }), Product::Cmax).is_empty());
        assert!(b.build(&json!([]), Product::Cmax).is_empty());
        assert!(b
            .build(&json!({ "CMAX": { "LastOneHour": { "file": 7 } } }), Product::Cmax)
            .is_empty());
        assert!(b
            .build(&json!({ "CMAX": { "Latest": { "file": "" } } }), Product::Cmax)
            .is_empty());
    }

    #[test]
    fn test_sequence_rejects_empty() {
        assert!(FrameSequence::new(Product::Cmax, Vec::new()).is_none());
        let frames = builder().build(&steps_window(3), Product::Steps);
        let seq = FrameSequence::new(Product::Steps, frames).unwrap();
        assert_eq!(seq.len(), 3);
        assert!(seq.is_forecast());
        assert!(seq.shares_storage_with(&seq.clone()));
    }
}
