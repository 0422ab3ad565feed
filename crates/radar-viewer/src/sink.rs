//! Display sink: where playback reports what should be on screen.

use std::sync::Arc;

use chrono::Utc;
use radar_proto::protocol::{lead_annotation, Product, ViewState, ViewStatus};
use tokio::sync::watch;

use crate::frames::{Frame, FrameSequence};

/// Receives every visible change made by the playback controller.
///
/// Calls are synchronous and happen on the core loop; implementations must
/// not block.
pub trait DisplaySink: Send {
    /// A new sequence replaced whatever was installed before.
    fn frames_installed(&mut self, frames: &FrameSequence);
    /// Frames were dropped; nothing is on screen.
    fn frames_cleared(&mut self);
    /// Exactly one call per `show_frame`.
    fn show_frame(&mut self, index: usize, frame: &Frame);
    fn set_playing(&mut self, playing: bool);
    fn show_loading(&mut self, product: Product);
    fn show_unavailable(&mut self, product: Product, reason: &str);
}

/// Publishes a [`ViewState`] snapshot over a watch channel.
///
/// Cloning yields another handle onto the same channel, which lets the core
/// adjust opacity while the controller owns its own handle.
#[derive(Clone)]
pub struct ViewStateSink {
    tx: Arc<watch::Sender<ViewState>>,
}

impl ViewStateSink {
    pub fn new(initial: ViewState) -> (Self, watch::Receiver<ViewState>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ViewState {
        self.tx.borrow().clone()
    }

    /// Overlay opacity, independent of frame state.
    pub fn set_opacity(&self, opacity: f32) {
        self.update(|s| s.opacity = opacity.clamp(0.0, 1.0));
    }

    fn update(&self, f: impl FnOnce(&mut ViewState)) {
        self.tx.send_modify(|state| {
            f(state);
            state.rev += 1;
        });
    }
}

fn clear_frame_fields(state: &mut ViewState) {
    state.frame_index = None;
    state.frame_count = 0;
    state.overlay_url = None;
    state.time_badge.clear();
    state.lead_annotation = None;
}

impl DisplaySink for ViewStateSink {
    fn frames_installed(&mut self, frames: &FrameSequence) {
        // Ready is published together with the first frame.
        self.update(|s| {
            s.product = frames.product();
            s.frame_count = frames.len();
            s.loaded_at = Some(Utc::now());
        });
    }

    fn frames_cleared(&mut self) {
        self.update(clear_frame_fields);
    }

    fn show_frame(&mut self, index: usize, frame: &Frame) {
        self.update(|s| {
            s.status = ViewStatus::Ready;
            s.frame_index = Some(index);
            s.overlay_url = Some(frame.url.clone());
            s.time_badge = format!("{} | {}", frame.time_local, frame.time_utc);
            s.lead_annotation = frame
                .is_forecast
                .then(|| lead_annotation(frame.lead_minutes));
        });
    }

    fn set_playing(&mut self, playing: bool) {
        self.update(|s| s.is_playing = playing);
    }

    fn show_loading(&mut self, product: Product) {
        self.update(|s| {
            s.product = product;
            s.status = ViewStatus::Loading;
        });
    }

    fn show_unavailable(&mut self, product: Product, reason: &str) {
        self.update(|s| {
            clear_frame_fields(s);
            s.product = product;
            s.status = ViewStatus::NoData {
                reason: reason.to_string(),
            };
            s.time_badge = "No data".to_string();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast_frame(lead: u32) -> Frame {
        Frame {
            url: "https://img.example/steps/1.png".to_string(),
            time_utc: "02:07 UTC".to_string(),
            time_local: format!("09:07 WIB (+{}min)", lead),
            lead_minutes: lead,
            is_forecast: true,
        }
    }

    #[test]
    fn test_show_frame_renders_badges() {
        let (mut sink, rx) = ViewStateSink::new(ViewState::new(Product::Steps, 0.65));
        sink.show_frame(2, &forecast_frame(176));

        let state = rx.borrow().clone();
        assert_eq!(state.frame_index, Some(2));
        assert_eq!(state.time_badge, "09:07 WIB (+176min) | 02:07 UTC");
        assert_eq!(state.lead_annotation.as_deref(), Some("Forecast +176 min"));
        assert_eq!(state.rev, 1);
    }

    #[test]
    fn test_ready_only_with_new_frame_on_screen() {
        let (mut sink, rx) = ViewStateSink::new(ViewState::new(Product::Steps, 0.65));
        sink.show_frame(0, &forecast_frame(10));
        sink.show_loading(Product::Steps);

        let frames = vec![Frame {
            url: "https://img.example/steps/new.png".to_string(),
            ..forecast_frame(20)
        }];
        let sequence = FrameSequence::new(Product::Steps, frames).unwrap();
        sink.frames_installed(&sequence);
        {
            let state = rx.borrow();
            assert_eq!(state.status, ViewStatus::Loading);
            assert_eq!(state.frame_count, 1);
        }

        sink.show_frame(0, &sequence.frames()[0]);
        let state = rx.borrow().clone();
        assert_eq!(state.status, ViewStatus::Ready);
        assert_eq!(
            state.overlay_url.as_deref(),
            Some("https://img.example/steps/new.png")
        );
    }

    #[test]
    fn test_observation_hides_lead_chip() {
        let (mut sink, rx) = ViewStateSink::new(ViewState::new(Product::Cmax, 0.65));
        sink.show_frame(
            0,
            &Frame {
                is_forecast: false,
                lead_minutes: 0,
                ..forecast_frame(0)
            },
        );
        assert_eq!(rx.borrow().lead_annotation, None);
    }

    #[test]
    fn test_unavailable_clears_frame_and_marks_no_data() {
        let (mut sink, rx) = ViewStateSink::new(ViewState::new(Product::Steps, 0.65));
        sink.show_frame(0, &forecast_frame(10));
        sink.show_unavailable(Product::Steps, "HTTP 502 Bad Gateway");

        let state = rx.borrow().clone();
        assert_eq!(state.overlay_url, None);
        assert_eq!(state.time_badge, "No data");
        assert_eq!(
            state.status,
            ViewStatus::NoData {
                reason: "HTTP 502 Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn test_opacity_is_clamped_and_shared_between_clones() {
        let (sink, rx) = ViewStateSink::new(ViewState::new(Product::Cmax, 0.65));
        let other = sink.clone();
        other.set_opacity(1.7);
        assert_eq!(rx.borrow().opacity, 1.0);
        assert_eq!(sink.snapshot().opacity, 1.0);
    }
}
