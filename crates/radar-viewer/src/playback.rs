//! Frame position and animation timer.
//!
//! Two states: STOPPED and PLAYING. `play` spawns a ticker task that sends
//! [`TimerTick`]s back to the core loop; `stop` aborts it and forgets its id,
//! so ticks that were already queued are ignored by [`PlaybackController::on_tick`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::frames::{Frame, FrameSequence};
use crate::sink::DisplaySink;

/// Sent by the animation task once per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub timer_id: u64,
}

struct ActiveTimer {
    id: u64,
    handle: AbortHandle,
}

pub struct PlaybackController {
    frames: Option<FrameSequence>,
    current_index: usize,
    timer: Option<ActiveTimer>,
    next_timer_id: u64,
    tick_tx: mpsc::Sender<TimerTick>,
    sink: Box<dyn DisplaySink>,
}

impl PlaybackController {
    pub fn new(sink: Box<dyn DisplaySink>, tick_tx: mpsc::Sender<TimerTick>) -> Self {
        Self {
            frames: None,
            current_index: 0,
            timer: None,
            next_timer_id: 1,
            tick_tx,
            sink,
        }
    }

    pub fn frames(&self) -> Option<&FrameSequence> {
        self.frames.as_ref()
    }

    /// `None` while no frames are installed.
    pub fn current_index(&self) -> Option<usize> {
        self.frames.as_ref().map(|_| self.current_index)
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.as_ref()?.get(self.current_index)
    }

    pub fn is_playing(&self) -> bool {
        self.timer.is_some()
    }

    pub fn sink_mut(&mut self) -> &mut dyn DisplaySink {
        self.sink.as_mut()
    }

    /// Swap in a new sequence and show `initial_index`.
    ///
    /// Any running timer is stopped first so no tick can land on the new list
    /// with a position computed for the old one.
    pub fn set_frames(&mut self, frames: FrameSequence, initial_index: usize) {
        self.stop();
        self.sink.frames_installed(&frames);
        self.frames = Some(frames);
        self.current_index = 0;
        self.show_frame(initial_index as i64);
    }

    /// Stop playback and drop the installed sequence.
    pub fn clear(&mut self) {
        self.stop();
        if self.frames.take().is_some() {
            self.current_index = 0;
            self.sink.frames_cleared();
        }
    }

    /// Show frame `index`, wrapping in both directions.
    ///
    /// No-op when nothing is installed.
    pub fn show_frame(&mut self, index: i64) {
        let Some(frames) = &self.frames else {
            debug!("show_frame({}) with no frames installed", index);
            return;
        };
        let len = frames.len() as i64;
        let normalized = index.rem_euclid(len) as usize;
        self.current_index = normalized;
        if let Some(frame) = frames.get(normalized) {
            self.sink.show_frame(normalized, frame);
        }
    }

    pub fn next(&mut self) {
        self.show_frame(self.current_index as i64 + 1);
    }

    pub fn previous(&mut self) {
        self.show_frame(self.current_index as i64 - 1);
    }

    /// Start advancing one frame per `interval`. Does nothing if already
    /// playing or if there is nothing to animate.
    pub fn play(&mut self, interval: Duration) {
        if self.timer.is_some() {
            return;
        }
        if self.frames.is_none() {
            debug!("play ignored: no frames installed");
            return;
        }

        let id = self.next_timer_id;
        self.next_timer_id += 1;

        let tick_tx = self.tick_tx.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tick_tx.send(TimerTick { timer_id: id }).await.is_err() {
                    break;
                }
            }
        });

        self.timer = Some(ActiveTimer {
            id,
            handle: task.abort_handle(),
        });
        debug!("animation timer {} started ({:?})", id, interval);
        self.sink.set_playing(true);
    }

    /// Cancel the animation timer. Does nothing when already stopped.
    pub fn stop(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        timer.handle.abort();
        debug!("animation timer {} stopped", timer.id);
        self.sink.set_playing(false);
    }

    pub fn toggle(&mut self, interval: Duration) {
        if self.is_playing() {
            self.stop();
        } else {
            self.play(interval);
        }
    }

    /// Advance for a tick from the live timer. Returns false for ticks from a
    /// timer that has since been stopped.
    pub fn on_tick(&mut self, tick: TimerTick) -> bool {
        match &self.timer {
            Some(timer) if timer.id == tick.timer_id => {
                self.next();
                true
            }
            _ => {
                debug!("dropping stale tick from timer {}", tick.timer_id);
                false
            }
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}
