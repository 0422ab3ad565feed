//! ViewerCore: single-owner event loop for all viewer state.
//!
//! The HTTP API and the binary send `ViewerEvent`s; the animation timer and
//! metadata fetches report back on their own channels. Everything lands in
//! `run`, which is the only place the session and controller are touched,
//! so none of them needs a lock.

use std::sync::Arc;

use radar_proto::config::Config;
use radar_proto::protocol::{Command, Product, ViewState};
use radar_proto::state::{PersistentState, StateStore};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::fetch::MetadataSource;
use crate::frames::FrameBuilder;
use crate::playback::{PlaybackController, TimerTick};
use crate::session::{MetadataLoaded, ProductSession};
use crate::sink::ViewStateSink;

// ── ViewerEvent ───────────────────────────────────────────────────────────────

/// All external inputs into the core loop.
#[derive(Debug)]
pub enum ViewerEvent {
    /// A command from the HTTP API or another binding.
    ClientCommand(Command),
    Shutdown,
}

// ── ViewerCore ────────────────────────────────────────────────────────────────

pub struct ViewerCore {
    config: Config,
    session: ProductSession,
    view: ViewStateSink,
    store: StateStore,
    persistent: PersistentState,
    tick_rx: mpsc::Receiver<TimerTick>,
    loaded_rx: mpsc::Receiver<MetadataLoaded>,
}

impl ViewerCore {
    /// Build the core. `start_product` overrides both the remembered and the
    /// configured product; a remembered opacity overrides `[overlay] opacity`.
    pub fn new(
        config: Config,
        source: Arc<dyn MetadataSource>,
        store: StateStore,
        start_product: Option<Product>,
    ) -> Self {
        let persistent = store.load();
        let product = start_product
            .or(persistent.last_product)
            .unwrap_or(config.playback.default_product);

        let opacity = persistent.opacity.unwrap_or(config.overlay.opacity);

        let (view, _) = ViewStateSink::new(ViewState::new(product, opacity));
        let (tick_tx, tick_rx) = mpsc::channel(64);
        let (loaded_tx, loaded_rx) = mpsc::channel(16);

        let controller = PlaybackController::new(Box::new(view.clone()), tick_tx);
        let session = ProductSession::new(
            source,
            FrameBuilder::from_config(&config),
            controller,
            product,
            loaded_tx,
        );

        Self {
            config,
            session,
            view,
            store,
            persistent,
            tick_rx,
            loaded_rx,
        }
    }

    /// Receiver for the published view state.
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    /// Run until a `Shutdown` event arrives or every sender is dropped.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<ViewerEvent>) -> anyhow::Result<()> {
        info!("ViewerCore: starting event loop");
        self.session.initial_load();

        loop {
            tokio::select! {
                evt = event_rx.recv() => match evt {
                    None => {
                        info!("ViewerCore: event channel closed, shutting down");
                        break;
                    }
                    Some(ViewerEvent::Shutdown) => {
                        info!("ViewerCore: shutdown requested");
                        break;
                    }
                    Some(ViewerEvent::ClientCommand(cmd)) => self.handle_command(cmd).await,
                },
                Some(tick) = self.tick_rx.recv() => {
                    self.session.controller_mut().on_tick(tick);
                }
                Some(loaded) = self.loaded_rx.recv() => {
                    self.session.on_metadata_loaded(loaded);
                }
            }
        }

        self.session.controller_mut().stop();
        Ok(())
    }

    async fn handle_command(&mut self, cmd: Command) {
        debug!("ViewerCore: {:?}", cmd);
        let interval = self.config.playback.frame_interval();

        match cmd {
            Command::SelectProduct { product } => {
                self.session.select_product(product);
                self.persistent.last_product = Some(product);
                persist(&self.store, &self.persistent).await;
            }
            Command::Reload => {
                self.session.reload();
            }
            // Manual stepping always halts the animation first.
            Command::Next => {
                let controller = self.session.controller_mut();
                controller.stop();
                controller.next();
            }
            Command::Prev => {
                let controller = self.session.controller_mut();
                controller.stop();
                controller.previous();
            }
            Command::GoTo { index } => {
                let controller = self.session.controller_mut();
                controller.stop();
                controller.show_frame(index);
            }
            Command::Play => self.session.controller_mut().play(interval),
            Command::Stop => self.session.controller_mut().stop(),
            Command::TogglePlay => self.session.controller_mut().toggle(interval),
            Command::Opacity { value } => {
                if !value.is_finite() {
                    warn!("ignoring non-finite opacity {}", value);
                    return;
                }
                let opacity = value.clamp(0.0, 1.0);
                self.view.set_opacity(opacity);
                self.persistent.opacity = Some(opacity);
                persist(&self.store, &self.persistent).await;
            }
        }
    }
}

async fn persist(store: &StateStore, state: &PersistentState) {
    if let Err(e) = store.save(state).await {
        warn!("failed to save state to {:?}: {}", store.path(), e);
    }
}
