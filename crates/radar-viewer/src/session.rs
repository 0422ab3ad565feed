//! Product selection and loading.
//!
//! A selection stops playback, bumps the request generation and spawns a
//! fetch. The fetch reports back through a [`MetadataLoaded`] event; only the
//! completion carrying the latest generation is applied, so when the user
//! switches products faster than the endpoint answers, the last choice wins.

use std::sync::Arc;

use radar_proto::protocol::Product;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, MetadataSource};
use crate::frames::{FrameBuilder, FrameSequence};
use crate::playback::PlaybackController;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to load metadata: {0}")]
    Fetch(#[from] FetchError),
    #[error("No frames available for {0}")]
    NoFrames(Product),
}

/// Completion of a metadata request started by [`ProductSession::select_product`].
#[derive(Debug)]
pub struct MetadataLoaded {
    pub generation: u64,
    pub product: Product,
    pub result: Result<Value, FetchError>,
}

pub struct ProductSession {
    source: Arc<dyn MetadataSource>,
    builder: FrameBuilder,
    controller: PlaybackController,
    product: Product,
    generation: u64,
    loaded_tx: mpsc::Sender<MetadataLoaded>,
}

impl ProductSession {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        builder: FrameBuilder,
        controller: PlaybackController,
        product: Product,
        loaded_tx: mpsc::Sender<MetadataLoaded>,
    ) -> Self {
        Self {
            source,
            builder,
            controller,
            product,
            generation: 0,
            loaded_tx,
        }
    }

    /// Currently selected product (possibly still loading).
    pub fn product(&self) -> Product {
        self.product
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    pub fn initial_load(&mut self) -> u64 {
        self.select_product(self.product)
    }

    pub fn reload(&mut self) -> u64 {
        self.select_product(self.product)
    }

    /// Start loading `product`; returns the request generation.
    ///
    /// Frames of a different product are dropped right away. A reload of the
    /// same product keeps its frames on screen until the new result arrives.
    pub fn select_product(&mut self, product: Product) -> u64 {
        let switching = self
            .controller
            .frames()
            .is_some_and(|frames| frames.product() != product);
        if switching {
            self.controller.clear();
        } else {
            self.controller.stop();
        }

        self.product = product;
        self.generation += 1;
        let generation = self.generation;
        info!("loading {} (request {})", product, generation);
        self.controller.sink_mut().show_loading(product);

        let source = Arc::clone(&self.source);
        let loaded_tx = self.loaded_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch().await;
            let loaded = MetadataLoaded {
                generation,
                product,
                result,
            };
            if loaded_tx.send(loaded).await.is_err() {
                debug!("session gone before request {} completed", generation);
            }
        });

        generation
    }

    /// Apply a completed request. Returns `None` when the completion is stale
    /// and was discarded, otherwise the installed frame count or the failure.
    pub fn on_metadata_loaded(
        &mut self,
        loaded: MetadataLoaded,
    ) -> Option<Result<usize, LoadError>> {
        if loaded.generation != self.generation {
            debug!(
                "discarding stale {} response (request {}, latest {})",
                loaded.product, loaded.generation, self.generation
            );
            return None;
        }

        let product = loaded.product;
        let outcome = self.install(product, loaded.result);
        match &outcome {
            Ok(count) => info!("{}: {} frames loaded", product, count),
            Err(e) => {
                warn!("{}: {}", product, e);
                self.controller.clear();
                self.controller
                    .sink_mut()
                    .show_unavailable(product, &e.to_string());
            }
        }
        Some(outcome)
    }

    fn install(
        &mut self,
        product: Product,
        result: Result<Value, FetchError>,
    ) -> Result<usize, LoadError> {
        let raw = result?;
        let frames = self.builder.build(&raw, product);
        let sequence = FrameSequence::new(product, frames).ok_or(LoadError::NoFrames(product))?;
        let count = sequence.len();
        self.controller.set_frames(sequence, product.initial_index(count));
        Ok(count)
    }
}
