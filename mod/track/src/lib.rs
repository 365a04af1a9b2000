pub mod activity;
pub mod api;
pub mod board;
pub mod engine;
pub mod model;
pub mod ratelimit;
pub mod store;

use std::sync::Arc;

use axum::Router;
use opentrack_core::{Directory, Module};
use opentrack_sql::SQLStore;

use engine::TrackEngine;
use ratelimit::RateLimits;

pub use board::{BoardOverlay, DropTarget, PendingMove};

/// The Track module — the project / task / sprint lifecycle engine.
///
/// Embed this in a service to get project management, task lifecycle
/// with completion stamping, sprint lifecycle with completion cascade
/// and delete rollback, per-task activity trails, and per-actor rate
/// limiting on every mutation.
pub struct TrackModule {
    engine: Arc<TrackEngine>,
}

impl TrackModule {
    /// Create the track module and initialise storage.
    pub fn new(
        db: Arc<dyn SQLStore>,
        directory: Arc<dyn Directory>,
        limits: RateLimits,
    ) -> Result<Self, opentrack_core::ServiceError> {
        let engine = Arc::new(TrackEngine::new(db, directory, limits)?);
        Ok(Self { engine })
    }

    /// Get a reference to the TrackEngine for programmatic use.
    pub fn engine(&self) -> &Arc<TrackEngine> {
        &self.engine
    }
}

impl Module for TrackModule {
    fn name(&self) -> &str {
        "track"
    }

    fn routes(&self) -> Router {
        api::router(Arc::clone(&self.engine))
    }
}
