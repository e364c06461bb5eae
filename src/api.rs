//! Local HTTP API
//!
//! Session operations, the wizard's user actions, and an SSE stream per
//! session. Every JSON response uses the backend's envelope shape.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::runtime::RuntimeManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeManager>,
}

impl AppState {
    pub fn new(runtime: RuntimeManager) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }
}
