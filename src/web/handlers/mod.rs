//! API handlers for the HTTP transport.

pub mod file;

pub use file::*;

use std::sync::Arc;

use crate::file::DropService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The file drop façade.
    pub service: Arc<DropService>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: Arc<DropService>) -> Self {
        Self { service }
    }
}
