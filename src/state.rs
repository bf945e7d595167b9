//! Shared application state for all routes. The engine swaps its catalog internally on refresh.

use crate::service::RestEngine;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RestEngine>,
}

impl AppState {
    pub fn new(engine: Arc<RestEngine>) -> Self {
        Self { engine }
    }
}
