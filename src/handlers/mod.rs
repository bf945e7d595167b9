//! HTTP handlers for the REST surface.

pub mod rest;
pub use rest::*;
