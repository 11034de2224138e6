//! HTTP layer for the crosscheck conflict review system

pub mod rest;

pub use rest::{create_router, create_router_with_config, ApiState};
