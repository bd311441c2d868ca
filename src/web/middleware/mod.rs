//! Middleware for the HTTP transport.

pub mod cors;

pub use cors::create_cors_layer;
