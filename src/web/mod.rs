//! HTTP transport for filedrop.
//!
//! A thin REST layer over [`DropService`](crate::file::DropService): upload
//! via multipart, download by identifier, and a metadata lookup.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use router::create_router;
pub use server::WebServer;
