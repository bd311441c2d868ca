//! Data Transfer Objects for the HTTP transport.

pub mod response;

pub use response::*;
