//! filedrop - anonymous ephemeral file drop
//!
//! Upload a file, get a short identifier, share it. Anyone holding the
//! identifier can download the file until the retention window closes.

pub mod clock;
pub mod config;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{DropError, Result};
pub use file::{
    build_share_link, BlobStore, CleanupReport, DropService, FileIndex, FileRecord, IdAllocator,
    MetadataStore, ResolvedFile, RetentionManager, RetentionPolicy,
};
pub use web::WebServer;
