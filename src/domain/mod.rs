//! Domain layer: models, ports, errors, and cancellation.
//!
//! Nothing here talks HTTP or spawns processes; adapters for those live in
//! `infrastructure`.

pub mod cancel;
pub mod errors;
pub mod models;
pub mod ports;

pub use cancel::{CancelHandle, CancelToken};
pub use errors::{ScanError, ScanResult};
