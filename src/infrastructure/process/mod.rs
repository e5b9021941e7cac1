//! Scanner process lifecycle: launch, readiness, shutdown join.

pub mod launcher;
pub mod readiness;

pub use launcher::{launch, resolve_install_dir, ScannerProcess};
pub use readiness::wait_until_ready;
