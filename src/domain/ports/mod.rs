//! Port traits decoupling the scan pipeline from its adapters.

pub mod control_api;
pub mod host;

pub use control_api::{ApiCategory, ApiError, ApiResponse, ControlApi};
pub use host::{HostExecutor, HostOs};
