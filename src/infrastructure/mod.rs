//! Adapters binding the domain ports to the outside world.

pub mod api;
pub mod config;
pub mod host;
pub mod process;

pub use host::LocalHost;
