//! Control-API adapters.

pub mod client;

pub use client::ZapClient;
