//! Application handlers registered on the router by the binary.

pub mod health;

pub use health::HealthController;
