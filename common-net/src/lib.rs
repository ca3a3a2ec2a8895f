//! Networking pieces shared by the relay gateway and player sync clients.

pub mod hub;
pub mod message;
pub mod metrics;
pub mod shutdown;
pub mod telemetry;
pub mod transport;
