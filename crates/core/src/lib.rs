//! Core functionality for the clustermesh ad-hoc clustering protocol.
//!
//! This crate provides the identifier and time types, configuration and
//! logging shared by the protocol crate, the node service and the tests.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{
    Config, DestinationPolicy, ProtocolConfig, SimulationConfig, TopologyConfig, TrafficConfig,
};
pub use error::{CoreError, Result};
pub use types::{NodeId, Timestamp};
