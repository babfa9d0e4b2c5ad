//! resource-agent: node-local lifecycle agent
//!
//! Keeps a durable record of every virtual machine, disk, network interface,
//! load balancer and key vault it materializes on the host, and reconciles
//! those records with what actually exists.

pub mod agent;
pub mod audit;
pub mod config;
pub mod controller;
pub mod error;
pub mod provider;
pub mod resources;
pub mod store;

pub use agent::Agent;
pub use config::{AgentConfig, KindConfig};
pub use controller::LifecycleController;
pub use error::{Error, Result};
