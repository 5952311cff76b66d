//! Integration of a node's protocol stack with its environment: the application on top, the
//!  physical links below, and a tokio task driving the network layer in between.

pub mod application;
pub mod node_config;
pub mod node_driver;
