//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - **Driven Adapters (Outbound)**
//!   - `broker/`: Simulated order gateway (paper mode)
//!   - `market_data/`: In-memory completed-bar store
//!   - `persistence/`: JSON file state store
//!   - `notification/`: Logging notifier
//!
//! - **Driver Adapters (Inbound)**
//!   - `http/`: REST queries, plan commands, bar ingest
//!   - `plan_loader`: YAML trade plan files
//!
//! - `container`: wires the adapters into a running engine

pub mod broker;
pub mod container;
pub mod http;
pub mod market_data;
pub mod notification;
pub mod persistence;
pub mod plan_loader;
