//! nodeboot library
//!
//! Bootstraps a build-automation cluster node: collects the deployment
//! configuration, persists it with generated secrets and drives the
//! provisioning pipeline against the target host.

pub mod app;
pub mod config;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod preconditions;
pub mod prereqs;
pub mod reconcile;
pub mod secrets;
pub mod stages;
pub mod transport;
pub mod utils;
