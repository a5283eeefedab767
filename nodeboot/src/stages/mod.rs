//! Provisioning pipeline

pub mod engine;
pub mod fsm;
pub mod runner;
pub mod stage;
