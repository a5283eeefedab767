//! Deployment configuration: keys, model, collection and persistence

pub mod answers;
pub mod collector;
pub mod keys;
pub mod model;
pub mod writer;
