pub mod desired;
pub mod host;
pub mod layout;
pub mod reconciler;
