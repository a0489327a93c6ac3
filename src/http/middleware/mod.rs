pub mod identity;

pub use identity::{identity_middleware, Identity};
