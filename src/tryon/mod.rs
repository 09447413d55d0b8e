pub mod error;
pub mod keys;
pub mod normalize;
pub mod payload;
pub mod poller;
pub mod provider;
pub mod request;
pub mod service;

pub use error::{FailureKind, TryOnError};
pub use service::{ServiceSettings, TryOnResult, TryOnService};
