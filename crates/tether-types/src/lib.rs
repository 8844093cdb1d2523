//! Shared types and error hierarchy for Tether.

pub mod error;
pub mod message;
pub mod provider;
pub mod retry;
pub mod sse;
pub mod util;

pub use error::{ApiError, ConfigError};
pub use message::*;
pub use retry::RetryConfig;
pub use util::{ellipsize, truncate_str};
