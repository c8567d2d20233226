#![allow(unreachable_pub)]

mod error;
mod options;
mod response;

pub use error::{ErrorCategory, ErrorKind, TransportFailure};
pub use options::RequestOptions;
pub use response::UpstreamResponse;

/// The outbound `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
