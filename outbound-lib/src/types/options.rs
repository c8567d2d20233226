use http::HeaderMap;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::RetryOverrides;

/// Per-call options for [`crate::Client::get`] and [`crate::Client::post`].
///
/// ```
/// use std::time::Duration;
/// use outbound_lib::{RequestOptions, RetryOverrides};
///
/// let options = RequestOptions::builder()
///     .retry(RetryOverrides::builder().max_attempts(5).build())
///     .timeout(Duration::from_secs(5))
///     .build();
/// assert_eq!(options.timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(TypedBuilder, Debug, Clone, Default)]
#[builder(field_defaults(default))]
pub struct RequestOptions {
    /// Changes to the client's retry policy for this call
    pub retry: RetryOverrides,

    /// Timeout for each attempt, overriding the client default
    #[builder(setter(strip_option))]
    pub timeout: Option<Duration>,

    /// Headers added to this call, taking precedence over client and host
    /// defaults
    pub headers: HeaderMap,
}
