use std::error::Error;
use std::io;

use http::StatusCode;

use crate::TransportFailure;

/// Classify a failed attempt as transient or terminal.
///
/// Follows the split used by `reqwest-retry`: anything that might go away on
/// its own (timeouts, dropped connections, overloaded servers) is transient.
pub(crate) trait RetryExt {
    /// The transient failure this represents, or `None` if retrying cannot help.
    fn retry_reason(&self) -> Option<TransportFailure>;
}

impl RetryExt for StatusCode {
    fn retry_reason(&self) -> Option<TransportFailure> {
        match *self {
            StatusCode::TOO_MANY_REQUESTS => Some(TransportFailure::TooManyRequests),
            s if s.is_server_error() => Some(TransportFailure::ServerError),
            _ => None,
        }
    }
}

impl RetryExt for reqwest::Error {
    fn retry_reason(&self) -> Option<TransportFailure> {
        if self.is_timeout() {
            return Some(TransportFailure::Timeout);
        }
        // Failed DNS lookups are reported as connect errors too
        if self.is_connect() {
            return Some(TransportFailure::Connect);
        }
        if self.is_builder() || self.is_redirect() {
            return None;
        }
        // A connection dropped while the body is read surfaces as a body or
        // decode error, one dropped before the head as a request error. The
        // cause is only visible further down the source chain.
        if !(self.is_request() || self.is_body() || self.is_decode()) {
            return None;
        }

        if let Some(hyper_error) = find_source::<hyper::Error>(self) {
            if hyper_error.is_incomplete_message() || hyper_error.is_canceled() {
                return Some(TransportFailure::ConnectionReset);
            }
        }
        find_source::<io::Error>(self).and_then(classify_io_error)
    }
}

fn classify_io_error(error: &io::Error) -> Option<TransportFailure> {
    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => Some(TransportFailure::ConnectionReset),
        io::ErrorKind::TimedOut => Some(TransportFailure::Timeout),
        _ => None,
    }
}

/// The first error of type `T` in the source chain of `error`
fn find_source<'a, T: Error + 'static>(error: &'a (dyn Error + 'static)) -> Option<&'a T> {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(typed) = cause.downcast_ref::<T>() {
            return Some(typed);
        }
        source = cause.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use test_utils::truncating_server;

    #[rstest]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, Some(TransportFailure::ServerError))]
    #[case(StatusCode::BAD_GATEWAY, Some(TransportFailure::ServerError))]
    #[case(StatusCode::SERVICE_UNAVAILABLE, Some(TransportFailure::ServerError))]
    #[case(StatusCode::TOO_MANY_REQUESTS, Some(TransportFailure::TooManyRequests))]
    #[case(StatusCode::NOT_FOUND, None)]
    #[case(StatusCode::BAD_REQUEST, None)]
    #[case(StatusCode::REQUEST_TIMEOUT, None)]
    #[case(StatusCode::UNAUTHORIZED, None)]
    fn test_status_classification(
        #[case] status: StatusCode,
        #[case] expected: Option<TransportFailure>,
    ) {
        assert_eq!(status.retry_reason(), expected);
    }

    #[rstest]
    #[case(io::ErrorKind::ConnectionReset, Some(TransportFailure::ConnectionReset))]
    #[case(io::ErrorKind::ConnectionAborted, Some(TransportFailure::ConnectionReset))]
    #[case(io::ErrorKind::UnexpectedEof, Some(TransportFailure::ConnectionReset))]
    #[case(io::ErrorKind::TimedOut, Some(TransportFailure::Timeout))]
    #[case(io::ErrorKind::PermissionDenied, None)]
    #[case(io::ErrorKind::InvalidData, None)]
    fn test_io_error_classification(
        #[case] kind: io::ErrorKind,
        #[case] expected: Option<TransportFailure>,
    ) {
        assert_eq!(classify_io_error(&io::Error::from(kind)), expected);
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        // Nothing listens on port 1
        let error = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
        assert_eq!(error.retry_reason(), Some(TransportFailure::Connect));
    }

    #[tokio::test]
    async fn test_truncated_body_is_connection_reset() {
        let connections = Arc::new(AtomicUsize::new(0));
        let url = truncating_server!(connections);

        let response = reqwest::get(&url).await.unwrap();
        let error = response.bytes().await.unwrap_err();
        assert!(error.is_body() || error.is_decode(), "{error:?}");
        assert_eq!(error.retry_reason(), Some(TransportFailure::ConnectionReset));
    }

    #[test]
    fn test_find_source_walks_the_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] io::Error);

        let error = Outer(io::Error::from(io::ErrorKind::BrokenPipe));
        let io_error = find_source::<io::Error>(&error).unwrap();
        assert_eq!(io_error.kind(), io::ErrorKind::BrokenPipe);
        assert!(find_source::<hyper::Error>(&error).is_none());
    }

    #[test]
    fn test_builder_error_is_terminal() {
        let error = reqwest::Client::new()
            .get("http://exa mple.com")
            .build()
            .unwrap_err();
        assert_eq!(error.retry_reason(), None);
    }
}
