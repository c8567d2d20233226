//! `test-utils` is used for testing in both `outbound-lib` and `outbound-bin`.
//! This crate does not depend on `outbound-lib` or `outbound-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds to every request with a
/// predefined status.
///
/// Further arguments are calls on the `wiremock::ResponseTemplate`, e.g.
/// `mock_server!(StatusCode::OK, set_body_string("ok"))`.
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new($status);
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Create a mock web server that answers the first `$failures` requests with
/// `$failure_status` and every request after that with `$success_status`.
///
/// Further arguments are calls on the failing `wiremock::ResponseTemplate`,
/// e.g. `insert_header("Retry-After", "1")`.
#[macro_export]
macro_rules! flaky_mock_server {
    ($failure_status:expr, $failures:expr, $success_status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let failure_template = wiremock::ResponseTemplate::new($failure_status);
        let failure_template = failure_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(failure_template)
            .up_to_n_times($failures)
            .with_priority(1)
            .mount(&mock_server)
            .await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new($success_status))
            .with_priority(2)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Gets the "main" binary name (e.g. `outbound`)
#[macro_export]
macro_rules! main_command {
    () => {
        assert_cmd::Command::cargo_bin(env!("CARGO_PKG_NAME"))
            .expect("Couldn't get cargo package name")
    };
}

/// Start a raw TCP server that promises a 100 byte body, sends five bytes
/// and hangs up. Every accepted connection increments `$connections`, an
/// `Arc<AtomicUsize>`.
///
/// Evaluates to the server's base URL.
#[macro_export]
macro_rules! truncating_server {
    ($connections:expr) => {{
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Couldn't bind test listener");
        let addr = listener.local_addr().expect("Couldn't get listener address");
        let connections = std::sync::Arc::clone(&$connections);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                connections.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                    .await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/")
    }};
}
