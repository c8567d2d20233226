use std::io::{self, Write};

use outbound_lib::UpstreamResponse;

/// Write a response to `writer`, optionally preceded by the status line and
/// headers like `curl -i` does.
pub(crate) fn write_response<W: Write>(
    writer: &mut W,
    response: &UpstreamResponse,
    include_headers: bool,
) -> io::Result<()> {
    if include_headers {
        writeln!(writer, "{}", response.status)?;
        for (name, value) in &response.headers {
            writeln!(writer, "{name}: {}", String::from_utf8_lossy(value.as_bytes()))?;
        }
        writeln!(writer)?;
    }
    writer.write_all(&response.body)?;
    if !response.body.is_empty() && !response.body.ends_with(b"\n") {
        writeln!(writer)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use pretty_assertions::assert_eq;

    fn response(body: &str) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        UpstreamResponse {
            status: StatusCode::OK,
            headers,
            url: "https://api.example.com/".parse().unwrap(),
            body: body.as_bytes().to_vec(),
            attempts: 1,
        }
    }

    fn render(response: &UpstreamResponse, include_headers: bool) -> String {
        let mut out = Vec::new();
        write_response(&mut out, response, include_headers).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_body_only() {
        assert_eq!(render(&response("05:12"), false), "05:12\n");
        assert_eq!(render(&response("05:12\n"), false), "05:12\n");
        assert_eq!(render(&response(""), false), "");
    }

    #[test]
    fn test_include_headers() {
        assert_eq!(
            render(&response("ok"), true),
            "200 OK\ncontent-type: text/plain\n\nok\n"
        );
    }
}
