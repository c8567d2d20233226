use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// The unit of isolation for rate limiting and circuit breaking: the scheme,
/// host and port of a URL.
///
/// Default ports are omitted, and host names are normalized to lowercase, so
/// `https://API.example.com:443/a` and `https://api.example.com/b` share a
/// key while `http://api.example.com` does not.
///
/// # Examples
///
/// ```
/// use outbound_lib::HostKey;
/// use url::Url;
///
/// let url = Url::parse("https://api.aladhan.com/v1/timings").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.to_string(), "https://api.aladhan.com");
/// assert_eq!(host_key.host(), "api.aladhan.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl HostKey {
    /// The host name (domain or IP address) without scheme and port
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The URL scheme, e.g. `https`
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The port, if it differs from the scheme's default
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ErrorKind::MissingHost(url.clone()))?;

        Ok(HostKey {
            scheme: url.scheme().to_lowercase(),
            host: host.to_lowercase(),
            port: url.port(),
        })
    }
}

impl TryFrom<Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        HostKey::try_from(&url)
    }
}

impl FromStr for HostKey {
    type Err = ErrorKind;

    /// Parse a key from any URL on the host, e.g. `https://api.example.com`
    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| ErrorKind::InvalidUrl(s.to_string(), e))?;
        HostKey::try_from(&url)
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

impl Serialize for HostKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(url: &str) -> HostKey {
        HostKey::try_from(&Url::parse(url).unwrap()).unwrap()
    }

    #[test]
    fn test_path_and_query_are_ignored() {
        let host_key = key("https://api.aladhan.com/v1/timingsByCity?city=Cairo");
        assert_eq!(host_key.to_string(), "https://api.aladhan.com");
        assert_eq!(host_key.host(), "api.aladhan.com");
        assert_eq!(host_key.scheme(), "https");
        assert_eq!(host_key.port(), None);
    }

    #[test]
    fn test_case_and_default_port_are_normalized() {
        assert_eq!(
            key("HTTPS://API.Aladhan.COM/v1"),
            key("https://api.aladhan.com:443/v2")
        );
        assert_eq!(key("http://example.com:80/").to_string(), "http://example.com");
    }

    #[test]
    fn test_scheme_port_and_subdomain_are_distinct_hosts() {
        let https = key("https://prices.example.com/");
        let custom_port = key("https://prices.example.com:8443/");

        assert_ne!(https, key("http://prices.example.com/"));
        assert_ne!(https, key("https://gold.prices.example.com/"));
        assert_ne!(https, custom_port);
        assert_eq!(custom_port.to_string(), "https://prices.example.com:8443");
        assert_eq!(custom_port.port(), Some(8443));
    }

    #[test]
    fn test_parse_from_str() {
        let host_key: HostKey = "http://127.0.0.1:8080/health".parse().unwrap();
        assert_eq!(host_key.to_string(), "http://127.0.0.1:8080");

        assert!(matches!(
            "not a url".parse::<HostKey>(),
            Err(ErrorKind::InvalidUrl(..))
        ));
    }

    #[test]
    fn test_url_without_host() {
        for url in ["file:///etc/hosts", "mailto:admin@example.com"] {
            let url = Url::parse(url).unwrap();
            assert!(matches!(
                HostKey::try_from(url),
                Err(ErrorKind::MissingHost(_))
            ));
        }
    }

    #[test]
    fn test_serializes_as_string() {
        assert_eq!(
            serde_json::to_string(&key("https://example.com:8443/a")).unwrap(),
            r#""https://example.com:8443""#
        );
    }
}
