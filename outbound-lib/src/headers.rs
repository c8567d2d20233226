//! Header helpers: `Retry-After` handling and header tables in config files.

use http::header::RETRY_AFTER;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// The delay an upstream asked for via `Retry-After`, if any.
///
/// Unparseable values are logged and ignored.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let delay = parse_retry_after(value, SystemTime::now());
    if delay.is_none() {
        log::debug!("Ignoring unparseable Retry-After header {value:?}");
    }
    delay
}

/// `Retry-After` is either delay-seconds or an HTTP-date, see
/// [RFC 9110 section 10.2.3](https://www.rfc-editor.org/rfc/rfc9110#section-10.2.3).
/// Dates in the past mean "retry now".
fn parse_retry_after(value: &HeaderValue, now: SystemTime) -> Option<Duration> {
    let value = value.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value).ok()?;
    Some(date.duration_since(now).unwrap_or_default())
}

/// Deserialize a TOML table of `name = "value"` pairs into a [`HeaderMap`]
pub(crate) fn deserialize_headers<'de, D>(deserializer: D) -> Result<HeaderMap, D::Error>
where
    D: serde::Deserializer<'de>,
{
    BTreeMap::<String, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, value)| -> Result<(HeaderName, HeaderValue), D::Error> {
            let parsed_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| D::Error::custom(format!("invalid header name '{name}': {e}")))?;
            let parsed_value = HeaderValue::from_str(&value).map_err(|e| {
                D::Error::custom(format!("invalid value for header '{name}': {e}"))
            })?;
            Ok((parsed_name, parsed_value))
        })
        .collect()
}

/// Serialize a [`HeaderMap`] back into a table of `name = "value"` pairs.
/// Values that are not visible ASCII are skipped.
pub(crate) fn serialize_headers<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .collect::<BTreeMap<_, _>>()
        .serialize(serializer)
}
