//! The persisted route record.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A destination URL together with the time the route was written.
///
/// Serialized as `{"url": "...", "time": "<RFC 3339>"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Where the short name redirects to.
    #[serde(rename = "url")]
    pub destination: String,

    /// When the route was created.
    #[serde(rename = "time")]
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Creates a route stamped with the current time.
    pub fn new(destination: impl Into<String>) -> Self {
        Self::with_time(destination, Utc::now())
    }

    /// Creates a route with an explicit creation time.
    pub fn with_time(destination: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            destination: destination.into(),
            created_at,
        }
    }

    /// Encodes the route into its stored JSON form.
    pub fn encode(&self) -> StoreResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| StoreError::Backend(format!("failed to encode route: {e}")))
    }

    /// Decodes the value stored under `key`.
    pub fn decode(key: &str, bytes: &[u8]) -> StoreResult<Self> {
        let route: Self = serde_json::from_slice(bytes).map_err(|e| StoreError::decode(key, e))?;

        if route.destination.is_empty() {
            return Err(StoreError::decode(key, "route has an empty url"));
        }

        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED: &str = r#"{"url":"http://czan.io","time":"2020-09-29T22:23:56.718910Z"}"#;

    #[test]
    fn test_decode_stored_form() {
        let route = Route::decode("key", STORED.as_bytes()).unwrap();

        assert_eq!(route.destination, "http://czan.io");
        assert_eq!(
            route.created_at,
            "2020-09-29T22:23:56.718910Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_decode_accepts_offset_timestamps() {
        let raw = r#"{"url":"http://czan.io","time":"2020-09-29T16:23:56.71891-06:00"}"#;
        let route = Route::decode("key", raw.as_bytes()).unwrap();

        assert_eq!(route, Route::decode("key", STORED.as_bytes()).unwrap());
    }

    #[test]
    fn test_reencode_is_logically_equal() {
        let route = Route::decode("key", STORED.as_bytes()).unwrap();
        let bytes = route.encode().unwrap();

        assert_eq!(Route::decode("key", &bytes).unwrap(), route);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = Route::decode("broken", b"not json").unwrap_err();

        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "broken"));
    }

    #[test]
    fn test_decode_rejects_empty_url() {
        let raw = r#"{"url":"","time":"2020-09-29T22:23:56Z"}"#;

        assert!(matches!(
            Route::decode("empty", raw.as_bytes()),
            Err(StoreError::Decode { .. })
        ));
    }
}
