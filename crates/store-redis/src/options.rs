use golink_store::{StoreError, StoreResult};
use url::Url;

/// Default `COUNT` hint passed to `SCAN`.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Options for configuring a `RedisStore`.
#[derive(Clone, Debug)]
pub struct RedisStoreOptions {
    /// `host:port`, or a full `redis://` / `rediss://` URL.
    pub addr: String,

    /// Password, overriding any in `addr`.
    pub password: Option<String>,

    /// Logical database number, overriding any in `addr`.
    pub db: Option<i64>,

    /// Emit a trace event for every command issued.
    pub debug: bool,

    /// `COUNT` hint for each `SCAN` page.
    pub scan_count: usize,
}

impl RedisStoreOptions {
    /// Options for the server at `addr` with defaults for everything else.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            db: None,
            debug: false,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    pub(crate) fn connection_url(&self) -> StoreResult<Url> {
        let raw = if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| StoreError::Backend(format!("invalid redis address {}: {e}", self.addr)))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| StoreError::Backend("cannot set redis password".to_string()))?;
        }
        if let Some(db) = self.db {
            url.set_path(&format!("/{db}"));
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let url = RedisStoreOptions::new("localhost:6379")
            .connection_url()
            .unwrap();

        assert_eq!(url.as_str(), "redis://localhost:6379");
    }

    #[test]
    fn test_password_and_db() {
        let options = RedisStoreOptions {
            password: Some("p@ss word".to_string()),
            db: Some(3),
            ..RedisStoreOptions::new("cache.internal:6380")
        };

        let url = options.connection_url().unwrap();

        assert_eq!(url.host_str(), Some("cache.internal"));
        assert_eq!(url.port(), Some(6380));
        assert_eq!(url.path(), "/3");
        assert_eq!(url.password(), Some("p%40ss%20word"));
    }

    #[test]
    fn test_full_url_kept() {
        let url = RedisStoreOptions::new("rediss://:secret@example.com:6390/2")
            .connection_url()
            .unwrap();

        assert_eq!(url.scheme(), "rediss");
        assert_eq!(url.password(), Some("secret"));
        assert_eq!(url.path(), "/2");
    }

    #[test]
    fn test_empty_password_ignored() {
        let options = RedisStoreOptions {
            password: Some(String::new()),
            ..RedisStoreOptions::new("localhost:6379")
        };

        assert_eq!(options.connection_url().unwrap().password(), None);
    }
}
