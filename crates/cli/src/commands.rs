use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use clap::Subcommand;
use golink_store::{Route, RouteStore};
use tracing::info;

use crate::Error;

/// Administrative operations on the route store.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Print the destination of a route
    Get {
        /// Short name
        key: String,
    },

    /// Create or replace a route
    Put {
        /// Short name
        key: String,
        /// Destination URL
        url: String,
    },

    /// Delete a route
    Del {
        /// Short name
        key: String,
    },

    /// List routes whose name starts with a prefix
    List {
        /// Prefix to match; every route when omitted
        prefix: Option<String>,
    },

    /// Write every route to stdout as a JSON object
    Dump,

    /// Load routes from a JSON object written by `dump`
    Restore {
        /// Dump file
        file: PathBuf,
    },

    /// Allocate the next sequential id
    NextId,
}

/// Run `command` against `store`, writing results to `out`.
pub async fn run<S, W>(store: &S, command: Command, out: &mut W) -> Result<(), Error>
where
    S: RouteStore + ?Sized,
    W: Write + Send,
{
    match command {
        Command::Get { key } => {
            let route = store.get(&key).await?;
            writeln!(out, "{}", route.destination)?;
        }
        Command::Put { key, url } => store.put(&key, &Route::new(url)).await?,
        Command::Del { key } => store.del(&key).await?,
        Command::List { prefix } => {
            let mut iter = store.list(prefix.as_deref().unwrap_or_default()).await?;

            let mut written = Ok(());
            while written.is_ok() && iter.next().await {
                if let (Some(name), Some(route)) = (iter.name(), iter.route()) {
                    written = writeln!(out, "{name}\t{}", route.destination);
                }
            }
            let failed = iter.take_error();
            iter.release().await;

            written?;
            if let Some(e) = failed {
                return Err(e.into());
            }
        }
        Command::Dump => {
            let routes = store.get_all().await?;
            serde_json::to_writer_pretty(&mut *out, &routes)?;
            writeln!(out)?;
        }
        Command::Restore { file } => {
            let raw = tokio::fs::read(&file).await?;
            let routes: BTreeMap<String, Route> = serde_json::from_slice(&raw)?;

            for (key, route) in &routes {
                store.put(key, route).await?;
            }
            info!(count = routes.len(), file = %file.display(), "routes restored");
        }
        Command::NextId => {
            let id = store.next_id().await?;
            writeln!(out, "{id}")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use golink_store::StoreError;
    use golink_store_memory::MemoryStore;
    use tempfile::NamedTempFile;

    async fn output(store: &MemoryStore, command: Command) -> String {
        let mut out = Vec::new();
        run(store, command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    fn put(key: &str, url: &str) -> Command {
        Command::Put {
            key: key.to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();

        output(&store, put("docs", "https://example.com/docs")).await;
        let printed = output(&store, Command::Get { key: "docs".into() }).await;

        assert_eq!(printed, "https://example.com/docs\n");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let mut out = Vec::new();

        let result = run(&store, Command::Get { key: "nope".into() }, &mut out).await;

        assert!(matches!(result, Err(Error::Store(StoreError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let store = MemoryStore::new();
        for (key, url) in [("a/1", "http://one"), ("a/2", "http://two"), ("b", "http://b")] {
            output(&store, put(key, url)).await;
        }

        let printed = output(
            &store,
            Command::List {
                prefix: Some("a/".into()),
            },
        )
        .await;

        assert_eq!(printed, "a/1\thttp://one\na/2\thttp://two\n");
    }

    #[tokio::test]
    async fn test_next_id() {
        let store = MemoryStore::new();

        assert_eq!(output(&store, Command::NextId).await, "1\n");
        assert_eq!(output(&store, Command::NextId).await, "2\n");
    }

    #[tokio::test]
    async fn test_dump_then_restore() {
        let source = MemoryStore::new();
        let when = Utc.with_ymd_and_hms(2020, 9, 29, 22, 23, 56).unwrap();
        source
            .put("x", &Route::with_time("http://example.com", when))
            .await
            .unwrap();
        source.next_id().await.unwrap();

        let dump = output(&source, Command::Dump).await;
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &dump).unwrap();

        let target = MemoryStore::new();
        output(
            &target,
            Command::Restore {
                file: file.path().to_path_buf(),
            },
        )
        .await;

        assert_eq!(
            target.get_all().await.unwrap(),
            source.get_all().await.unwrap()
        );
        // The counter is not part of a dump.
        assert_eq!(target.next_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_rejects_malformed_dump() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"[1, 2, 3]").unwrap();

        let mut out = Vec::new();
        let result = run(
            &MemoryStore::new(),
            Command::Restore {
                file: file.path().to_path_buf(),
            },
            &mut out,
        )
        .await;

        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_restore_refuses_route_without_destination() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            br#"{"blank":{"url":"","time":"2020-09-29T22:23:56Z"}}"#,
        )
        .unwrap();

        let store = MemoryStore::new();
        let mut out = Vec::new();
        let result = run(
            &store,
            Command::Restore {
                file: file.path().to_path_buf(),
            },
            &mut out,
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::Store(StoreError::InvalidRoute { .. }))
        ));
        assert!(store.get_all().await.unwrap().is_empty());
    }
}
