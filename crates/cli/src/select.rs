use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;
use golink_store::RouteStore;
use golink_store_memory::MemoryStore;
use golink_store_mongodb::{MongoStore, MongoStoreOptions};
use golink_store_redis::{RedisStore, RedisStoreOptions};
use golink_store_rocksdb::{RocksDbStore, RocksDbStoreOptions};
use tracing::info;

use crate::Error;

/// Storage technology behind the route store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Process-local map, gone on exit
    Memory,
    /// Embedded RocksDB under `--data`
    Rocksdb,
    /// Redis server at `--redis-addr`
    Redis,
    /// MongoDB deployment at `--mongodb-uri`
    Mongodb,
}

/// Backend selection and connection parameters.
#[derive(Clone, Debug, clap::Args)]
pub struct StoreArgs {
    /// Backing store to use
    #[arg(long, value_enum, default_value_t = Backend::Rocksdb, env = "GOLINK_BACKEND")]
    pub backend: Backend,

    /// Location of the RocksDB data directory
    #[arg(long, default_value = "data", env = "GOLINK_DATA")]
    pub data: PathBuf,

    /// Address of the redis server to use
    #[arg(long, env = "GOLINK_REDIS_ADDR")]
    pub redis_addr: Option<String>,

    /// Password to the redis server
    #[arg(long, env = "GOLINK_REDIS_PW")]
    pub redis_pw: Option<String>,

    /// Redis logical database to use
    #[arg(long, env = "GOLINK_REDIS_DB")]
    pub redis_db: Option<i64>,

    /// MongoDB connection string
    #[arg(long, env = "GOLINK_MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database holding the routes
    #[arg(long, default_value = golink_store_mongodb::DEFAULT_DATABASE, env = "GOLINK_MONGODB_DATABASE")]
    pub mongodb_database: String,

    /// MongoDB collection holding the routes
    #[arg(long, default_value = golink_store_mongodb::DEFAULT_COLLECTION, env = "GOLINK_MONGODB_COLLECTION")]
    pub mongodb_collection: String,

    /// Verbose logging, including every redis command
    #[arg(long, env = "GOLINK_DEBUG")]
    pub debug: bool,
}

/// Open the configured backend. Every backend pings before returning.
pub async fn open_store(args: &StoreArgs) -> Result<Arc<dyn RouteStore>, Error> {
    let store: Arc<dyn RouteStore> = match args.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Rocksdb => {
            Arc::new(RocksDbStore::new(RocksDbStoreOptions::new(&args.data)).await?)
        }
        Backend::Redis => {
            let addr = args
                .redis_addr
                .clone()
                .ok_or_else(|| Error::Config("--redis-addr is required".to_string()))?;

            Arc::new(
                RedisStore::new(RedisStoreOptions {
                    password: args.redis_pw.clone(),
                    db: args.redis_db,
                    debug: args.debug,
                    ..RedisStoreOptions::new(addr)
                })
                .await?,
            )
        }
        Backend::Mongodb => {
            let uri = args
                .mongodb_uri
                .clone()
                .ok_or_else(|| Error::Config("--mongodb-uri is required".to_string()))?;

            Arc::new(
                MongoStore::new(MongoStoreOptions {
                    database: args.mongodb_database.clone(),
                    collection: args.mongodb_collection.clone(),
                    ..MongoStoreOptions::new(uri)
                })
                .await?,
            )
        }
    };

    info!(backend = ?args.backend, "route store ready");
    Ok(store)
}
