/// Default database name.
pub const DEFAULT_DATABASE: &str = "golink";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "routes";

/// Default number of keys read per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Options for configuring a `MongoStore`.
#[derive(Clone, Debug)]
pub struct MongoStoreOptions {
    /// Connection string, e.g. `mongodb://localhost:27017`.
    pub uri: String,

    /// Database holding the route collection.
    pub database: String,

    /// Collection with one document per route.
    pub collection: String,

    /// Keys read per listing page.
    pub page_size: usize,
}

impl MongoStoreOptions {
    /// Options for the deployment at `uri` with default names.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}
