//! SurrealDB connection setup
//!
//! [`SurrealHandle`] owns the `Surreal<Any>` client shared by
//! `SurrealArtifactStore` and `SurrealMemoryIndex`. It connects to `mem://`,
//! a local `surrealkv://` directory, or a remote endpoint with credentials,
//! and runs the schema migrations before handing the client out.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StoreError;
use crate::migrations;
use crate::storage_traits::StoreResult;

const DEFAULT_NAMESPACE: &str = "stash";
const DEFAULT_DATABASE: &str = "main";

/// Which kind of SurrealDB user the credentials belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthLevel {
    /// Scoped to one namespace/database
    #[default]
    Database,
    /// Server-wide root user
    Root,
}

/// Remote SurrealDB endpoint plus credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// WebSocket endpoint, e.g. `wss://<instance>.surrealdb.cloud`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    pub auth: AuthLevel,
}

impl CloudConfig {
    /// Database-level credentials in the default namespace and database.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            auth: AuthLevel::Database,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthLevel) -> Self {
        self.auth = auth;
        self
    }

    /// Read credentials from the environment.
    ///
    /// `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and `SURREALDB_PASSWORD` are
    /// required; `None` if any is missing. `SURREALDB_NAMESPACE`,
    /// `SURREALDB_DATABASE` and `SURREALDB_ROOT` ("true" for a root user) are
    /// optional.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let mut config = Self::new(
            lookup("SURREALDB_ENDPOINT")?,
            lookup("SURREALDB_USERNAME")?,
            lookup("SURREALDB_PASSWORD")?,
        );
        if let Some(ns) = lookup("SURREALDB_NAMESPACE") {
            config = config.with_namespace(ns);
        }
        if let Some(db) = lookup("SURREALDB_DATABASE") {
            config = config.with_database(db);
        }
        if lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            config = config.with_auth(AuthLevel::Root);
        }
        Some(config)
    }
}

/// SurrealDB connection handle for Session Stash
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Fresh in-memory database with the schema applied.
    #[instrument(skip_all)]
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB URL (`mem://`, `surrealkv://path`, `ws://host`)
    /// using the default namespace and database.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let db = open_client(url).await?;
        Self::finish(db, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
    }

    /// Connect to a local file-backed database under `dir`.
    pub async fn local(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Self::connect(&format!("surrealkv://{}", dir.display())).await
    }

    /// Connect to a remote endpoint and sign in.
    ///
    /// ```ignore
    /// let config = CloudConfig::new("wss://stash.example.cloud", "svc", "secret");
    /// let handle = SurrealHandle::setup_cloud(config).await?;
    /// ```
    #[instrument(skip(config), fields(endpoint = %config.endpoint, auth = ?config.auth))]
    pub async fn setup_cloud(config: CloudConfig) -> StoreResult<Self> {
        let db = open_client(&config.endpoint).await?;

        let signed_in = match config.auth {
            AuthLevel::Root => {
                db.signin(Root {
                    username: &config.username,
                    password: &config.password,
                })
                .await
            }
            AuthLevel::Database => {
                db.signin(Database {
                    namespace: &config.namespace,
                    database: &config.database,
                    username: &config.username,
                    password: &config.password,
                })
                .await
            }
        };
        signed_in.map_err(|e| {
            StoreError::Backend(format!("sign-in as {:?} user failed: {e}", config.auth))
        })?;

        Self::finish(db, &config.namespace, &config.database).await
    }

    /// Resolve a connection the same way every binary does:
    ///
    /// 1. `url` if given (usually `SURREALDB_URL`)
    /// 2. credentials from the environment ([`CloudConfig::from_env`])
    /// 3. local persistence in `<data_dir>/db`
    pub async fn setup_from_env(url: Option<&str>, data_dir: &Path) -> StoreResult<Self> {
        if let Some(url) = url {
            return Self::connect(url).await;
        }
        if let Some(config) = CloudConfig::from_env() {
            return Self::setup_cloud(config).await;
        }
        let path = data_dir.join("db");
        info!(path = %path.display(), "no SurrealDB endpoint configured, using local store");
        Self::local(&path).await
    }

    async fn finish(db: Surreal<Any>, namespace: &str, database: &str) -> StoreResult<Self> {
        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| StoreError::Backend(format!("selecting {namespace}/{database}: {e}")))?;
        migrations::init_schema(&db).await?;
        info!(namespace, database, "SurrealDB ready");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}

async fn open_client(endpoint: &str) -> StoreResult<Surreal<Any>> {
    surrealdb::engine::any::connect(endpoint)
        .await
        .map_err(|e| StoreError::Backend(format!("failed to connect to {endpoint}: {e}")))
}
