/// Datastore client
use crate::request::Requests;
use crate::transaction::Transaction;
use async_trait::async_trait;
use dstore_core::{
    ClientConfig, CommitMode, CommitRequest, CommitResponse, Coordinates, Credentials,
    DatastoreRpc, Double, GeoPoint, Int, Key, KeyOptions, Mutation, PathToken, Query,
    QueryOptions, ReadOptions, Result, TransactionOptions, Value,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

struct DatastoreInner {
    rpc: Arc<dyn DatastoreRpc>,
    project_id: String,
    namespace: Option<String>,
    base_url: String,
    custom_endpoint: bool,
    credentials: Option<Credentials>,
}

/// Entry point for keys, queries, transactions and immediate reads/writes.
///
/// Cloning is cheap; clones share the same service handle.
///
/// # Example
/// ```no_run
/// # use std::sync::Arc;
/// # use dstore_client::{ClientConfig, Datastore, DatastoreRpc, Requests, path};
/// # async fn example(service: Arc<dyn DatastoreRpc>) -> dstore_client::Result<()> {
/// let datastore = Datastore::new(ClientConfig::new().with_project_id("my-project"), service)?;
///
/// let key = datastore.key(path!["Task", "sample"])?;
/// datastore.save((key.clone(), serde_json::json!({ "done": false }))).await?;
/// let task = datastore.get(&key).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<DatastoreInner>,
}

impl Datastore {
    /// Create a client over a service handle
    pub fn new(config: ClientConfig, rpc: Arc<dyn DatastoreRpc>) -> Result<Self> {
        let resolved = config.resolve()?;
        info!(
            project_id = %resolved.project_id,
            base_url = %resolved.base_url,
            namespace = ?resolved.namespace,
            "Created datastore client"
        );
        Ok(Self {
            inner: Arc::new(DatastoreInner {
                rpc,
                project_id: resolved.project_id,
                namespace: resolved.namespace,
                base_url: resolved.base_url,
                custom_endpoint: resolved.custom_endpoint,
                credentials: resolved.credentials,
            }),
        })
    }

    /// Default namespace applied to keys and queries
    pub fn namespace(&self) -> Option<&str> {
        self.inner.namespace.as_deref()
    }

    /// Service host this client was configured for
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// True when the host came from an explicit endpoint or the emulator variable
    pub fn has_custom_endpoint(&self) -> bool {
        self.inner.custom_endpoint
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.inner.credentials.as_ref()
    }

    /// Build a key from a flat path in the default namespace
    pub fn key<I, T>(&self, path: I) -> Result<Key>
    where
        I: IntoIterator<Item = T>,
        T: Into<PathToken>,
    {
        let options = KeyOptions {
            namespace: self.inner.namespace.clone(),
            path: path.into_iter().map(Into::into).collect(),
        };
        Key::with_options(options)
    }

    /// Build a key from options; the default namespace applies when none is given
    pub fn key_with_options(&self, mut options: KeyOptions) -> Result<Key> {
        if options.namespace.is_none() {
            options.namespace = self.inner.namespace.clone();
        }
        Key::with_options(options)
    }

    /// Query over a kind in the default namespace
    pub fn create_query(&self, kind: impl Into<String>) -> Query {
        match &self.inner.namespace {
            Some(ns) => Query::in_namespace(ns.clone(), kind),
            None => Query::new(kind),
        }
    }

    /// Query over a kind in an explicit namespace
    pub fn create_query_in(&self, namespace: impl Into<String>, kind: impl Into<String>) -> Query {
        Query::in_namespace(namespace, kind)
    }

    /// New read-write transaction; call `run` before using it
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.clone(), TransactionOptions::default())
    }

    pub fn transaction_with_options(&self, options: TransactionOptions) -> Transaction {
        Transaction::new(self.clone(), options)
    }

    /// Integer value wrapper
    pub fn int(value: i64) -> Int {
        Int::new(value)
    }

    /// Integer value wrapper parsed from a decimal string
    pub fn int_from_str(value: &str) -> Result<Int> {
        Int::parse(value)
    }

    /// Double value wrapper
    pub fn double(value: f64) -> Double {
        Double::new(value)
    }

    /// Geographic point; coordinates are range-checked
    pub fn geo_point(coordinates: Coordinates) -> Result<GeoPoint> {
        GeoPoint::new(coordinates)
    }

    pub fn is_int(value: &Value) -> bool {
        value.is_int()
    }

    pub fn is_double(value: &Value) -> bool {
        value.is_double()
    }

    pub fn is_geo_point(value: &Value) -> bool {
        value.is_geo_point()
    }

    pub fn is_key(value: &Value) -> bool {
        value.is_key()
    }
}

impl fmt::Debug for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datastore")
            .field("project_id", &self.inner.project_id)
            .field("namespace", &self.inner.namespace)
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

#[async_trait]
impl Requests for Datastore {
    type Output = CommitResponse;

    fn rpc(&self) -> &Arc<dyn DatastoreRpc> {
        &self.inner.rpc
    }

    fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    fn read_options(&self, options: &QueryOptions) -> Result<ReadOptions> {
        Ok(ReadOptions {
            consistency: options.consistency,
            transaction: None,
        })
    }

    /// Commit immediately as one non-transactional batch
    async fn submit(&self, mutations: Vec<Mutation>) -> Result<CommitResponse> {
        if mutations.is_empty() {
            return Ok(CommitResponse::default());
        }
        let count = mutations.len();
        let response = self
            .inner
            .rpc
            .commit(CommitRequest {
                project_id: self.inner.project_id.clone(),
                mode: CommitMode::NonTransactional,
                mutations,
            })
            .await?;
        debug!(
            mutations = count,
            index_updates = response.index_updates,
            "Committed writes"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dstore_emulator::Emulator;

    fn datastore(namespace: Option<&str>) -> Datastore {
        let mut config = ClientConfig::new()
            .with_project_id("unit-test")
            .with_api_endpoint("localhost:8081");
        if let Some(ns) = namespace {
            config = config.with_namespace(ns);
        }
        Datastore::new(config, Arc::new(Emulator::new())).unwrap()
    }

    #[test]
    fn test_keys_use_default_namespace() {
        let ds = datastore(Some("tenant"));
        let key = ds.key(dstore_core::path!["Task", 1]).unwrap();
        assert_eq!(key.namespace(), Some("tenant"));

        let explicit = ds
            .key_with_options(KeyOptions::new(dstore_core::path!["Task", 1]).namespace("other"))
            .unwrap();
        assert_eq!(explicit.namespace(), Some("other"));
    }

    #[test]
    fn test_queries_use_default_namespace() {
        let ds = datastore(Some("tenant"));
        assert_eq!(ds.create_query("Task").namespace(), Some("tenant"));
        assert_eq!(ds.create_query_in("x", "Task").namespace(), Some("x"));
        assert_eq!(datastore(None).create_query("Task").namespace(), None);
    }

    #[test]
    fn test_value_helpers() {
        assert!(Datastore::is_int(&Datastore::int(7).into()));
        assert!(Datastore::is_double(&Datastore::double(1.5).into()));
        assert!(!Datastore::is_int(&Value::from(1.5)));
        let point = Datastore::geo_point(Coordinates {
            latitude: 40.6,
            longitude: -73.9,
        })
        .unwrap();
        assert!(Datastore::is_geo_point(&point.into()));
        assert!(Datastore::geo_point(Coordinates {
            latitude: 91.0,
            longitude: 0.0,
        })
        .is_err());
        assert_eq!(Datastore::int_from_str("9007199254740993").unwrap().value(), 9007199254740993);
    }

    #[test]
    fn test_endpoint_settings() {
        let ds = datastore(None);
        assert_eq!(ds.base_url(), "localhost:8081");
        assert!(ds.has_custom_endpoint());
        assert!(ds.credentials().is_none());
    }

    #[test]
    fn test_missing_project_id_is_rejected() {
        let config = ClientConfig::new().with_api_endpoint("localhost:8081");
        // Only fails when no project id is present in the environment either
        if std::env::var(dstore_core::config::PROJECT_ID_ENV).is_err()
            && std::env::var(dstore_core::config::GCLOUD_PROJECT_ENV).is_err()
        {
            assert!(Datastore::new(config, Arc::new(Emulator::new())).is_err());
        }
    }
}
