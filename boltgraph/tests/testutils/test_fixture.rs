//! Test fixture for BoltGraph integration tests
//!
//! Each fixture owns a sled database in its own temporary directory, so
//! tests never share state.

use boltgraph::config::DatabaseConfig;
use boltgraph::{GraphDatabase, PropertyMap, QueryResult, SessionTransactionState, Value};
use std::sync::Arc;

pub struct TestFixture {
    db: Arc<GraphDatabase>,
    config: DatabaseConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestFixture {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp_dir = tempfile::tempdir()?;
        let config = DatabaseConfig {
            data_dir: temp_dir.path().join(format!("graph_{}", fastrand::u64(..))),
            sync_commits: false,
            ..DatabaseConfig::default()
        };
        let db = GraphDatabase::open(&config)?;
        Ok(Self {
            db,
            config,
            _temp_dir: temp_dir,
        })
    }

    pub fn db(&self) -> &Arc<GraphDatabase> {
        &self.db
    }

    pub fn session(&self) -> SessionTransactionState {
        self.db.session()
    }

    /// Run one statement in an implicit transaction
    pub fn query(&self, query: &str) -> Result<QueryResult, String> {
        self.db
            .execute(query, &PropertyMap::new())
            .map_err(|e| e.to_string())
    }

    pub fn query_with(&self, query: &str, params: &[(&str, Value)]) -> Result<QueryResult, String> {
        let params: PropertyMap = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.db.execute(query, &params).map_err(|e| e.to_string())
    }

    /// Number of committed nodes carrying `label`
    pub fn count(&self, label: &str) -> i64 {
        let result = self
            .query(&format!("MATCH (n:{}) RETURN count(n) AS c", label))
            .expect("count query failed");
        result
            .get(0, "c")
            .and_then(Value::as_integer)
            .expect("count returned no integer")
    }

    /// Close the database and open it again from disk
    pub fn reopen(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.db.shutdown()?;
        let placeholder = GraphDatabase::memory()?;
        drop(std::mem::replace(&mut self.db, placeholder));
        self.db = GraphDatabase::open(&self.config)?;
        Ok(())
    }
}
