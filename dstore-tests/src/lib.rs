/// Test utilities and helpers for dstore testing
///
/// This module wires a client to a fresh in-memory emulator and provides
/// generators for keys and entities.

use anyhow::Context;
use dstore_client::{ClientConfig, Datastore, Entity, Key, Requests};
use dstore_emulator::{Emulator, EmulatorConfig};
use std::sync::{Arc, Once};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Project id every test client uses
pub const TEST_PROJECT: &str = "dstore-test";

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_test_writer()
            .try_init();
    });
}

/// Client plus the emulator it talks to
pub struct TestDatastore {
    pub datastore: Datastore,
    pub emulator: Arc<Emulator>,
}

impl TestDatastore {
    /// Create a client against an emulator with default settings
    pub fn new() -> Self {
        Self::with_config(EmulatorConfig::default())
    }

    /// Create a client against an emulator with custom batch sizes
    pub fn with_config(config: EmulatorConfig) -> Self {
        Self::try_with_config(config).expect("Failed to create test datastore")
    }

    pub fn try_with_config(config: EmulatorConfig) -> anyhow::Result<Self> {
        init_tracing();
        let emulator = Arc::new(Emulator::with_config(config).context("emulator config")?);
        let datastore = Datastore::new(
            ClientConfig::new()
                .with_project_id(TEST_PROJECT)
                .with_api_endpoint("localhost:8081"),
            emulator.clone(),
        )
        .context("client config")?;

        Ok(Self { datastore, emulator })
    }

    /// Same as `new` but with every key and query defaulting to `namespace`
    pub fn in_namespace(namespace: &str) -> Self {
        init_tracing();
        let emulator = Arc::new(Emulator::new());
        let datastore = Datastore::new(
            ClientConfig::new()
                .with_project_id(TEST_PROJECT)
                .with_namespace(namespace),
            emulator.clone(),
        )
        .expect("Failed to create client");

        Self { datastore, emulator }
    }

    /// A second client sharing this emulator
    pub fn another_client(&self) -> Datastore {
        self.datastore.clone()
    }

    /// Upsert `count` generated entities of `kind`, ids 1..=count
    pub async fn seed(&self, kind: &str, count: usize) -> Vec<Key> {
        let mut gen = MockEntityGenerator::new(kind);
        let entities: Vec<Entity> = (0..count).map(|_| gen.next_entity()).collect();
        let keys = entities.iter().map(|e| e.key.clone()).collect();
        self.datastore
            .upsert(entities)
            .await
            .expect("Failed to seed entities");
        debug!(kind, count, "Seeded test entities");
        keys
    }
}

impl Default for TestDatastore {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock entity generator for testing
pub struct MockEntityGenerator {
    kind: String,
    counter: i64,
}

impl MockEntityGenerator {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            counter: 0,
        }
    }

    /// Next complete key (ids start at 1)
    pub fn next_key(&mut self) -> Key {
        self.counter += 1;
        Key::with_id(self.kind.clone(), self.counter).expect("Invalid generated key")
    }

    /// Entity with `index`, `group` (index mod 5), `even` and `label` properties
    pub fn next_entity(&mut self) -> Entity {
        let key = self.next_key();
        let idx = self.counter;
        Entity::new(key)
            .set("index", idx)
            .set("group", idx % 5)
            .set("even", idx % 2 == 0)
            .set("label", format!("item{:04}", idx))
    }

    /// Entity carrying a `data` string of `bytes` length, left out of indexes
    pub fn sized_entity(&mut self, bytes: usize) -> Entity {
        self.next_entity()
            .set("data", "x".repeat(bytes))
            .exclude_from_indexes(["data"])
    }
}

/// Ids of the entities' keys, in order
pub fn ids(entities: &[Entity]) -> Vec<i64> {
    entities.iter().filter_map(|e| e.key.id()).collect()
}
