#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use midword_core::config::Config;
use midword_core::error::{MidwordError, MwResult};
use midword_core::round::Round;
use midword_core::types::{normalize_title, Embedding, EmbeddingId, Namespace, NamespaceId};
use midword_hive::collab::{Embedder, StoreIndex};
use midword_hive::db;
use midword_hive::state::AppState;
use midword_hive::store::Store;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

/// Unit vector at `deg` degrees in the hot/cold plane.
pub fn angle(deg: f32) -> Vec<f32> {
    let r = deg.to_radians();
    vec![r.cos(), r.sin(), 0.0, 0.0]
}

/// Stored namespace words, by angle from "hot" towards "cold".
pub const VOCAB: &[(&str, f32)] = &[
    ("hot", 0.0),
    ("cold", 90.0),
    ("tepid", 45.0),
    ("mild", 41.0),
    ("lukewarm", 51.0),
    ("temperate", 34.0),
    ("balmy", 58.0),
    ("cool", 70.0),
    ("crisp", 75.0),
    ("frosty", 85.0),
    ("fiery", 5.0),
    ("blazing", 10.0),
];

/// The five words nearest the hot/cold midpoint, best first.
pub const HOT_COLD_MATCHES: &[&str] = &["tepid", "mild", "lukewarm", "temperate", "balmy"];

/// In-process embedding service with a fixed vocabulary.
pub struct FakeEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        let mut vectors: HashMap<String, Vec<f32>> = VOCAB
            .iter()
            .map(|(w, deg)| (w.to_string(), angle(*deg)))
            .collect();
        // Off-vocabulary words that resolve through the index.
        vectors.insert("warmish".into(), angle(45.5));
        vectors.insert("zebra".into(), vec![0.0, 0.0, 0.9, 0.1]);
        Self {
            vectors,
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails the first `n` calls with a transient error.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> MwResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.failures_left.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_left.store(pending - 1, Ordering::SeqCst);
            return Err(MidwordError::Transient("embedder warming up".into()));
        }
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(&normalize_title(t))
                    .cloned()
                    .ok_or_else(|| MidwordError::Transient(format!("no vector for '{}'", t)))
            })
            .collect()
    }
}

pub struct Fixture {
    pub state: Arc<AppState>,
    pub embedder: Arc<FakeEmbedder>,
    pub namespace_id: NamespaceId,
    pub ids: HashMap<String, EmbeddingId>,
}

pub async fn fixture() -> Fixture {
    fixture_with(FakeEmbedder::new(), None).await
}

pub async fn fixture_with(embedder: FakeEmbedder, admin_secret: Option<&str>) -> Fixture {
    let pool = db::init_db("sqlite::memory:").await.unwrap();
    let store = Store::new(pool);

    let namespace_id = Uuid::new_v4();
    store
        .insert_namespace(&Namespace {
            id: namespace_id,
            name: "weather".into(),
            creator_id: "admin".into(),
            public: true,
        })
        .await
        .unwrap();

    let mut ids = HashMap::new();
    let extra = [
        ("banana", vec![0.0, 0.0, 1.0, 0.0]),
        ("violin", vec![0.0, 0.0, 0.0, 1.0]),
    ];
    let rows = VOCAB
        .iter()
        .map(|(w, deg)| (w.to_string(), angle(*deg)))
        .chain(extra.into_iter().map(|(w, v)| (w.to_string(), v)));
    for (title, vector) in rows {
        let stored = store
            .insert_embedding(&Embedding {
                id: Uuid::new_v4(),
                namespace_id,
                title: title.clone(),
                vector,
            })
            .await
            .unwrap();
        ids.insert(title, stored.id);
    }

    let mut config = Config::default();
    config.matching.retry_base_delay_ms = 1;

    let embedder = Arc::new(embedder);
    let state = Arc::new(
        AppState::builder()
            .store(store.clone())
            .embedder(embedder.clone())
            .index(Arc::new(StoreIndex::new(store)))
            .config(config)
            .admin_secret(admin_secret.map(str::to_string))
            .build(),
    );

    Fixture {
        state,
        embedder,
        namespace_id,
        ids,
    }
}

impl Fixture {
    pub fn id(&self, title: &str) -> EmbeddingId {
        self.ids[title]
    }

    /// Inserts an active hot/cold round targeting `HOT_COLD_MATCHES`.
    pub async fn active_round(&self) -> Round {
        let matches = HOT_COLD_MATCHES.iter().map(|w| self.id(w)).collect();
        let mut round = Round::new(self.namespace_id, "hot", "cold", matches, t0());
        round.active = true;
        round.started_at = Some(t0());
        self.state.store.create_round(&round, t0()).await.unwrap();
        round
    }

    /// Inserts an inactive round with the given words.
    pub async fn idle_round(&self, left: &str, right: &str) -> Round {
        let matches = HOT_COLD_MATCHES.iter().map(|w| self.id(w)).collect();
        let round = Round::new(self.namespace_id, left, right, matches, t0());
        self.state.store.insert_round(&round).await.unwrap();
        round
    }
}
