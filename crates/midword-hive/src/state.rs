use crate::collab::{Embedder, VectorIndex};
use crate::store::Store;
use midword_core::config::Config;
use midword_core::events::Aggregates;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use typed_builder::TypedBuilder;

#[derive(Clone, TypedBuilder)]
pub struct AppState {
    pub store: Store,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    #[builder(default)]
    pub config: Config,
    #[builder(default = Arc::new(Aggregates::new(&config.leaderboard)))]
    pub aggregates: Arc<Aggregates>,
    /// Required on admin routes when set.
    #[builder(default)]
    pub admin_secret: Option<String>,
    /// Serializes rotations within this process.
    #[builder(default)]
    pub rotation_lock: Arc<Mutex<()>>,
}

impl AppState {
    /// Replays every stored guess and user into the in-memory aggregates.
    pub async fn rebuild_aggregates(&self) -> Result<(), sqlx::Error> {
        let guesses = self.store.list_guesses().await?;
        let users = self.store.list_users().await?;
        info!(
            "🔁 Replaying {} guesses and {} users into aggregates",
            guesses.len(),
            users.len()
        );
        self.aggregates.rebuild(&guesses, &users);
        Ok(())
    }
}
