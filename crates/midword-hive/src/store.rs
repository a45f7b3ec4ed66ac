use chrono::{DateTime, Utc};
use midword_core::guess::{Attempt, Guess};
use midword_core::matches::{Midpoint, MidpointKey, ScoredMatch};
use midword_core::round::{Round, RotationPlan, RoundMutation};
use midword_core::types::{
    normalize_title, Embedding, EmbeddingId, Namespace, NamespaceId, RoundId, User, UserId,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::types::Json;
use sqlx::{Executor, Row};
use tracing::debug;

pub const LAST_ROTATION_SLOT: &str = "last_rotation_slot";

/// A guess row with its compare-and-swap token.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedGuess {
    pub guess: Guess,
    pub version: i64,
}

/// Account fields of a user, set by an administrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub anonymous: bool,
    #[serde(default)]
    pub captured: bool,
}

/// User rows around a committed guess write.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessCommit {
    pub version: i64,
    pub user_before: User,
    pub user_after: User,
}

#[derive(Clone)]
pub struct Store {
    pub db: SqlitePool,
}

impl Store {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    // --- Namespaces ---

    pub async fn insert_namespace(&self, ns: &Namespace) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO namespaces (id, name, creator_id, public) VALUES (?, ?, ?, ?)")
            .bind(ns.id)
            .bind(&ns.name)
            .bind(&ns.creator_id)
            .bind(ns.public)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn get_namespace(&self, id: NamespaceId) -> Result<Option<Namespace>, sqlx::Error> {
        sqlx::query("SELECT id, name, creator_id, public FROM namespaces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .map(|r| -> Result<Namespace, sqlx::Error> {
                Ok(Namespace {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    creator_id: r.try_get("creator_id")?,
                    public: r.try_get("public")?,
                })
            })
            .transpose()
    }

    // --- Users ---

    /// Returns the user, creating an anonymous account on first sight.
    pub async fn ensure_user(&self, id: &str, now: DateTime<Utc>) -> Result<User, sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, anonymous, captured, score, created_at) VALUES (?, 1, 0, 0, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(now)
        .execute(&self.db)
        .await?;

        fetch_user(&self.db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Sets the account fields of a user, creating the row if needed. The
    /// score of record is left alone. Returns the row before and after.
    pub async fn update_profile(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<(Option<User>, User), sqlx::Error> {
        let mut tx = self.db.begin().await?;
        let before = fetch_user(&mut *tx, &profile.user_id).await?;

        sqlx::query(
            "INSERT INTO users (id, display_name, anonymous, captured, score, created_at, version)
             VALUES (?, ?, ?, ?, 0, ?, 1)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                anonymous = excluded.anonymous,
                captured = excluded.captured,
                version = users.version + 1",
        )
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(profile.anonymous)
        .bind(profile.captured)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let after = fetch_user(&mut *tx, &profile.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;
        Ok((before, after))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        fetch_user(&self.db, id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query(&format!("SELECT {} FROM users", USER_COLUMNS))
        .fetch_all(&self.db)
        .await?
        .iter()
        .map(user_from_row)
        .collect()
    }

    // --- Embeddings ---

    /// Inserts unless the title already exists in the namespace; returns the stored row.
    pub async fn insert_embedding(&self, emb: &Embedding) -> Result<Embedding, sqlx::Error> {
        sqlx::query(
            "INSERT INTO embeddings (id, namespace_id, title, title_norm, vector) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(namespace_id, title_norm) DO NOTHING",
        )
        .bind(emb.id)
        .bind(emb.namespace_id)
        .bind(emb.title.trim())
        .bind(normalize_title(&emb.title))
        .bind(Json(&emb.vector))
        .execute(&self.db)
        .await?;

        self.find_embedding(emb.namespace_id, &emb.title)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Case-insensitive, trimmed title lookup.
    pub async fn find_embedding(
        &self,
        namespace_id: NamespaceId,
        title: &str,
    ) -> Result<Option<Embedding>, sqlx::Error> {
        sqlx::query(
            "SELECT id, namespace_id, title, vector FROM embeddings WHERE namespace_id = ? AND title_norm = ?",
        )
        .bind(namespace_id)
        .bind(normalize_title(title))
        .fetch_optional(&self.db)
        .await?
        .as_ref()
        .map(embedding_from_row)
        .transpose()
    }

    pub async fn list_embeddings(
        &self,
        namespace_id: NamespaceId,
    ) -> Result<Vec<Embedding>, sqlx::Error> {
        sqlx::query("SELECT id, namespace_id, title, vector FROM embeddings WHERE namespace_id = ?")
            .bind(namespace_id)
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(embedding_from_row)
            .collect()
    }

    // --- Rounds ---

    pub async fn insert_round(&self, round: &Round) -> Result<(), sqlx::Error> {
        insert_round_with(&self.db, round).await
    }

    /// Inserts `round`. When it is active, every other active round of its
    /// namespace is ended in the same transaction.
    pub async fn create_round(&self, round: &Round, now: DateTime<Utc>) -> Result<(), sqlx::Error> {
        let mut tx = self.db.begin().await?;
        if round.active {
            let ended = sqlx::query(
                "UPDATE rounds SET active = 0, ended_at = ? WHERE namespace_id = ? AND active = 1",
            )
            .bind(now)
            .bind(round.namespace_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if ended > 0 {
                debug!("Ended {} active round(s) in {}", ended, round.namespace_id);
            }
        }
        insert_round_with(&mut *tx, round).await?;
        tx.commit().await
    }

    pub async fn get_round(&self, id: RoundId) -> Result<Option<Round>, sqlx::Error> {
        sqlx::query(&format!("SELECT {} FROM rounds WHERE id = ?", ROUND_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .as_ref()
            .map(round_from_row)
            .transpose()
    }

    pub async fn active_rounds(&self) -> Result<Vec<Round>, sqlx::Error> {
        sqlx::query(&format!("SELECT {} FROM rounds WHERE active = 1", ROUND_COLUMNS))
            .fetch_all(&self.db)
            .await?
            .iter()
            .map(round_from_row)
            .collect()
    }

    /// Most recently started active round of a namespace.
    pub async fn active_round(&self, namespace_id: NamespaceId) -> Result<Option<Round>, sqlx::Error> {
        sqlx::query(&format!(
            "SELECT {} FROM rounds WHERE namespace_id = ? AND active = 1 ORDER BY started_at DESC LIMIT 1",
            ROUND_COLUMNS
        ))
        .bind(namespace_id)
        .fetch_optional(&self.db)
        .await?
        .as_ref()
        .map(round_from_row)
        .transpose()
    }

    /// Applies every mutation of a rotation atomically. A `slot` is recorded
    /// as the last rotated slot in the same transaction.
    pub async fn apply_rotation(
        &self,
        plan: &RotationPlan,
        slot: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.db.begin().await?;

        for m in &plan.mutations {
            match m {
                RoundMutation::Deactivate { round_id, ended_at } => {
                    sqlx::query("UPDATE rounds SET active = 0, ended_at = ? WHERE id = ?")
                        .bind(ended_at)
                        .bind(round_id)
                        .execute(&mut *tx)
                        .await?;
                }
                RoundMutation::Activate {
                    round_id,
                    started_at,
                } => {
                    sqlx::query("UPDATE rounds SET active = 1, started_at = ? WHERE id = ?")
                        .bind(started_at)
                        .bind(round_id)
                        .execute(&mut *tx)
                        .await?;
                }
                RoundMutation::Spawn(round) => {
                    insert_round_with(&mut *tx, round).await?;
                }
                RoundMutation::Repoint {
                    round_id,
                    next_round_id,
                } => {
                    sqlx::query("UPDATE rounds SET next_round_id = ? WHERE id = ?")
                        .bind(next_round_id)
                        .bind(round_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        if let Some(slot) = slot {
            set_meta_with(&mut *tx, LAST_ROTATION_SLOT, slot).await?;
        }
        tx.commit().await
    }

    // --- Guesses ---

    pub async fn get_guess(
        &self,
        round_id: RoundId,
        user_id: &str,
    ) -> Result<Option<VersionedGuess>, sqlx::Error> {
        sqlx::query(
            "SELECT round_id, user_id, attempts, score, submitted_at, version
             FROM guesses WHERE round_id = ? AND user_id = ?",
        )
        .bind(round_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .map(|r| -> Result<VersionedGuess, sqlx::Error> {
            Ok(VersionedGuess {
                guess: guess_from_row(&r)?,
                version: r.try_get("version")?,
            })
        })
        .transpose()
    }

    /// Every guess with the namespace of its round.
    pub async fn list_guesses(&self) -> Result<Vec<(NamespaceId, Guess)>, sqlx::Error> {
        sqlx::query(
            "SELECT g.round_id, g.user_id, g.attempts, g.score, g.submitted_at, r.namespace_id
             FROM guesses g JOIN rounds r ON r.id = g.round_id",
        )
        .fetch_all(&self.db)
        .await?
        .iter()
        .map(|r| -> Result<(NamespaceId, Guess), sqlx::Error> {
            Ok((r.try_get("namespace_id")?, guess_from_row(r)?))
        })
        .collect()
    }

    /// Writes `guess` if the stored row still has version `expected`
    /// (`None` = no row yet) and moves the user's score of record by the
    /// score difference, in one transaction.
    ///
    /// Returns `None` when another writer got there first or the round is no
    /// longer active.
    pub async fn commit_guess(
        &self,
        guess: &Guess,
        expected: Option<i64>,
        score_delta: i64,
    ) -> Result<Option<GuessCommit>, sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let written = match expected {
            None => sqlx::query(
                "INSERT INTO guesses (round_id, user_id, attempts, score, submitted_at, version)
                 SELECT ?, ?, ?, ?, ?, 1
                 WHERE EXISTS (SELECT 1 FROM rounds WHERE id = ? AND active = 1)
                 ON CONFLICT(round_id, user_id) DO NOTHING",
            )
            .bind(guess.round_id)
            .bind(&guess.user_id)
            .bind(Json(&guess.attempts))
            .bind(guess.score)
            .bind(guess.submitted_at)
            .bind(guess.round_id)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            Some(v) => sqlx::query(
                "UPDATE guesses SET attempts = ?, score = ?, submitted_at = ?, version = version + 1
                 WHERE round_id = ? AND user_id = ? AND version = ?
                   AND EXISTS (SELECT 1 FROM rounds WHERE id = guesses.round_id AND active = 1)",
            )
            .bind(Json(&guess.attempts))
            .bind(guess.score)
            .bind(guess.submitted_at)
            .bind(guess.round_id)
            .bind(&guess.user_id)
            .bind(v)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        };

        if written == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("UPDATE users SET score = score + ?, version = version + 1 WHERE id = ?")
            .bind(score_delta)
            .bind(&guess.user_id)
            .execute(&mut *tx)
            .await?;

        let user_after = fetch_user(&mut *tx, &guess.user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        tx.commit().await?;

        let mut user_before = user_after.clone();
        user_before.score -= score_delta;
        user_before.version -= 1;

        Ok(Some(GuessCommit {
            version: expected.map_or(1, |v| v + 1),
            user_before,
            user_after,
        }))
    }

    // --- Midpoints ---

    pub async fn get_midpoint(&self, key: &MidpointKey) -> Result<Option<Midpoint>, sqlx::Error> {
        sqlx::query(
            "SELECT id, cache_id, namespace_id, left_word, right_word, left_embedding,
                    right_embedding, midpoint_embedding, top_matches, updated_at
             FROM midpoints WHERE cache_id = ?",
        )
        .bind(key.cache_id())
        .fetch_optional(&self.db)
        .await?
        .as_ref()
        .map(midpoint_from_row)
        .transpose()
    }

    /// Overwrites embeddings and matches for the key, keeping the existing row id.
    pub async fn upsert_midpoint(&self, mp: &Midpoint) -> Result<Midpoint, sqlx::Error> {
        sqlx::query(
            "INSERT INTO midpoints (id, cache_id, namespace_id, left_word, right_word, left_embedding,
                                    right_embedding, midpoint_embedding, top_matches, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(cache_id) DO UPDATE SET
                left_embedding = excluded.left_embedding,
                right_embedding = excluded.right_embedding,
                midpoint_embedding = excluded.midpoint_embedding,
                top_matches = excluded.top_matches,
                updated_at = excluded.updated_at",
        )
        .bind(mp.id)
        .bind(&mp.cache_id)
        .bind(mp.namespace_id)
        .bind(&mp.left)
        .bind(&mp.right)
        .bind(Json(&mp.left_embedding))
        .bind(Json(&mp.right_embedding))
        .bind(Json(&mp.midpoint_embedding))
        .bind(Json(&mp.top_matches))
        .bind(mp.updated_at)
        .execute(&self.db)
        .await?;

        self.get_midpoint(&MidpointKey::new(mp.namespace_id, &mp.left, &mp.right))
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn count_midpoints(&self, namespace_id: NamespaceId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM midpoints WHERE namespace_id = ?")
            .bind(namespace_id)
            .fetch_one(&self.db)
            .await
    }

    // --- Meta ---

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
    }
}

async fn set_meta_with<'e, E>(executor: E, key: &str, value: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

const USER_COLUMNS: &str = "id, display_name, anonymous, captured, score, created_at, version";

const ROUND_COLUMNS: &str = "id, namespace_id, left_word, right_word, matches, active, started_at, ended_at, next_round_id, created_at";

async fn insert_round_with<'e, E>(executor: E, round: &Round) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!(
        "INSERT INTO rounds ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        ROUND_COLUMNS
    ))
    .bind(round.id)
    .bind(round.namespace_id)
    .bind(&round.left)
    .bind(&round.right)
    .bind(Json(&round.matches))
    .bind(round.active)
    .bind(round.started_at)
    .bind(round.ended_at)
    .bind(round.next_round_id)
    .bind(round.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

async fn fetch_user<'e, E>(executor: E, id: &str) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .as_ref()
    .map(user_from_row)
    .transpose()
}

fn user_from_row(r: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: r.try_get("id")?,
        display_name: r.try_get("display_name")?,
        anonymous: r.try_get("anonymous")?,
        captured: r.try_get("captured")?,
        score: r.try_get("score")?,
        created_at: r.try_get("created_at")?,
        version: r.try_get("version")?,
    })
}

fn embedding_from_row(r: &SqliteRow) -> Result<Embedding, sqlx::Error> {
    let Json(vector): Json<Vec<f32>> = r.try_get("vector")?;
    Ok(Embedding {
        id: r.try_get("id")?,
        namespace_id: r.try_get("namespace_id")?,
        title: r.try_get("title")?,
        vector,
    })
}

fn round_from_row(r: &SqliteRow) -> Result<Round, sqlx::Error> {
    let Json(matches): Json<Vec<EmbeddingId>> = r.try_get("matches")?;
    Ok(Round {
        id: r.try_get("id")?,
        namespace_id: r.try_get("namespace_id")?,
        left: r.try_get("left_word")?,
        right: r.try_get("right_word")?,
        matches,
        active: r.try_get("active")?,
        started_at: r.try_get("started_at")?,
        ended_at: r.try_get("ended_at")?,
        next_round_id: r.try_get("next_round_id")?,
        created_at: r.try_get("created_at")?,
    })
}

fn guess_from_row(r: &SqliteRow) -> Result<Guess, sqlx::Error> {
    let Json(attempts): Json<Vec<Attempt>> = r.try_get("attempts")?;
    Ok(Guess {
        round_id: r.try_get("round_id")?,
        user_id: r.try_get("user_id")?,
        attempts,
        score: r.try_get("score")?,
        submitted_at: r.try_get("submitted_at")?,
    })
}

fn midpoint_from_row(r: &SqliteRow) -> Result<Midpoint, sqlx::Error> {
    let Json(left_embedding): Json<Vec<f32>> = r.try_get("left_embedding")?;
    let Json(right_embedding): Json<Vec<f32>> = r.try_get("right_embedding")?;
    let Json(midpoint_embedding): Json<Vec<f32>> = r.try_get("midpoint_embedding")?;
    let Json(top_matches): Json<Vec<ScoredMatch>> = r.try_get("top_matches")?;
    Ok(Midpoint {
        id: r.try_get("id")?,
        cache_id: r.try_get("cache_id")?,
        namespace_id: r.try_get("namespace_id")?,
        left: r.try_get("left_word")?,
        right: r.try_get("right_word")?,
        left_embedding,
        right_embedding,
        midpoint_embedding,
        top_matches,
        updated_at: r.try_get("updated_at")?,
    })
}
