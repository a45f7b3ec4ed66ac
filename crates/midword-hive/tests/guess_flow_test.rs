mod common;

use chrono::Duration;
use common::{fixture, t0, HOT_COLD_MATCHES};
use midword_core::consts::TOTAL_GUESSES_COUNTER;
use midword_core::counter::round_counter;
use midword_core::error::GuessRejection;
use midword_core::events::Aggregates;
use midword_core::guess::GuessState;
use midword_hive::engine::{guess_view, submit_guess};
use midword_hive::error::AppError;
use midword_hive::state::AppState;
use midword_hive::store::UserProfile;
use midword_hive::users::update_profile;
use std::sync::Arc;

#[tokio::test]
async fn test_guesses_score_and_feed_aggregates() {
    let fx = fixture().await;
    let round = fx.active_round().await;
    let state = &fx.state;

    let first = submit_guess(state, Some("ada"), round.id, "tepid", t0())
        .await
        .unwrap();
    assert_eq!(first.rank, Some(0));
    assert_eq!(first.delta, 5);

    let second = submit_guess(state, Some("ada"), round.id, " Mild ", t0())
        .await
        .unwrap();
    assert_eq!(second.rank, Some(1));
    assert_eq!(second.score, 9);

    let miss = submit_guess(state, Some("ada"), round.id, "banana", t0())
        .await
        .unwrap();
    assert_eq!(miss.rank, None);
    assert_eq!(miss.score, 9);
    assert_eq!(miss.attempts_used, 3);

    let user = state.store.get_user("ada").await.unwrap().unwrap();
    assert_eq!(user.score, 9, "score of record moves with the guess");
    assert_eq!(user.version, 3);
    assert!(user.anonymous);

    let boards = &state.aggregates.leaderboards;
    assert_eq!(boards.round_total(round.id), 9);
    assert_eq!(boards.round_rank(round.id, "ada"), Some(1));
    assert_eq!(boards.global_rank("ada"), Some(1));

    let counters = &state.aggregates.counters;
    assert_eq!(counters.get(TOTAL_GUESSES_COUNTER), 3);
    assert_eq!(counters.get(&round_counter(round.id)), 3);

    let view = guess_view(state, "ada", round.id).await.unwrap();
    assert_eq!(view.state, GuessState::InProgress);
    assert_eq!(view.attempts_left, 6);
    assert_eq!(view.rank, Some(1));
}

#[tokio::test]
async fn test_unknown_title_resolves_through_index() {
    let fx = fixture().await;
    let round = fx.active_round().await;

    // "warmish" is not stored; its embedding sits next to "tepid".
    let out = submit_guess(&fx.state, Some("ada"), round.id, "warmish", t0())
        .await
        .unwrap();
    assert_eq!(out.rank, Some(0));

    // Nearest stored word of "zebra" is "banana", which is not a target.
    let out = submit_guess(&fx.state, Some("ada"), round.id, "zebra", t0())
        .await
        .unwrap();
    assert_eq!(out.rank, None);
}

#[tokio::test]
async fn test_rejections_leave_guess_untouched() {
    let fx = fixture().await;
    let round = fx.active_round().await;
    let state = &fx.state;

    submit_guess(state, Some("ada"), round.id, "tepid", t0())
        .await
        .unwrap();

    let cases = [
        (Some("ada"), "TEPID"),
        (Some("ada"), "hotter"),
        (Some("ada"), "warmish"),
        (None, "mild"),
    ];
    for (user, title) in cases {
        let err = submit_guess(state, user, round.id, title, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)), "{} gave {:?}", title, err);
    }

    let err = submit_guess(state, None, round.id, "mild", t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Rejected(GuessRejection::NotAuthenticated)
    ));

    let stored = state.store.get_guess(round.id, "ada").await.unwrap().unwrap();
    assert_eq!(stored.guess.attempts.len(), 1);
    assert_eq!(stored.guess.score, 5);
    assert_eq!(stored.version, 1);
    assert_eq!(state.aggregates.counters.get(TOTAL_GUESSES_COUNTER), 1);
}

#[tokio::test]
async fn test_inactive_and_missing_rounds() {
    let fx = fixture().await;
    let idle = fx.idle_round("hot", "cold").await;

    let err = submit_guess(&fx.state, Some("ada"), idle.id, "tepid", t0())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Rejected(GuessRejection::RoundNotActive)
    ));

    let err = submit_guess(&fx.state, Some("ada"), uuid::Uuid::new_v4(), "tepid", t0())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn test_full_set_submits_with_bonus() {
    let fx = fixture().await;
    let round = fx.active_round().await;
    let state = &fx.state;

    let mut last = None;
    for (i, title) in HOT_COLD_MATCHES.iter().enumerate() {
        last = Some(
            submit_guess(state, Some("ada"), round.id, title, t0() + Duration::minutes(i as i64))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();
    // 5+4+3+2+1 plus 9 - 5 remaining attempts.
    assert_eq!(last.bonus, 4);
    assert_eq!(last.score, 19);
    assert!(last.submitted);

    let err = submit_guess(state, Some("ada"), round.id, "cool", t0())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Rejected(_)));

    let stored = state.store.get_guess(round.id, "ada").await.unwrap().unwrap();
    assert_eq!(stored.guess.submitted_at, Some(t0() + Duration::minutes(4)));
    assert_eq!(state.store.get_user("ada").await.unwrap().unwrap().score, 19);
}

#[tokio::test]
async fn test_round_board_orders_by_score() {
    let fx = fixture().await;
    let round = fx.active_round().await;
    let state = &fx.state;

    for title in HOT_COLD_MATCHES {
        submit_guess(state, Some("finisher"), round.id, title, t0())
            .await
            .unwrap();
    }
    for title in ["tepid", "mild", "lukewarm"] {
        submit_guess(state, Some("partial"), round.id, title, t0())
            .await
            .unwrap();
    }

    let top = state.aggregates.leaderboards.top_round(round.id, 10);
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].user_id, "finisher");
    assert_eq!(top[0].score, 19);
    assert_eq!(top[1].score, 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attempts_never_lose_writes() {
    let fx = fixture().await;
    let round = fx.active_round().await;

    let round_id = round.id;
    let titles = ["cool", "crisp", "frosty", "fiery", "blazing", "banana", "violin"];
    let handles: Vec<_> = titles
        .iter()
        .map(|title| {
            let state = fx.state.clone();
            let title = title.to_string();
            tokio::spawn(async move {
                submit_guess(&state, Some("ada"), round_id, &title, t0()).await
            })
        })
        .collect();

    for h in handles {
        h.await.unwrap().unwrap();
    }

    let stored = fx
        .state
        .store
        .get_guess(round.id, "ada")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.guess.attempts.len(), titles.len());
    assert_eq!(stored.version, titles.len() as i64);
    assert_eq!(
        fx.state.aggregates.counters.get(&round_counter(round.id)),
        titles.len() as u64
    );
}

#[tokio::test]
async fn test_profile_changes_move_users_on_global_board() {
    let fx = fixture().await;
    let round = fx.active_round().await;
    let state = &fx.state;

    submit_guess(state, Some("ada"), round.id, "tepid", t0())
        .await
        .unwrap();
    submit_guess(state, Some("bob"), round.id, "mild", t0())
        .await
        .unwrap();
    let boards = &state.aggregates.leaderboards;
    assert_eq!(boards.global_rank("ada"), Some(1));

    let profile = |user: &str, anonymous: bool, captured: bool| UserProfile {
        user_id: user.into(),
        display_name: (!anonymous).then(|| user.to_uppercase()),
        anonymous,
        captured,
    };

    let bob = update_profile(state, &profile("bob", false, false), t0())
        .await
        .unwrap();
    assert!(!bob.anonymous);
    assert_eq!(bob.score, 4, "profile changes keep the score of record");
    assert_eq!(boards.global_rank("bob"), Some(1));
    assert_eq!(boards.global_rank("ada"), Some(2));

    update_profile(state, &profile("ada", true, true), t0())
        .await
        .unwrap();
    assert_eq!(boards.global_rank("ada"), Some(2));

    let err = update_profile(state, &profile("cy", false, true), t0())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let fresh = AppState::builder()
        .store(state.store.clone())
        .embedder(fx.embedder.clone())
        .index(state.index.clone())
        .aggregates(Arc::new(Aggregates::default()))
        .build();
    fresh.rebuild_aggregates().await.unwrap();
    for user in ["ada", "bob"] {
        assert_eq!(
            fresh.aggregates.leaderboards.global_rank(user),
            boards.global_rank(user)
        );
    }
}

#[tokio::test]
async fn test_rebuild_matches_live_aggregates() {
    let fx = fixture().await;
    let round = fx.active_round().await;

    for (user, title) in [("ada", "tepid"), ("ada", "mild"), ("bob", "mild"), ("cy", "banana")] {
        submit_guess(&fx.state, Some(user), round.id, title, t0())
            .await
            .unwrap();
    }

    let fresh = AppState::builder()
        .store(fx.state.store.clone())
        .embedder(fx.embedder.clone())
        .index(fx.state.index.clone())
        .aggregates(Arc::new(Aggregates::default()))
        .build();
    fresh.rebuild_aggregates().await.unwrap();

    let live = &fx.state.aggregates;
    let rebuilt = &fresh.aggregates;
    for user in ["ada", "bob", "cy"] {
        assert_eq!(
            live.leaderboards.round_rank(round.id, user),
            rebuilt.leaderboards.round_rank(round.id, user)
        );
        assert_eq!(
            live.leaderboards.global_rank(user),
            rebuilt.leaderboards.global_rank(user)
        );
    }
    assert_eq!(rebuilt.leaderboards.round_total(round.id), 13);
    assert_eq!(rebuilt.counters.get(TOTAL_GUESSES_COUNTER), 4);
}
