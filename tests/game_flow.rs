mod common;

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use common::{eventually, join, memory_state, open_room, score_of};
use live_quiz_back::{
    dao::{cache::results_key, models::SessionStatus, session_store::SessionStore},
    services::results_service,
};

fn session_id(frame: &serde_json::Value) -> Uuid {
    frame["sessionId"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .expect("session id")
}

#[tokio::test(start_paused = true)]
async fn correct_answer_with_time_left_scores_and_host_advances() {
    let (state, _store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-1", json!({})).await;
    let mut player = join(&state, code, "u1").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let opened = player.state_in("question").await;
    assert_eq!(opened["currentQuestionIndex"], 0);
    assert!(opened["question"].get("correctOptionIndex").is_none());

    tokio::time::advance(Duration::from_secs(20)).await;
    player
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "userId": "u1", "optionIndex": 1}),
        )
        .await;

    let settled = player.state_in("results").await;
    let score = score_of(&settled, "u1");
    assert!(score > 0 && score < 100, "score {score}");
    assert_eq!(settled["question"]["correctOptionIndex"], 1);
    assert_eq!(settled["yourAnswer"]["isCorrect"], true);

    host.send(
        &state,
        json!({"type": "request-next-question", "roomId": code}),
    )
    .await;
    let next = host.state_in("question").await;
    assert_eq!(next["currentQuestionIndex"], 1);
    assert_eq!(score_of(&next, "u1"), score);
}

#[tokio::test(start_paused = true)]
async fn last_answer_settles_without_waiting_for_the_timer() {
    let (state, _store) = memory_state().await;
    let (host, code) = open_room(&state, "quiz-1", json!({"allowAnswerChange": false})).await;
    let mut player = join(&state, code, "u1").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    player.state_in("question").await;

    let before = tokio::time::Instant::now();
    player
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 0}),
        )
        .await;
    let settled = player.state_in("results").await;
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(settled["yourAnswer"]["isCorrect"], false);
    assert_eq!(score_of(&settled, "u1"), 0);

    player
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
        )
        .await;
    let rejected = player.expect("error").await;
    assert_eq!(rejected["message"], "That action is not available right now.");
}

#[tokio::test(start_paused = true)]
async fn host_disconnect_closes_the_room_for_everyone() {
    let (state, store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-1", json!({})).await;
    let mut player = join(&state, code, "u1").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let opened = host.state_in("question").await;
    let session = session_id(&opened);
    player.state_in("question").await;

    host.disconnect(&state).await;

    let closed = player.expect("room-closed").await;
    assert_eq!(closed["reason"], "host-disconnected");
    eventually(|| {
        let state = state.clone();
        async move { !state.rooms().is_live(code) }
    })
    .await;
    eventually(|| {
        let store = store.clone();
        async move {
            store
                .find_session(session)
                .await
                .ok()
                .flatten()
                .is_some_and(|s| s.status == SessionStatus::Cancelled)
        }
    })
    .await;

    player
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
        )
        .await;
    let error = player.expect("error").await;
    assert_eq!(error["message"], "Something went wrong, please try again.");
}

#[tokio::test(start_paused = true)]
async fn finished_game_is_completed_and_results_match_history() {
    let (state, store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-1", json!({})).await;
    let mut ann = join(&state, code, "ann").await;
    let mut bob = join(&state, code, "bob").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let session = session_id(&ann.state_in("question").await);

    for question in 0..2 {
        bob.state_where(|f| f["gameState"] == "question" && f["currentQuestionIndex"] == question)
            .await;
        ann.send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
        )
        .await;
        bob.send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 3}),
        )
        .await;
        host.state_where(|f| f["gameState"] == "results" && f["currentQuestionIndex"] == question)
            .await;
        host.send(
            &state,
            json!({"type": "request-next-question", "roomId": code}),
        )
        .await;
    }

    let ended = host.state_in("end").await;
    assert!(ended.get("question").is_none());
    let ann_score = score_of(&ended, "ann");
    assert_eq!(ann_score, 200);

    eventually(|| {
        let store = store.clone();
        async move {
            store
                .find_session(session)
                .await
                .ok()
                .flatten()
                .is_some_and(|s| s.status == SessionStatus::Completed)
        }
    })
    .await;
    let backend = state.backend().await.unwrap();
    assert!(backend.cache.get(results_key(session)).await.unwrap().is_some());

    let results = results_service::load_results(&state, session).await.unwrap();
    let history = store.list_history(session).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(results.questions.len(), 2);
    assert!(results.incomplete_questions.is_empty());
    assert_eq!(results.standings[0].final_rank, 1);
    assert_eq!(u64::from(results.standings[0].final_score), ann_score);
    assert_eq!(results.standings[0].correct_answers, 2);
    assert_eq!(results.standings[1].final_score, 0);
    for breakdown in &results.questions {
        assert_eq!(breakdown.respondents, 2);
        assert_eq!(breakdown.correct_count, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn round_is_settled_once_when_the_timer_expires() {
    let (state, store) = memory_state().await;
    let (host, code) = open_room(&state, "quiz-1", json!({"allowAnswerChange": true})).await;
    let mut ann = join(&state, code, "ann").await;
    let _bob = join(&state, code, "bob").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let session = session_id(&ann.state_in("question").await);

    ann.send(
        &state,
        json!({"type": "submit-answer", "roomId": code, "optionIndex": 2}),
    )
    .await;
    ann.send(
        &state,
        json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
    )
    .await;

    // Nobody else answers; the question timer closes the round.
    let settled = ann.state_in("results").await;
    assert_eq!(settled["answerCounts"], json!([0, 1, 0, 0]));
    assert_eq!(settled["yourAnswer"]["isCorrect"], true);

    eventually(|| {
        let store = store.clone();
        async move { store.list_history(session).await.map_or(0, |h| h.len()) == 2 }
    })
    .await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    let history = store.list_history(session).await.unwrap();
    assert_eq!(history.len(), 2);
    let ann_record = history
        .iter()
        .find(|record| record.participant.storage_key() == "user:ann")
        .unwrap();
    assert_eq!(ann_record.attempts.len(), 2);
    assert!(ann_record.is_ultimately_correct);
    let bob_record = history
        .iter()
        .find(|record| record.participant.storage_key() == "user:bob")
        .unwrap();
    assert!(bob_record.attempts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn leaving_player_completes_the_round() {
    let (state, _store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-1", json!({})).await;
    let ann = join(&state, code, "ann").await;
    let mut bob = join(&state, code, "bob").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    bob.state_in("question").await;

    bob.send(
        &state,
        json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
    )
    .await;
    ann.disconnect(&state).await;

    let settled = host.state_in("results").await;
    let ann_view = common::participant(&settled, "ann").unwrap();
    assert_eq!(ann_view["isOnline"], false);
    assert_eq!(score_of(&settled, "bob"), 100);
}

#[tokio::test(start_paused = true)]
async fn rejoining_player_keeps_score_and_answer() {
    let (state, _store) = memory_state().await;
    let (host, code) = open_room(&state, "quiz-1", json!({"allowAnswerChange": true})).await;
    let mut ann = join(&state, code, "ann").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    ann.state_in("question").await;
    ann.send(
        &state,
        json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
    )
    .await;
    ann.state_where(|f| {
        common::participant(f, "ann").is_some_and(|p| p["hasAnswered"] == true)
    })
    .await;
    ann.disconnect(&state).await;

    let mut again = common::TestClient::connect(&state);
    again
        .send(
            &state,
            json!({"type": "join-room", "roomId": code, "userId": "ann", "username": "Ann"}),
        )
        .await;
    let restored = again.expect("previous-answer").await;
    assert_eq!(restored["questionIndex"], 0);
    assert_eq!(restored["optionIndex"], 1);

    let settled = again.state_in("results").await;
    let first_score = score_of(&settled, "ann");
    assert!(first_score > 0);
    assert_eq!(settled["participants"].as_array().unwrap().len(), 2);

    again.disconnect(&state).await;
    let mut third = common::TestClient::connect(&state);
    third
        .send(
            &state,
            json!({"type": "join-room", "roomId": code, "userId": "ann", "username": "Ann"}),
        )
        .await;
    let view = third.state_in("results").await;
    assert_eq!(score_of(&view, "ann"), first_score);
    assert_eq!(
        common::participant(&view, "ann").unwrap()["isOnline"],
        true
    );
}

#[tokio::test(start_paused = true)]
async fn protocol_errors_reach_only_the_sender() {
    let (state, _store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-1", json!({})).await;

    let mut stranger = common::TestClient::connect(&state);
    stranger
        .send(
            &state,
            json!({"type": "join-room", "roomId": code + 1, "userId": "x", "username": "X"}),
        )
        .await;
    assert_eq!(stranger.expect("error").await["message"], "Room not found.");

    stranger.send(&state, json!({"type": "dance"})).await;
    assert_eq!(
        stranger.expect("error").await["message"],
        "Invalid message. Please refresh and try again."
    );

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let refused = host.expect("error").await;
    assert_eq!(refused["message"], "at least one connected player is required");

    let mut player = join(&state, code, "u1").await;
    player
        .send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    assert_eq!(
        player.expect("error").await["message"],
        "Something went wrong, please try again."
    );
    let room = state.rooms().live(code).unwrap().inspect().await.unwrap();
    assert_eq!(room.phase(), live_quiz_back::state::state_machine::RoomPhase::Lobby);
}

#[tokio::test(start_paused = true)]
async fn missing_quiz_keeps_the_room_in_the_lobby() {
    let (state, _store) = memory_state().await;
    let (mut host, code) = open_room(&state, "no-such-quiz", json!({})).await;
    let _player = join(&state, code, "u1").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let frame = host
        .state_where(|f| f.get("error").is_some())
        .await;
    assert_eq!(frame["gameState"], "lobby");
    assert!(
        frame["error"]
            .as_str()
            .unwrap()
            .contains("could not be loaded")
    );
}

#[tokio::test(start_paused = true)]
async fn play_again_opens_a_new_session() {
    let (state, _store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-short", json!({})).await;
    let mut ann = join(&state, code, "ann").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let first = session_id(&ann.state_in("question").await);
    ann.send(
        &state,
        json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
    )
    .await;
    host.state_in("results").await;
    host.send(
        &state,
        json!({"type": "request-next-question", "roomId": code}),
    )
    .await;
    host.state_in("end").await;

    host.send(&state, json!({"type": "play-again", "roomId": code}))
        .await;
    let lobby = ann.state_in("lobby").await;
    assert_ne!(session_id(&lobby), first);
    assert_eq!(score_of(&lobby, "ann"), 0);
    assert_eq!(lobby["currentQuestionIndex"], -1);
}

#[tokio::test(start_paused = true)]
async fn guests_cannot_share_a_nickname() {
    let (state, store) = memory_state().await;
    let (mut host, code) = open_room(&state, "quiz-short", json!({})).await;

    let guest_join = |user_id: &str, username: &str| {
        json!({
            "type": "join-room",
            "roomId": code,
            "userId": user_id,
            "username": username,
            "guest": true,
        })
    };
    let mut first = common::TestClient::connect(&state);
    first.send(&state, guest_join("g1", "Alex")).await;
    first
        .state_where(|frame| common::participant(frame, "g1").is_some())
        .await;

    let mut second = common::TestClient::connect(&state);
    second.send(&state, guest_join("g2", "Alex")).await;
    assert_eq!(
        second.expect("error").await["message"],
        "That nickname is already taken, please pick another one."
    );
    second.send(&state, guest_join("g2", "Alex B")).await;
    second
        .state_where(|frame| common::participant(frame, "g2").is_some())
        .await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let session = session_id(&first.state_in("question").await);
    first
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
        )
        .await;
    second
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 0}),
        )
        .await;
    host.state_in("results").await;

    let history_store = store.clone();
    eventually(move || {
        let store = history_store.clone();
        async move { store.list_history(session).await.map_or(0, |h| h.len()) == 2 }
    })
    .await;
    let history = store.list_history(session).await.unwrap();
    let correct: Vec<bool> = history.iter().map(|r| r.is_ultimately_correct).collect();
    assert!(correct.contains(&true) && correct.contains(&false));
}

#[tokio::test(start_paused = true)]
async fn quiz_with_an_untimed_question_is_refused_at_start() {
    let (state, store) = memory_state().await;
    let mut untimed = common::quiz("quiz-untimed", 1);
    untimed.questions[0].time_limit_secs = 0;
    store.insert_quiz(untimed);

    let (mut host, code) = open_room(&state, "quiz-untimed", json!({})).await;
    let mut player = join(&state, code, "u1").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let frame = host.state_where(|f| f.get("error").is_some()).await;
    assert_eq!(frame["gameState"], "lobby");
    assert!(frame["error"].as_str().unwrap().contains("no time limit"));

    player
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
        )
        .await;
    assert_eq!(
        player.expect("error").await["message"],
        "That action is not available right now."
    );
}
