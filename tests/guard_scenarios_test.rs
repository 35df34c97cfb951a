//! End-to-end decision scenarios against the public engine API.

mod common;

use common::{request, request_with, BrokenEmbedder, CountingNormalizer, MapNormalizer};
use loopwarden::adapters::{HashedBagOfWordsEmbedder, StaticNormalizer};
use loopwarden::{
    CheckRequest, Decision, GuardConfig, GuardEngine, GuardError, GuardReason, LoopType, Outcome,
    ReasonCode, Verdict,
};
use serde_json::json;
use std::sync::Arc;

const PRODUCT_INTENT: &str = "find product by id";

async fn run(engine: &GuardEngine, session: &str, requests: Vec<CheckRequest>) -> Vec<Decision> {
    let mut decisions = Vec::new();
    for request in requests {
        decisions.push(engine.check(session, request).await.unwrap());
    }
    decisions
}

fn verdicts(decisions: &[Decision]) -> Vec<Verdict> {
    decisions.iter().map(|d| d.verdict).collect()
}

#[tokio::test]
async fn test_stutter_blocks_by_third_repeat() {
    common::setup_test_logging();
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();
    let decisions = run(
        &engine,
        "stutter",
        (0..3).map(|_| request("home", "search", "shoes")).collect(),
    )
    .await;

    assert_eq!(
        verdicts(&decisions),
        vec![Verdict::Allow, Verdict::Warn, Verdict::Block]
    );
    let blocked = &decisions[2];
    assert!(blocked.has_loop_type(LoopType::Stutter));
    assert_eq!(blocked.reason, ReasonCode::LoopPattern(LoopType::Stutter));
    assert!(blocked
        .nudge_message
        .as_deref()
        .is_some_and(|n| !n.is_empty()));
    assert!(decisions[1].nudge_message.is_some(), "WARN carries a nudge");
}

#[tokio::test]
async fn test_intent_exhaustion_blocks_fourth_attempt() {
    let normalizer = StaticNormalizer::new()
        .with_exact("search XYZ-9999", PRODUCT_INTENT)
        .with_exact("try XYZ9999", PRODUCT_INTENT)
        .with_exact("try XYZ 9999", PRODUCT_INTENT)
        .with_exact("look XYZ-9999 up in the catalog", PRODUCT_INTENT);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();
    let not_found = || Outcome::failure("Product XYZ-9999 not found");

    let requests = vec![
        request_with(json!({"page": "results-0"}), "search", json!({"query": "XYZ-9999"}))
            .with_thought("search XYZ-9999")
            .with_outcome(not_found()),
        request_with(json!({"page": "results-1"}), "search", json!({"query": "XYZ9999"}))
            .with_thought("try XYZ9999")
            .with_outcome(not_found()),
        request_with(json!({"page": "results-2"}), "lookup", json!({"sku": "XYZ 9999"}))
            .with_thought("try XYZ 9999")
            .with_outcome(not_found()),
        request_with(json!({"page": "results-3"}), "catalog", json!({"filter": "id eq XYZ-9999"}))
            .with_thought("look XYZ-9999 up in the catalog"),
    ];
    let decisions = run(&engine, "exhaust", requests).await;

    assert_eq!(
        verdicts(&decisions),
        vec![Verdict::Allow, Verdict::Allow, Verdict::Warn, Verdict::Block]
    );
    let blocked = &decisions[3];
    assert_eq!(blocked.reason, ReasonCode::Guard(GuardReason::IntentExhausted));
    assert!(blocked.message.starts_with("intent exhausted"), "{}", blocked.message);
    assert_eq!(blocked.intent_label.as_deref(), Some(PRODUCT_INTENT));
    assert!(blocked.nudge_message.is_some());

    let snapshot = engine.session_snapshot("exhaust").await.unwrap();
    assert_eq!(snapshot.active_intent.as_deref(), Some(PRODUCT_INTENT));
}

#[tokio::test]
async fn test_action_repeat_takes_precedence_over_intent_guard() {
    let normalizer = MapNormalizer::new(&[("find it", "find product")]);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();

    let requests = ["one", "two", "two", "two"]
        .iter()
        .enumerate()
        .map(|(i, q)| {
            request(&format!("p{i}"), "search", q)
                .with_thought("find it")
                .with_outcome(Outcome::failure("404"))
        })
        .collect();
    let decisions = run(&engine, "precedence", requests).await;

    let last = &decisions[3];
    assert_eq!(last.verdict, Verdict::Block);
    assert!(!last.guard_findings.is_empty());
    assert!(last
        .guard_findings
        .iter()
        .all(|f| f.reason == GuardReason::ActionRepeated));
    assert!(!last
        .guard_findings
        .iter()
        .any(|f| f.reason == GuardReason::IntentExhausted));
}

#[tokio::test]
async fn test_duplicate_attempt_is_caught_by_action_guard_not_intent_guard() {
    let normalizer = MapNormalizer::new(&[("find it", "find product")]);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();

    // Two of the three failed attempts are the same action.
    let requests = ["one", "one", "two", "three"]
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let step = request(&format!("p{i}"), "search", q).with_thought("find it");
            if i < 3 {
                step.with_outcome(Outcome::failure("Product not found"))
            } else {
                step
            }
        })
        .collect();
    let decisions = run(&engine, "duplicate", requests).await;

    assert_eq!(
        verdicts(&decisions),
        vec![Verdict::Allow, Verdict::Warn, Verdict::Allow, Verdict::Warn]
    );
    assert_eq!(decisions[1].reason, ReasonCode::Guard(GuardReason::ActionRepeated));
    assert_eq!(decisions[3].reason, ReasonCode::Guard(GuardReason::IntentExhausted));
    assert_eq!(decisions[3].guard_findings[0].count, 2, "the duplicate counts once");

    // Retrying the duplicate a third time in a row blocks at level 1 before a 4th attempt.
    let normalizer = MapNormalizer::new(&[("find it", "find product")]);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();
    let requests = ["one", "one", "one"]
        .iter()
        .enumerate()
        .map(|(i, q)| {
            request(&format!("p{i}"), "search", q)
                .with_thought("find it")
                .with_outcome(Outcome::failure("Product not found"))
        })
        .collect();
    let decisions = run(&engine, "duplicate-consecutive", requests).await;
    assert_eq!(decisions[2].verdict, Verdict::Block);
    assert!(decisions[2]
        .guard_findings
        .iter()
        .any(|f| f.reason == GuardReason::ActionRepeated && f.verdict == Verdict::Block));
    assert!(!decisions[2]
        .guard_findings
        .iter()
        .any(|f| f.reason == GuardReason::IntentExhausted));
}

#[tokio::test]
async fn test_thought_label_pinned_for_whole_session() {
    let normalizer = Arc::new(CountingNormalizer::default());
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(normalizer.clone())
        .build()
        .unwrap();

    let first = engine
        .check("pinned", request("p0", "search", "q0").with_thought("same thought"))
        .await
        .unwrap();
    for i in 1..=250 {
        engine
            .check(
                "pinned",
                request(&format!("p{i}"), "search", &format!("q{i}"))
                    .with_thought(&format!("thought number {i}")),
            )
            .await
            .unwrap();
    }
    let again = engine
        .check("pinned", request("p251", "search", "q251").with_thought("same thought"))
        .await
        .unwrap();

    assert_eq!(first.intent_label.as_deref(), Some("label 0"));
    assert_eq!(again.intent_label, first.intent_label);
    assert_eq!(normalizer.calls(), 251);
}

#[tokio::test]
async fn test_decayed_nudge_names_the_looping_tool() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();
    let requests = vec![
        request("p0", "search", "a"),
        request("p1", "search", "a"),
        request("p2", "search", "a"),
        request("p3", "browse", "shoes"),
    ];
    let decisions = run(&engine, "decayed-nudge", requests).await;

    let nudged = &decisions[3];
    assert_eq!(nudged.verdict, Verdict::Warn);
    assert!(nudged.detections.is_empty());
    assert_eq!(nudged.reason, ReasonCode::LoopPattern(LoopType::Stutter));
    let nudge = nudged.nudge_message.as_deref().unwrap();
    assert!(nudge.contains("search"), "{nudge}");
    assert!(!nudge.contains("browse"), "{nudge}");
}

#[tokio::test]
async fn test_evidence_uses_step_indices_after_eviction() {
    let config = GuardConfig {
        window_size: 8,
        ..Default::default()
    };
    let engine = GuardEngine::new(config).unwrap();
    let mut requests: Vec<CheckRequest> = (0..10)
        .map(|i| request(&format!("p{i}"), "search", &format!("q{i}")))
        .collect();
    requests.extend((10..13).map(|i| request(&format!("p{i}"), "search", "again")));
    let decisions = run(&engine, "evidence", requests).await;

    let last = &decisions[12];
    assert_eq!(last.step_index, 12);
    let stutter = last
        .detections
        .iter()
        .find(|d| d.loop_type == LoopType::Stutter)
        .unwrap();
    assert_eq!(stutter.evidence, vec![10, 11, 12]);
}

#[tokio::test]
async fn test_intent_switch_resets_attempts() {
    let normalizer = MapNormalizer::new(&[("find", "find product"), ("browse", "browse category")]);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();

    let mut requests: Vec<CheckRequest> = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, q)| {
            request(&format!("p{i}"), "search", q)
                .with_thought("find")
                .with_outcome(Outcome::failure("not found"))
        })
        .collect();
    requests.push(request("p3", "browse", "shoes").with_thought("browse"));
    requests.push(request("p4", "search", "d").with_thought("find"));
    let decisions = run(&engine, "switch", requests).await;

    assert_eq!(decisions[3].verdict, Verdict::Allow);
    assert_eq!(decisions[4].verdict, Verdict::Allow, "old attempts were cleared");
    assert!(decisions[4].guard_findings.is_empty());
}

#[tokio::test]
async fn test_success_clears_intent_attempts() {
    let normalizer = MapNormalizer::new(&[("find", "find product")]);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();

    let requests = vec![
        request("p0", "search", "a")
            .with_thought("find")
            .with_outcome(Outcome::failure("not found")),
        request("p1", "search", "b")
            .with_thought("find")
            .with_outcome(Outcome::failure("not found")),
        request("p2", "search", "c")
            .with_thought("find")
            .with_outcome(Outcome::Success),
        request("p3", "search", "d").with_thought("find"),
    ];
    let decisions = run(&engine, "success", requests).await;
    assert_eq!(decisions[2].verdict, Verdict::Warn);
    assert_eq!(decisions[3].verdict, Verdict::Allow);
}

#[tokio::test]
async fn test_live_outcome_reporting() {
    let normalizer = MapNormalizer::new(&[("find", "find product")]);
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(Arc::new(normalizer))
        .build()
        .unwrap();

    for (i, q) in ["a", "b", "c"].iter().enumerate() {
        let decision = engine
            .check("live", request(&format!("p{i}"), "search", q).with_thought("find"))
            .await
            .unwrap();
        assert_ne!(decision.verdict, Verdict::Block);
        let signature = engine
            .record_outcome("live", Outcome::failure("request timed out"))
            .await
            .unwrap();
        assert_eq!(signature.as_deref(), Some("TIMEOUT"));
    }

    let decision = engine
        .check("live", request("p3", "search", "d").with_thought("find"))
        .await
        .unwrap();
    assert_eq!(decision.reason, ReasonCode::Guard(GuardReason::IntentExhausted));
    assert!(decision.is_blocked());
}

#[tokio::test]
async fn test_score_decays_after_loop_breaks() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();
    let requests = vec![
        request("p0", "search", "a"),
        request("p1", "search", "a"),
        request("p2", "search", "a"),
        request("p3", "search", "b"),
        request("p4", "search", "c"),
    ];
    let decisions = run(&engine, "decay", requests).await;

    assert_eq!(decisions[2].verdict, Verdict::Block);
    assert_eq!(decisions[3].verdict, Verdict::Warn, "score 2.4 is still a nudge");
    assert_eq!(decisions[3].reason, ReasonCode::LoopPattern(LoopType::Stutter));
    assert_eq!(decisions[4].verdict, Verdict::Allow, "score 1.92 drops below nudge");
    assert!((decisions[4].score - 1.92).abs() < 1e-9);
}

#[tokio::test]
async fn test_ping_pong_alternation() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();

    let alternating = ["planner", "executor", "planner", "executor"]
        .iter()
        .enumerate()
        .map(|(i, actor)| request(&format!("p{i}"), "step", &format!("q{i}")).with_actor(*actor))
        .collect();
    let decisions = run(&engine, "abab", alternating).await;
    assert!(decisions[3].has_loop_type(LoopType::PingPong));
    assert!(!decisions[2].has_loop_type(LoopType::PingPong));

    let broken = ["planner", "executor", "critic", "planner", "executor"]
        .iter()
        .enumerate()
        .map(|(i, actor)| request(&format!("p{i}"), "step", &format!("q{i}")).with_actor(*actor))
        .collect();
    let decisions = run(&engine, "abcab", broken).await;
    assert!(decisions.iter().all(|d| !d.has_loop_type(LoopType::PingPong)));
}

#[tokio::test]
async fn test_phantom_progress_on_frozen_state() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();
    let state = json!({"cart": ["sku-1"], "updated_at": "2024-05-01T10:00:00Z"});
    let frozen = json!({"cart": ["sku-1"], "updated_at": "2024-05-01T10:00:07Z"});
    let decisions = run(
        &engine,
        "phantom",
        vec![
            request_with(state, "add_to_cart", json!({"sku": "sku-2"})),
            request_with(frozen, "refresh_cart", json!({})),
        ],
    )
    .await;

    let latest = &decisions[1];
    assert!(latest.has_loop_type(LoopType::PhantomProgress));
    assert_eq!(latest.verdict, Verdict::Allow, "one weight-1 match stays below nudge");
    assert!((latest.score - 1.0).abs() < 1e-9);
}

fn paraphrases() -> Vec<CheckRequest> {
    let base = "cheap red trail running shoes for men with wide toe box and waterproof upper";
    ["size ten", "size eleven", "size twelve", "size nine"]
        .iter()
        .enumerate()
        .map(|(i, size)| request(&format!("p{i}"), "search", &format!("{base} {size}")))
        .collect()
}

#[tokio::test]
async fn test_insanity_requires_embedder() {
    let bare = GuardEngine::new(GuardConfig::default()).unwrap();
    let decisions = run(&bare, "no-embedder", paraphrases()).await;
    assert!(decisions
        .iter()
        .all(|d| !d.has_loop_type(LoopType::Insanity)));

    let broken = GuardEngine::builder(GuardConfig::default())
        .embedder(Arc::new(BrokenEmbedder))
        .build()
        .unwrap();
    let decisions = run(&broken, "broken-embedder", paraphrases()).await;
    assert!(decisions.iter().all(|d| !d.has_loop_type(LoopType::Insanity)));
}

#[tokio::test]
async fn test_insanity_with_hashed_embedder() {
    let engine = GuardEngine::builder(GuardConfig::default())
        .embedder(Arc::new(HashedBagOfWordsEmbedder::new(4096).unwrap()))
        .build()
        .unwrap();
    let decisions = run(&engine, "insanity", paraphrases()).await;

    assert!(!decisions[2].has_loop_type(LoopType::Insanity), "only two prior matches");
    let latest = &decisions[3];
    assert!(latest.has_loop_type(LoopType::Insanity));
    let insanity = latest
        .detections
        .iter()
        .find(|d| d.loop_type == LoopType::Insanity)
        .unwrap();
    assert_eq!(insanity.evidence, vec![0, 1, 2, 3]);
    assert_eq!(latest.verdict, Verdict::Warn);
}

#[tokio::test]
async fn test_metrics_count_blocks_and_savings() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();
    run(
        &engine,
        "metrics",
        (0..5).map(|_| request("home", "search", "x")).collect(),
    )
    .await;

    let metrics = engine.metrics();
    assert_eq!(metrics.blocks, 3);
    assert_eq!(metrics.warns, 1);
    assert_eq!(metrics.tokens_saved, 3 * 2000);
    assert!((metrics.cost_saved_usd - 0.018).abs() < 1e-9);
}

#[tokio::test]
async fn test_thought_labels_are_memoized() {
    let normalizer = Arc::new(MapNormalizer::new(&[("same thought", "one intent")]));
    let engine = GuardEngine::builder(GuardConfig::default())
        .normalizer(normalizer.clone())
        .build()
        .unwrap();
    let decisions = run(
        &engine,
        "memo",
        (0..3)
            .map(|i| request(&format!("p{i}"), "search", &format!("q{i}")).with_thought("same thought"))
            .collect(),
    )
    .await;

    assert_eq!(normalizer.calls(), 1);
    assert!(decisions
        .iter()
        .all(|d| d.intent_label.as_deref() == Some("one intent")));
}

#[tokio::test]
async fn test_malformed_input_is_rejected_without_creating_session() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();

    let err = engine
        .check("bad", CheckRequest::new(json!("just a string")))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::MalformedStepInput(_)));

    let err = engine
        .check("bad", request_with(json!({}), "search", json!([1, 2])))
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::MalformedStepInput(_)));
    assert_eq!(engine.session_count().await, 0);
}

#[tokio::test]
async fn test_end_session_forgets_history() {
    let engine = GuardEngine::new(GuardConfig::default()).unwrap();
    run(&engine, "s", (0..2).map(|_| request("p", "t", "q")).collect()).await;
    assert_eq!(engine.session_count().await, 1);

    assert!(engine.end_session("s").await);
    assert!(!engine.end_session("s").await);

    let decision = engine.check("s", request("p", "t", "q")).await.unwrap();
    assert_eq!(decision.verdict, Verdict::Allow);
    assert_eq!(decision.step_index, 0);
}
