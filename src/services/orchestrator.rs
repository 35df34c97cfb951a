//! The guard engine: one decision per `check()` call.
//!
//! Per call, in order:
//! 1. Build the step (state hash, action hash, intent label, embedding) and
//!    append it to the session ledger.
//! 2. Run the detector pipeline over the window and update the loop score.
//! 3. Run the intent guard: level 1, then level 2 unless level 1 blocked.
//! 4. Merge both layers by severity, render a nudge for WARN/BLOCK, count it.
//! 5. Feed any outcome carried by the request into failure memory.
//!
//! Sessions are independent. Calls for one session must not overlap; an
//! overlapping call fails fast with [`GuardError::SessionBusy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::detectors::{DetectionContext, DetectorPipeline};
use super::hashing::{ActionHasher, StateHasher};
use super::intent_guard::IntentGuard;
use super::intervention::{InterventionManager, NudgeContext};
use super::loop_scorer::LoopScorer;
use super::metrics::{GuardMetrics, MetricsSnapshot};
use super::session::{PatternMemory, Session, SessionSnapshot};
use super::thought_cache::canonical_label;
use crate::domain::errors::{GuardError, GuardResult};
use crate::domain::models::{
    ActionCall, CheckRequest, Decision, DetectionResult, GuardConfig, GuardFinding, LoopType,
    Outcome, ReasonCode, SignatureTable, Step, Verdict,
};
use crate::domain::ports::{EmbeddingProvider, ThoughtNormalizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Pattern detectors, loop scorer, intent guard and failure memory.
    Full,
    /// Pattern detectors and loop scorer only.
    PatternsOnly,
}

/// Builder for [`GuardEngine`]. Capabilities are optional.
pub struct GuardEngineBuilder {
    config: GuardConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    normalizer: Option<Arc<dyn ThoughtNormalizer>>,
    signatures: Option<SignatureTable>,
    interventions: Option<InterventionManager>,
    pipeline: Option<DetectorPipeline>,
}

impl GuardEngineBuilder {
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn ThoughtNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Replace the failure-signature table built from configuration.
    pub fn signatures(mut self, table: SignatureTable) -> Self {
        self.signatures = Some(table);
        self
    }

    pub fn interventions(mut self, manager: InterventionManager) -> Self {
        self.interventions = Some(manager);
        self
    }

    /// Replace the built-in detector pipeline.
    pub fn pipeline(mut self, pipeline: DetectorPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Validate the configuration and assemble the engine.
    pub fn build(self) -> GuardResult<GuardEngine> {
        let config = self.config;
        config.validate()?;

        let signatures = match self.signatures {
            Some(table) => table,
            None => SignatureTable::from_config(config.failure_signatures.as_deref())?,
        };

        Ok(GuardEngine {
            state_hasher: StateHasher::new(&config)?,
            action_hasher: ActionHasher::new(&config)?,
            pipeline: self
                .pipeline
                .unwrap_or_else(|| DetectorPipeline::from_config(&config)),
            scorer: LoopScorer::from_config(&config),
            guard: IntentGuard::from_config(&config),
            signatures,
            interventions: self.interventions.unwrap_or_default(),
            metrics: Arc::new(GuardMetrics::new(
                config.avg_tokens_per_attempt,
                config.usd_per_token,
            )),
            embedder: self.embedder,
            normalizer: self.normalizer,
            sessions: RwLock::new(HashMap::new()),
            config,
        })
    }
}

/// Loop guard for any number of concurrent sessions.
pub struct GuardEngine {
    config: GuardConfig,
    state_hasher: StateHasher,
    action_hasher: ActionHasher,
    pipeline: DetectorPipeline,
    scorer: LoopScorer,
    guard: IntentGuard,
    signatures: SignatureTable,
    interventions: InterventionManager,
    metrics: Arc<GuardMetrics>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    normalizer: Option<Arc<dyn ThoughtNormalizer>>,
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl std::fmt::Debug for GuardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardEngine")
            .field("pipeline", &self.pipeline)
            .field("embedder", &self.embedder.as_ref().map(|e| e.name()))
            .field("normalizer", &self.normalizer.as_ref().map(|n| n.name()))
            .finish_non_exhaustive()
    }
}

impl GuardEngine {
    pub fn builder(config: GuardConfig) -> GuardEngineBuilder {
        GuardEngineBuilder {
            config,
            embedder: None,
            normalizer: None,
            signatures: None,
            interventions: None,
            pipeline: None,
        }
    }

    /// Engine without external capabilities.
    pub fn new(config: GuardConfig) -> GuardResult<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    pub fn has_normalizer(&self) -> bool {
        self.normalizer.is_some()
    }

    /// Full, intent-aware decision for the next step of `session_id`.
    #[instrument(skip(self, request))]
    pub async fn check(&self, session_id: &str, request: CheckRequest) -> GuardResult<Decision> {
        self.evaluate(session_id, request, Mode::Full).await
    }

    /// Pattern-only decision: detectors and loop score, no intent guard or failure memory.
    #[instrument(skip(self, request))]
    pub async fn check_patterns(
        &self,
        session_id: &str,
        request: CheckRequest,
    ) -> GuardResult<Decision> {
        self.evaluate(session_id, request, Mode::PatternsOnly).await
    }

    /// Apply the outcome of the most recent step's action to failure memory.
    ///
    /// Returns the failure signature, or `None` for a success or an empty session.
    #[instrument(skip(self, outcome))]
    pub async fn record_outcome(
        &self,
        session_id: &str,
        outcome: Outcome,
    ) -> GuardResult<Option<String>> {
        let handle = self
            .existing_session(session_id)
            .await
            .ok_or_else(|| GuardError::SessionNotFound(session_id.to_string()))?;
        let mut locked = handle
            .try_lock()
            .map_err(|_| GuardError::SessionBusy(session_id.to_string()))?;
        let session = &mut *locked;

        let Some(latest) = session.ledger.latest() else {
            return Ok(None);
        };
        let signature = session.failures.record(
            &self.signatures,
            latest.action_hash.as_deref(),
            latest.intent_label.as_deref(),
            latest.index,
            &outcome,
        );
        debug!(step = latest.index, signature = ?signature, "Recorded outcome");
        Ok(signature)
    }

    /// Drop all state of a session. Returns whether it existed.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id, "Session ended");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_snapshot(&self, session_id: &str) -> GuardResult<SessionSnapshot> {
        let handle = self
            .existing_session(session_id)
            .await
            .ok_or_else(|| GuardError::SessionNotFound(session_id.to_string()))?;
        let locked = handle
            .try_lock()
            .map_err(|_| GuardError::SessionBusy(session_id.to_string()))?;
        Ok(locked.snapshot())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn existing_session(&self, session_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn session_handle(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(handle) = self.existing_session(session_id).await {
            return handle;
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "Session created");
                Arc::new(Mutex::new(Session::new(session_id, &self.config)))
            })
            .clone()
    }

    async fn evaluate(
        &self,
        session_id: &str,
        request: CheckRequest,
        mode: Mode,
    ) -> GuardResult<Decision> {
        let (state, action) = parse_request(&request)?;

        let handle = self.session_handle(session_id).await;
        let mut locked = handle
            .try_lock()
            .map_err(|_| GuardError::SessionBusy(session_id.to_string()))?;
        let session = &mut *locked;

        // 1. Build and append the step.
        let state_hash = self.state_hasher.hash(&state);
        let action_hash = action.as_ref().map(|a| self.action_hasher.hash(a));
        let thought = match mode {
            Mode::Full => request.thought.as_deref().filter(|t| !t.trim().is_empty()),
            Mode::PatternsOnly => None,
        };
        let (intent_label, embedding) = self
            .resolve_capabilities(session, thought, action.as_ref())
            .await;
        let failure_signature = match &request.outcome {
            Some(Outcome::Failure { message }) => Some(self.signatures.classify(message).to_string()),
            _ => None,
        };
        let tool_name = action.as_ref().map(|a| a.tool_name.clone());

        let step = Step {
            index: 0,
            observed_at: Utc::now(),
            state,
            action,
            thought: request.thought.clone(),
            actor: request.actor.clone(),
            outcome: request.outcome.clone(),
            state_hash,
            action_hash: action_hash.clone(),
            intent_label: intent_label.clone(),
            failure_signature,
        };
        let index = session.append(step, embedding);

        // 2. Pattern layer.
        let results = {
            let window = session.ledger.window(session.ledger.capacity());
            let ctx = DetectionContext::new(&window, &session.step_embeddings);
            self.pipeline.run(&ctx)
        };
        let matched: Vec<DetectionResult> = results.into_iter().filter(|r| r.matched).collect();
        if let Some(dominant) = dominant(&matched) {
            session.last_pattern = Some(PatternMemory {
                loop_type: dominant.loop_type,
                evidence_len: dominant.evidence.len(),
                tool: tool_name.clone(),
            });
        }
        let score_verdict = self.scorer.update(&mut session.score, index, &matched);
        let score = session.score.score;

        // 3. Intent layer.
        let mut findings: Vec<GuardFinding> = Vec::new();
        if mode == Mode::Full {
            self.guard.track_intent(
                &mut session.guard,
                &mut session.failures,
                intent_label.as_deref(),
            );
            let level1 = self
                .guard
                .check_action(&mut session.guard, action_hash.as_deref());
            let level1_blocked = level1.as_ref().is_some_and(|f| f.verdict == Verdict::Block);
            findings.extend(level1);
            if !level1_blocked && action_hash.is_some() {
                if let Some(label) = intent_label.as_deref() {
                    findings.extend(self.guard.check_intent(&session.failures, label));
                }
            }
        }

        // 4. Merge by severity.
        let pattern_verdict = Verdict::from(score_verdict);
        let guard_top = findings.iter().max_by_key(|f| f.verdict);
        let guard_verdict = guard_top.map_or(Verdict::Allow, |f| f.verdict);
        let verdict = pattern_verdict.max(guard_verdict);

        let (reason, message, nudge_ctx) = if verdict == Verdict::Allow {
            (ReasonCode::Clear, "no loop detected".to_string(), None)
        } else if pattern_verdict == verdict {
            // A decaying score can nudge a step that matched nothing itself; the
            // nudge then names the tool that was looping, not this step's tool.
            let pattern = session.last_pattern.clone().unwrap_or(PatternMemory {
                loop_type: LoopType::Stutter,
                evidence_len: 0,
                tool: None,
            });
            (
                ReasonCode::LoopPattern(pattern.loop_type),
                format!("{} loop detected (score {score:.2})", pattern.loop_type),
                Some((
                    u32::try_from(pattern.evidence_len).unwrap_or(u32::MAX),
                    pattern.tool,
                )),
            )
        } else {
            // guard_verdict == verdict > Allow, so a top finding exists.
            match guard_top {
                Some(f) => (
                    ReasonCode::Guard(f.reason),
                    f.message.clone(),
                    Some((f.count, tool_name.clone())),
                ),
                None => (ReasonCode::Clear, "no loop detected".to_string(), None),
            }
        };

        let nudge_message = nudge_ctx.map(|(count, tool)| {
            let category = reason.category();
            let occurrence = session.counters.bump(category);
            self.interventions.render(
                category,
                occurrence,
                &NudgeContext {
                    tool: tool.as_deref(),
                    count,
                    intent: intent_label.as_deref(),
                },
            )
        });

        match verdict {
            Verdict::Block => {
                self.metrics.record_block();
                info!(step = index, verdict = %verdict, reason = reason.category(), score, "Blocked step");
            }
            Verdict::Warn => {
                self.metrics.record_warn();
                info!(step = index, verdict = %verdict, reason = reason.category(), score, "Warned step");
            }
            Verdict::Allow => debug!(step = index, score, "Allowed step"),
        }

        // 5. Outcome carried by the request.
        if mode == Mode::Full {
            if let Some(outcome) = &request.outcome {
                session.failures.record(
                    &self.signatures,
                    action_hash.as_deref(),
                    intent_label.as_deref(),
                    index,
                    outcome,
                );
            }
        }

        Ok(Decision {
            session_id: session.id.clone(),
            step_index: index,
            verdict,
            reason,
            message,
            nudge_message,
            detections: matched,
            guard_findings: findings,
            score,
            intent_label,
        })
    }

    /// Resolve the intent label and action embedding concurrently.
    ///
    /// Both are memoized per session; failures degrade to `None` and are not memoized.
    async fn resolve_capabilities(
        &self,
        session: &mut Session,
        thought: Option<&str>,
        action: Option<&ActionCall>,
    ) -> (Option<String>, Option<Vec<f32>>) {
        let action_text = action.map(ActionCall::describe);
        let cached_label = thought.and_then(|t| session.thoughts.get(t));
        let cached_vector = action_text
            .as_deref()
            .and_then(|t| session.embeddings_by_text.get(t));
        let timeout = Duration::from_millis(self.config.capability_timeout_ms);
        let max_words = self.config.intent_label_max_words;

        let label_task = async {
            if cached_label.is_some() {
                return cached_label;
            }
            let (Some(text), Some(normalizer)) = (thought, self.normalizer.as_deref()) else {
                return None;
            };
            match normalize_within(normalizer, text, timeout, max_words).await {
                Ok(label) => Some(label),
                Err(e) => {
                    warn!(error = %e, "Thought normalization unavailable; intent guard level 2 skipped");
                    None
                }
            }
        };
        let embed_task = async {
            if cached_vector.is_some() {
                return cached_vector;
            }
            let (Some(text), Some(embedder)) = (action_text.as_deref(), self.embedder.as_deref())
            else {
                return None;
            };
            match embed_within(embedder, text, timeout).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "Embedding unavailable; insanity detector skipped");
                    None
                }
            }
        };
        let (label, vector) = futures::join!(label_task, embed_task);

        let label = match (thought, label) {
            (Some(text), Some(label)) => Some(session.thoughts.pin(text, label)),
            _ => None,
        };
        let vector = match (action_text.as_deref(), vector) {
            (Some(text), Some(vector)) => Some(session.embeddings_by_text.pin(text, vector)),
            _ => None,
        };
        (label, vector)
    }
}

async fn normalize_within(
    normalizer: &dyn ThoughtNormalizer,
    text: &str,
    timeout: Duration,
    max_words: usize,
) -> GuardResult<String> {
    let raw = tokio::time::timeout(timeout, normalizer.normalize(text))
        .await
        .map_err(|_| {
            GuardError::NormalizationUnavailable(format!(
                "{} timed out after {}ms",
                normalizer.name(),
                timeout.as_millis()
            ))
        })??;
    canonical_label(&raw, max_words).ok_or_else(|| {
        GuardError::NormalizationUnavailable(format!("{} returned an empty label", normalizer.name()))
    })
}

async fn embed_within(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> GuardResult<Vec<f32>> {
    let vector = tokio::time::timeout(timeout, embedder.embed(text))
        .await
        .map_err(|_| {
            GuardError::EmbeddingUnavailable(format!(
                "{} timed out after {}ms",
                embedder.name(),
                timeout.as_millis()
            ))
        })??;
    if vector.is_empty() {
        return Err(GuardError::EmbeddingUnavailable(format!(
            "{} returned an empty vector",
            embedder.name()
        )));
    }
    Ok(vector)
}

/// Heaviest matched detection; the earliest wins a tie.
fn dominant(matched: &[DetectionResult]) -> Option<&DetectionResult> {
    matched.iter().fold(None, |best, r| match best {
        Some(b) if b.weight >= r.weight => Some(b),
        _ => Some(r),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate the raw request into a state mapping and an optional action.
fn parse_request(request: &CheckRequest) -> GuardResult<(Map<String, Value>, Option<ActionCall>)> {
    let state = match &request.state {
        Value::Object(map) => map.clone(),
        other => {
            return Err(GuardError::MalformedStepInput(format!(
                "state must be a JSON object, got {}",
                json_type(other)
            )))
        }
    };

    let args = match &request.args {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(other) => {
            return Err(GuardError::MalformedStepInput(format!(
                "args must be a JSON object, got {}",
                json_type(other)
            )))
        }
    };

    let action = match request.tool_name.as_deref().map(str::trim) {
        Some("") => {
            return Err(GuardError::MalformedStepInput(
                "tool_name must not be empty".to_string(),
            ))
        }
        Some(name) => Some(ActionCall::new(name, args.unwrap_or_default())),
        None if args.is_some() => {
            return Err(GuardError::MalformedStepInput(
                "args supplied without tool_name".to_string(),
            ))
        }
        None => None,
    };

    Ok((state, action))
}
