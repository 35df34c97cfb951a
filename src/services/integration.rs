//! Tool-graph interception.
//!
//! [`ToolInterceptor`] wraps every node of a caller-supplied [`ToolGraph`]
//! with a guarded node that asks the engine first. On BLOCK the guarded node
//! returns the nudge message instead of running the tool; otherwise it runs
//! the original node and reports the result back as an outcome.
//! `uninstall` puts the original nodes back.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::orchestrator::GuardEngine;
use crate::domain::errors::{GuardError, GuardResult};
use crate::domain::models::{CheckRequest, Outcome, Verdict};

/// One tool invocation as seen by a node.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub session_id: String,
    /// State observed before the call.
    pub state: Value,
    pub thought: Option<String>,
    pub actor: Option<String>,
    pub args: Value,
}

/// A caller-supplied tool node.
#[async_trait]
pub trait ToolNode: Send + Sync {
    async fn invoke(&self, tool_name: &str, call: &ToolCall) -> Result<Value>;
}

/// Named tool nodes.
#[derive(Default, Clone)]
pub struct ToolGraph {
    nodes: BTreeMap<String, Arc<dyn ToolNode>>,
}

impl std::fmt::Debug for ToolGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a node; returns the node previously registered under `name`.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        node: Arc<dyn ToolNode>,
    ) -> Option<Arc<dyn ToolNode>> {
        self.nodes.insert(name.into(), node)
    }

    pub fn node(&self, name: &str) -> Option<Arc<dyn ToolNode>> {
        self.nodes.get(name).cloned()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run the node registered under `tool_name`.
    pub async fn invoke(&self, tool_name: &str, call: &ToolCall) -> Result<Value> {
        let node = self
            .node(tool_name)
            .ok_or_else(|| anyhow::anyhow!("unknown tool node: {tool_name}"))?;
        node.invoke(tool_name, call).await
    }
}

struct GuardedNode {
    inner: Arc<dyn ToolNode>,
    engine: Arc<GuardEngine>,
}

#[async_trait]
impl ToolNode for GuardedNode {
    async fn invoke(&self, tool_name: &str, call: &ToolCall) -> Result<Value> {
        let mut request =
            CheckRequest::new(call.state.clone()).with_action(tool_name, call.args.clone());
        request.thought.clone_from(&call.thought);
        request.actor.clone_from(&call.actor);

        let decision = self.engine.check(&call.session_id, request).await?;
        if decision.verdict == Verdict::Block {
            info!(
                session_id = %call.session_id,
                tool = tool_name,
                reason = decision.reason.category(),
                "Tool call blocked"
            );
            let nudge = decision.nudge_message.unwrap_or(decision.message);
            return Ok(Value::String(nudge));
        }

        let result = self.inner.invoke(tool_name, call).await;
        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::failure(e.to_string()),
        };
        if let Err(e) = self.engine.record_outcome(&call.session_id, outcome).await {
            warn!(session_id = %call.session_id, error = %e, "Failed to record tool outcome");
        }
        result
    }
}

/// Installs guarded wrappers into a [`ToolGraph`] and removes them again.
pub struct ToolInterceptor {
    engine: Arc<GuardEngine>,
    originals: HashMap<String, Arc<dyn ToolNode>>,
}

impl ToolInterceptor {
    pub fn new(engine: Arc<GuardEngine>) -> Self {
        Self {
            engine,
            originals: HashMap::new(),
        }
    }

    pub fn is_installed(&self) -> bool {
        !self.originals.is_empty()
    }

    /// Wrap every node of `graph`. Returns the number of wrapped nodes.
    pub fn install(&mut self, graph: &mut ToolGraph) -> GuardResult<usize> {
        if self.is_installed() {
            return Err(GuardError::Configuration(
                "interceptor is already installed".to_string(),
            ));
        }
        for (name, node) in &mut graph.nodes {
            self.originals.insert(name.clone(), Arc::clone(node));
            *node = Arc::new(GuardedNode {
                inner: Arc::clone(node),
                engine: Arc::clone(&self.engine),
            });
        }
        debug!(nodes = self.originals.len(), "Interceptor installed");
        Ok(self.originals.len())
    }

    /// Restore the original nodes. Returns the number of restored nodes.
    pub fn uninstall(&mut self, graph: &mut ToolGraph) -> usize {
        let restored = self.originals.len();
        for (name, original) in self.originals.drain() {
            graph.nodes.insert(name, original);
        }
        debug!(nodes = restored, "Interceptor uninstalled");
        restored
    }
}
