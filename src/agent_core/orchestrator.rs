//! Orchestrator: the per-query decision and dispatch loop.
//!
//! One query is one run:
//! 1. **Record** the user's turn, before anything else can fail
//! 2. **Connect** a fresh peer session and refresh its tool catalog
//! 3. **Decide** between a tool call, a direct answer, or neither
//! 4. **Dispatch** the chosen route and commit its turns in one batch
//!
//! Runs share nothing but the ledger. Each acquires its own session and
//! tears it down on every exit path; a dropped run future kills its peer
//! through `kill_on_drop`. A failed run leaves only its user turn behind.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::mcp_client::{normalize, Connector, McpError, PeerSession};

use super::capabilities::{fallback_prompt, CompletionCapability, DecisionCapability};
use super::errors::AgentError;
use super::ledger::ConversationLedger;
use super::types::{Decision, Route, RunOutcome, Turn};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Turns read back from the ledger for prompting.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    decider: Arc<dyn DecisionCapability>,
    completer: Arc<dyn CompletionCapability>,
    ledger: Arc<ConversationLedger>,
    history_window: usize,
}

impl Orchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        decider: Arc<dyn DecisionCapability>,
        completer: Arc<dyn CompletionCapability>,
        ledger: Arc<ConversationLedger>,
    ) -> Self {
        Self {
            connector,
            decider,
            completer,
            ledger,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    pub fn ledger(&self) -> &Arc<ConversationLedger> {
        &self.ledger
    }

    // ─── Front-end boundary ─────────────────────────────────────────────

    /// Answer `query`. Never fails: errors come back as a user-facing message.
    pub async fn handle(&self, query: &str) -> String {
        match self.try_handle(query).await {
            Ok(text) => text,
            Err(e) => e.user_message(),
        }
    }

    /// Answer `query`, or report why the run failed.
    pub async fn try_handle(&self, query: &str) -> Result<String, AgentError> {
        self.run(query).await.map(|outcome| outcome.text)
    }

    /// Execute one run and report which route produced the answer.
    pub async fn run(&self, query: &str) -> Result<RunOutcome, AgentError> {
        let run_id = Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!(
            "run",
            conversation_id = %self.ledger.conversation_id(),
            run_id = %run_id,
        );

        async {
            let result = self.run_inner(query).await;
            match &result {
                Ok(outcome) => tracing::info!(route = %outcome.route, "run complete"),
                Err(e) => tracing::error!(error = %e, "run failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_inner(&self, query: &str) -> Result<RunOutcome, AgentError> {
        // Idle → Deciding: the user turn lands first, whatever happens next.
        let user = self.ledger.append(Turn::user(query));
        tracing::info!(seq = user.seq, "user turn recorded");

        let mut session = self
            .connector
            .connect()
            .await
            .map_err(AgentError::session)?;

        let outcome = self.route(&mut session, query).await;
        session.shutdown().await;
        outcome
    }

    async fn route(
        &self,
        session: &mut PeerSession,
        query: &str,
    ) -> Result<RunOutcome, AgentError> {
        let catalog = session.list_tools().await.map_err(AgentError::session)?;

        let history = self.ledger.window(self.history_window);
        let decision = self
            .decider
            .decide(query, &catalog, &history)
            .await
            .map_err(AgentError::decision)?;

        match decision {
            Decision::NeedsTool {
                tool_name,
                arguments,
            } => {
                if catalog.resolve(&tool_name).is_none() {
                    return Err(AgentError::tool(
                        &tool_name,
                        McpError::UnknownTool {
                            name: tool_name.clone(),
                        },
                    ));
                }

                tracing::info!(tool = %tool_name, "dispatching tool call");
                let raw = session
                    .call_tool(&tool_name, arguments.clone())
                    .await
                    .map_err(|e| {
                        // A dead channel is a session fault, not the tool's.
                        if e.is_transport_failure() {
                            AgentError::session(e)
                        } else {
                            AgentError::tool(&tool_name, e)
                        }
                    })?;
                let text = normalize(&raw);

                self.ledger.append_all(vec![
                    Turn::ToolInvocation {
                        tool_name: tool_name.clone(),
                        arguments,
                    },
                    Turn::ToolResult {
                        tool_name,
                        raw_result: raw,
                    },
                ]);
                Ok(RunOutcome {
                    route: Route::Tool,
                    text,
                })
            }

            Decision::NeedsDirectResponse { text } => {
                self.ledger.append(Turn::direct(text.clone()));
                Ok(RunOutcome {
                    route: Route::Direct,
                    text,
                })
            }

            Decision::Unresolved => {
                let window = self.ledger.window(self.history_window);
                tracing::info!(window = window.len(), "no route chosen; generating response");

                let prompt = fallback_prompt(query, &window);
                let text = self
                    .completer
                    .complete(&prompt)
                    .await
                    .map_err(AgentError::completion)?;

                self.ledger.append(Turn::assistant(text.clone()));
                Ok(RunOutcome {
                    route: Route::Fallback,
                    text,
                })
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
