//! Agentic Loop (§4.4): drives LLM turns for a chat session, dispatching
//! tool calls through the classifier and FSM gate, feeding the knowledge
//! extractor and cost store, and supporting question/approval
//! sub-protocols.
//!
//! The turn-as-iterator model and bounded drop-oldest event channel are
//! grounded on the teacher's `CommunicationBus` (`communication/mod.rs`):
//! publishers never block on a slow subscriber.

pub mod approval;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::cost::CostStore;
use crate::error::{CoreError, CoreResult};
use crate::fsm::{ToolClassifier, ToolKind};
use crate::interfaces::{LlmProvider, LlmRequest, LlmStreamEvent};
use crate::knowledge::KnowledgeExtractor;
use crate::types::{QuestionId, Session, UsageEvent};

#[derive(Debug, Clone)]
pub enum AgentStreamEvent {
    Content(String),
    ToolStarted { name: String },
    ToolBlocked { name: String, reason: String },
    ToolCompleted { name: String },
    Question { id: QuestionId, text: String },
    Done,
}

pub type ToolExecutor = Arc<dyn Fn(&str, &Value) -> CoreResult<Value> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct AgenticLoopConfig {
    pub max_turns: usize,
    pub channel_capacity: usize,
}

impl Default for AgenticLoopConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            channel_capacity: 256,
        }
    }
}

/// Pending questions keyed by id; `answer_question` delivers through a
/// one-shot sender consumed exactly once.
#[derive(Default)]
struct PendingQuestions {
    senders: HashMap<QuestionId, oneshot::Sender<Value>>,
}

pub struct AgenticLoop {
    config: AgenticLoopConfig,
    llm: Arc<dyn LlmProvider>,
    tool_executor: ToolExecutor,
    cost_store: Arc<CostStore>,
    pending_questions: RwLock<PendingQuestions>,
}

impl AgenticLoop {
    pub fn new(config: AgenticLoopConfig, llm: Arc<dyn LlmProvider>, tool_executor: ToolExecutor, cost_store: Arc<CostStore>) -> Self {
        Self {
            config,
            llm,
            tool_executor,
            cost_store,
            pending_questions: RwLock::new(PendingQuestions::default()),
        }
    }

    /// Registers a pending question and returns the receiver the loop
    /// awaits on; the caller surfaces `id`/`text` to the user out of band.
    fn publish_question(&self, text: String) -> (QuestionId, oneshot::Receiver<Value>) {
        let id = QuestionId::new();
        let (tx, rx) = oneshot::channel();
        self.pending_questions.write().senders.insert(id, tx);
        (id, rx)
    }

    /// Delivers an answer for a previously published question. A second
    /// answer for the same id fails since the sender is consumed on first
    /// use.
    pub fn answer_question(&self, id: QuestionId, answer: Value) -> CoreResult<()> {
        let sender = self.pending_questions.write().senders.remove(&id);
        match sender {
            Some(tx) => tx.send(answer).map_err(|_| CoreError::InvalidInput("question receiver dropped".to_string())),
            None => Err(CoreError::InvalidInput("no such pending question, or already answered".to_string())),
        }
    }

    /// Runs turns until the model emits a terminal answer or `max_turns`
    /// is exhausted, emitting `AgentStreamEvent`s on a bounded,
    /// drop-oldest channel so a slow consumer never blocks the loop.
    pub async fn run(&self, session: &mut Session, system_prompt: String) -> CoreResult<mpsc::Receiver<AgentStreamEvent>> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        for turn in 0..self.config.max_turns {
            let req = LlmRequest {
                system_prompt: system_prompt.clone(),
                messages: session.messages.clone(),
                tools: Vec::new(),
            };

            let events = Arc::new(RwLock::new(Vec::new()));
            let events_cb = events.clone();
            let tx_content = tx.clone();
            let result = self
                .llm
                .chat_stream(
                    req,
                    Box::new(move |event| {
                        if let LlmStreamEvent::Content(ref text) = event {
                            let _ = tx_content.try_send(AgentStreamEvent::Content(text.clone()));
                        }
                        events_cb.write().push(event);
                    }),
                )
                .await;

            if let Err(e) = result {
                warn!(error = %e, turn, "llm stream failed");
                let _ = tx.try_send(AgentStreamEvent::Done);
                break;
            }

            let mut tool_calls = Vec::new();
            let mut done = false;
            for event in events.read().iter() {
                match event {
                    LlmStreamEvent::ToolCall { name, args, call_id } => {
                        tool_calls.push((name.clone(), args.clone(), call_id.clone()));
                    }
                    LlmStreamEvent::Done { .. } => done = true,
                    _ => {}
                }
            }

            for (name, args, _call_id) in tool_calls {
                self.dispatch_tool(session, &name, &args, &tx).await;
            }

            if done && session.fsm.can_final_answer() {
                break;
            }
            if done {
                info!(turn, "model tried to finish without satisfying verification gate");
            }
        }

        let _ = tx.try_send(AgentStreamEvent::Done);
        Ok(rx)
    }

    async fn dispatch_tool(&self, session: &mut Session, name: &str, args: &Value, tx: &mpsc::Sender<AgentStreamEvent>) {
        let kind = ToolClassifier::classify(name);

        if let Some(predicted) = Self::fact_gate_hit(session, name, args) {
            let _ = tx.try_send(AgentStreamEvent::ToolCompleted { name: name.to_string() });
            info!(tool = name, fact = predicted, "fact gate short-circuited tool call");
            return;
        }

        if let Err(e) = session.fsm.gate(kind) {
            let _ = tx.try_send(AgentStreamEvent::ToolBlocked {
                name: name.to_string(),
                reason: e.to_string(),
            });
            return;
        }

        let _ = tx.try_send(AgentStreamEvent::ToolStarted { name: name.to_string() });

        match (self.tool_executor)(name, args) {
            Ok(result) => {
                session.fsm.record_success(kind, name);
                if kind == ToolKind::Read && matches!(session.fsm.state(), crate::fsm::FsmState::Verifying) {
                    session.fsm.complete_verification();
                }
                for fact in KnowledgeExtractor::extract(name, args, &result) {
                    session.facts.insert(fact.key.clone(), fact);
                }
                self.cost_store.record(UsageEvent {
                    timestamp: SystemTime::now(),
                    provider: "unknown".to_string(),
                    request_model: "unknown".to_string(),
                    response_model: "unknown".to_string(),
                    use_case: "agentic_loop".to_string(),
                    input_tokens: 0,
                    output_tokens: 0,
                    target_type: "tool".to_string(),
                    target_id: name.to_string(),
                    finding_id: None,
                });
                let _ = tx.try_send(AgentStreamEvent::ToolCompleted { name: name.to_string() });
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool execution failed");
                let _ = tx.try_send(AgentStreamEvent::ToolBlocked {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    /// §4.4 fact gate: if every predicted key for `(tool, args)` is already
    /// cached, returns the first matching key instead of dispatching.
    fn fact_gate_hit(session: &Session, tool: &str, args: &Value) -> Option<String> {
        let predicted = KnowledgeExtractor::predict_fact_keys(tool, args);
        if predicted.is_empty() {
            return None;
        }
        predicted.into_iter().find(|key| {
            session.facts.contains_key(key)
                || KnowledgeExtractor::expand_marker(key)
                    .map(|expanded| session.facts.keys().any(|k| k.starts_with(expanded.trim_end_matches('*'))))
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostStoreConfig;
    use crate::types::KnowledgeFact;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoopLlm;
    #[async_trait]
    impl LlmProvider for NoopLlm {
        async fn chat_stream(&self, _req: LlmRequest, cb: Box<dyn Fn(LlmStreamEvent) + Send + Sync>) -> CoreResult<()> {
            cb(LlmStreamEvent::Done { stop_reason: "end_turn".to_string() });
            Ok(())
        }
        async fn chat(&self, _req: LlmRequest) -> CoreResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn fact_gate_hits_on_cached_marker_key() {
        let mut session = Session::new();
        session.facts.insert(
            "docker:containers:queried".to_string(),
            KnowledgeFact::new("docker", "docker:containers:queried", "3"),
        );
        let hit = AgenticLoop::fact_gate_hit(&session, "pulse_docker", &json!({}));
        assert_eq!(hit, Some("docker:containers:queried".to_string()));
    }

    #[test]
    fn fact_gate_misses_when_uncached() {
        let session = Session::new();
        let hit = AgenticLoop::fact_gate_hit(&session, "pulse_query", &json!({"name": "n1"}));
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn answer_question_consumes_sender_once() {
        let agentic = AgenticLoop::new(
            AgenticLoopConfig::default(),
            Arc::new(NoopLlm),
            Arc::new(|_: &str, _: &Value| Ok(json!({}))),
            Arc::new(CostStore::new(CostStoreConfig::default())),
        );
        let (id, rx) = agentic.publish_question("confirm?".to_string());
        agentic.answer_question(id, json!(true)).unwrap();
        assert_eq!(rx.await.unwrap(), json!(true));
        assert!(agentic.answer_question(id, json!(false)).is_err());
    }

    #[tokio::test]
    async fn run_completes_without_tool_calls() {
        let agentic = AgenticLoop::new(
            AgenticLoopConfig::default(),
            Arc::new(NoopLlm),
            Arc::new(|_: &str, _: &Value| Ok(json!({}))),
            Arc::new(CostStore::new(CostStoreConfig::default())),
        );
        let mut session = Session::new();
        let mut rx = agentic.run(&mut session, "system".to_string()).await.unwrap();
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            if matches!(event, AgentStreamEvent::Done) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }
}
