//! Agent loop — one user turn from input to final answer.
//!
//! Each turn runs a small state machine:
//!
//! ```text
//! Initial → AwaitingParse → Done
//!                         ↘ Dispatching → Retrying → AwaitingParse
//!                                       ↘ Summarizing → Done
//! ```
//!
//! A failed dispatch is retried with a fresh context plus a failure notice
//! until `max_retries` is spent; after that the last failing result goes
//! through Summarizing like any success. At most `max_retries + 1` dispatches
//! happen per turn, and the final answer is never empty.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use agentry_core::config::schema::Config;
use agentry_core::types::{ConversationWindow, Message, Session};
use agentry_core::utils::truncate_string;
use agentry_providers::traits::{is_oracle_error, LlmProvider, LlmRequestConfig};

use crate::capabilities::{CapabilityExecutor, CapabilityRegistry, CapabilityResult, FailureClassifier};
use crate::context::{push_empty_nudge, push_retry_notice, push_summarize_notice, ContextAssembler};
use crate::memory::MemoryGate;
use crate::parser::{parse_response, ActionRequest, ParseOutcome};

/// Answer used when neither the oracle nor a capability produced any text.
pub const NO_RESPONSE_FALLBACK: &str = "I've completed processing but have no response to give.";

/// Length of message previews in debug logs.
const PREVIEW_CHARS: usize = 80;

// ─────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────

/// Tunables for [`AgentLoop`].
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub agent_name: String,
    /// Model override; the provider's default model when `None`.
    pub model: Option<String>,
    pub request_config: LlmRequestConfig,
    /// History is read as the last `2 × short_term_cap` messages.
    pub short_term_cap: usize,
    pub max_retries: u32,
    pub recall_top_k: usize,
    /// Shorter answers are returned but not recorded.
    pub min_record_chars: usize,
    pub classifier: FailureClassifier,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            agent_name: "Agentry".into(),
            model: None,
            request_config: LlmRequestConfig::default(),
            short_term_cap: 10,
            max_retries: 3,
            recall_top_k: 2,
            min_record_chars: 5,
            classifier: FailureClassifier::default(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        let defaults = &config.agents.defaults;
        Self {
            agent_name: defaults.agent_name.clone(),
            model: Some(defaults.model.clone()).filter(|m| !m.is_empty()),
            request_config: LlmRequestConfig {
                max_tokens: defaults.max_tokens,
                temperature: defaults.temperature,
            },
            short_term_cap: defaults.short_term_cap,
            max_retries: defaults.max_tool_retries,
            recall_top_k: defaults.recall_top_k,
            min_record_chars: defaults.min_record_chars,
            classifier: FailureClassifier::from_config(&config.tools),
        }
    }
}

// ─────────────────────────────────────────────
// Turn state
// ─────────────────────────────────────────────

/// Retry budget for one turn. Dropped when the turn ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max: u32,
}

impl RetryState {
    pub fn new(max: u32) -> Self {
        Self { attempt: 0, max }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max
    }

    fn advance(&mut self) {
        self.attempt += 1;
    }
}

enum TurnState {
    Initial,
    AwaitingParse { reply: String },
    Dispatching { reply: String, request: ActionRequest },
    Retrying { failure: String },
    Summarizing { action_reply: String, result: String },
    Done(String),
}

/// What happened during one turn.
#[derive(Clone, Debug)]
pub struct TurnReport {
    pub answer: String,
    pub dispatches: usize,
    pub retries: u32,
    pub last_result: Option<CapabilityResult>,
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Drives turns against an oracle, a capability registry, and long-term memory.
pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    model: String,
    request_config: LlmRequestConfig,
    executor: CapabilityExecutor,
    context: ContextAssembler,
    memory: MemoryGate,
    max_retries: u32,
    recall_top_k: usize,
    min_record_chars: usize,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<CapabilityRegistry>,
        memory: MemoryGate,
        settings: AgentSettings,
    ) -> Self {
        let model = settings
            .model
            .unwrap_or_else(|| provider.default_model().to_string());
        let context = ContextAssembler::new(
            settings.agent_name,
            registry.clone(),
            settings.short_term_cap,
        );
        let executor = CapabilityExecutor::new(registry, settings.classifier);

        info!(
            provider = provider.display_name(),
            model = %model,
            capabilities = executor.registry().len(),
            max_retries = settings.max_retries,
            memory = memory.is_enabled(),
            "agent loop initialized"
        );

        Self {
            provider,
            model,
            request_config: settings.request_config,
            executor,
            context,
            memory,
            max_retries: settings.max_retries,
            recall_top_k: settings.recall_top_k,
            min_record_chars: settings.min_record_chars,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.executor.registry()
    }

    pub fn memory(&self) -> &MemoryGate {
        &self.memory
    }

    /// Run one turn and record it: the exchange is appended to the session
    /// window and logged to long-term memory. Answers shorter than
    /// `min_record_chars` are returned but left unrecorded.
    pub async fn process_turn(&self, session: &mut Session, input: &str) -> Result<String> {
        let input = input.trim();
        anyhow::ensure!(!input.is_empty(), "input is empty");

        let report = self.run_turn(&session.window, input).await;
        info!(
            session = %session.key,
            dispatches = report.dispatches,
            retries = report.retries,
            answer_len = report.answer.len(),
            "turn complete"
        );

        if report.answer.trim().chars().count() < self.min_record_chars {
            warn!(
                session = %session.key,
                answer = %report.answer,
                "answer too short, not recorded"
            );
            return Ok(report.answer);
        }

        session.window.push_turn(input, report.answer.as_str());
        self.memory
            .log(&format!("User: {input}\nAssistant: {}", report.answer));

        Ok(report.answer)
    }

    /// Run one turn against `window` without modifying it.
    pub async fn run_turn(&self, window: &ConversationWindow, input: &str) -> TurnReport {
        let recalled = self.memory.recall(input, self.recall_top_k);
        let registry = self.executor.registry();

        let mut retry = RetryState::new(self.max_retries);
        let mut dispatches = 0usize;
        let mut last_result: Option<CapabilityResult> = None;
        let mut state = TurnState::Initial;

        loop {
            state = match state {
                TurnState::Initial => {
                    let mut messages = self.context.assemble(input, window, &recalled);
                    let mut reply = self.call_oracle(&messages).await;
                    if reply.is_empty() {
                        debug!("empty reply, re-prompting once");
                        push_empty_nudge(&mut messages);
                        reply = self.call_oracle(&messages).await;
                    }
                    TurnState::AwaitingParse { reply }
                }

                TurnState::AwaitingParse { reply } => match parse_response(&reply, registry) {
                    ParseOutcome::Action(request) => TurnState::Dispatching { reply, request },
                    ParseOutcome::Malformed(reason) => {
                        debug!(reason = %reason, "fenced block ignored, replying as is");
                        TurnState::Done(final_answer(reply, last_result.as_ref()))
                    }
                    ParseOutcome::NoAction => {
                        TurnState::Done(final_answer(reply, last_result.as_ref()))
                    }
                },

                TurnState::Dispatching { reply, request } => {
                    info!(
                        capability = %request.action,
                        attempt = retry.attempt,
                        args = %truncate_string(&request.args, PREVIEW_CHARS),
                        "dispatching capability"
                    );
                    let result = self.executor.execute(&request.action, &request.args).await;
                    dispatches += 1;

                    let next = if !result.success && retry.can_retry() {
                        retry.advance();
                        TurnState::Retrying {
                            failure: result.text.clone(),
                        }
                    } else {
                        TurnState::Summarizing {
                            action_reply: reply,
                            result: result.text.clone(),
                        }
                    };
                    last_result = Some(result);
                    next
                }

                TurnState::Retrying { failure } => {
                    warn!(
                        attempt = retry.attempt,
                        max = retry.max,
                        "capability failed, asking for a different request"
                    );
                    let mut messages = self.context.assemble(input, window, &recalled);
                    push_retry_notice(&mut messages, &failure);
                    let reply = self.call_oracle(&messages).await;
                    TurnState::AwaitingParse { reply }
                }

                TurnState::Summarizing {
                    action_reply,
                    result,
                } => {
                    let mut messages = self.context.assemble(input, window, &recalled);
                    push_summarize_notice(&mut messages, &action_reply, &result);
                    let summary = self.call_oracle(&messages).await;
                    let answer = if summary.is_empty() {
                        debug!("empty summary, falling back to the capability result");
                        result
                    } else {
                        summary
                    };
                    TurnState::Done(final_answer(answer, last_result.as_ref()))
                }

                TurnState::Done(answer) => {
                    return TurnReport {
                        answer,
                        dispatches,
                        retries: retry.attempt,
                        last_result,
                    };
                }
            };
        }
    }

    /// One oracle call. The reply comes back trimmed.
    async fn call_oracle(&self, messages: &[Message]) -> String {
        for (i, m) in messages.iter().enumerate() {
            debug!(
                index = i,
                role = %m.role(),
                preview = %truncate_string(m.content(), PREVIEW_CHARS),
                "oracle message"
            );
        }

        let reply = self
            .provider
            .chat(messages, &self.model, &self.request_config)
            .await;
        if is_oracle_error(&reply) {
            warn!(reply = %truncate_string(&reply, PREVIEW_CHARS), "oracle call failed");
        }
        reply.trim().to_string()
    }
}

/// `answer` if non-blank, else the last capability result, else the fixed fallback.
fn final_answer(answer: String, last_result: Option<&CapabilityResult>) -> String {
    if !answer.trim().is_empty() {
        return answer;
    }
    match last_result {
        Some(r) if !r.text.trim().is_empty() => r.text.clone(),
        _ => NO_RESPONSE_FALLBACK.to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::filesystem::WriteFileCapability;
    use crate::capabilities::Capability;
    use crate::memory::{MemoryBank, SimilarityStore};
    use agentry_core::types::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    // ── Scripted oracle ──

    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<Message>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(&self, messages: &[Message], _model: &str, _config: &LlmRequestConfig) -> String {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies.lock().unwrap().pop_front().unwrap_or_default()
        }
        fn default_model(&self) -> &str {
            "scripted"
        }
        fn display_name(&self) -> &str {
            "Scripted"
        }
    }

    // ── Test capabilities ──

    struct Fixed(&'static str, &'static str);

    #[async_trait]
    impl Capability for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn documentation(&self) -> &str {
            "Returns a fixed text."
        }
        async fn execute(&self, _args: &str) -> anyhow::Result<String> {
            Ok(self.1.to_string())
        }
    }

    struct Panics;

    #[async_trait]
    impl Capability for Panics {
        fn name(&self) -> &str {
            "explode"
        }
        fn documentation(&self) -> &str {
            "Always panics."
        }
        async fn execute(&self, _args: &str) -> anyhow::Result<String> {
            panic!("boom")
        }
    }

    fn cap(c: impl Capability + 'static) -> Arc<dyn Capability> {
        Arc::new(c)
    }

    fn fence(action: &str, args: &str) -> String {
        format!(
            "Thought: I will use {action}.\nAction: ```json\n{}\n```",
            serde_json::json!({ "action": action, "args": args })
        )
    }

    fn build(
        provider: Arc<ScriptedProvider>,
        caps: Vec<Arc<dyn Capability>>,
        max_retries: u32,
    ) -> AgentLoop {
        let registry = Arc::new(CapabilityRegistry::new());
        for cap in caps {
            registry.register(cap).unwrap();
        }
        let settings = AgentSettings {
            max_retries,
            short_term_cap: 3,
            ..Default::default()
        };
        AgentLoop::new(provider, registry, MemoryGate::disabled(), settings)
    }

    #[tokio::test]
    async fn test_plain_reply_is_final() {
        let provider = ScriptedProvider::new(&["Hello! How can I help?"]);
        let agent = build(provider.clone(), vec![], 3);

        let report = agent.run_turn(&ConversationWindow::new(), "hi").await;
        assert_eq!(report.answer, "Hello! How can I help?");
        assert_eq!(report.dispatches, 0);
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_write_file_then_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let action = fence("write_file", &format!("{}|hi there", path.display()));
        let provider = ScriptedProvider::new(&[&action, "I created hello.txt for you."]);
        let agent = build(
            provider.clone(),
            vec![cap(WriteFileCapability::new(None))],
            3,
        );

        let report = agent.run_turn(&ConversationWindow::new(), "make hello.txt").await;
        assert_eq!(report.answer, "I created hello.txt for you.");
        assert_eq!(report.dispatches, 1);
        assert_eq!(report.retries, 0);
        assert!(report.last_result.unwrap().success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hi there");

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        let summary_call = &calls[1];
        let n = summary_call.len();
        assert_eq!(summary_call[n - 2].role(), Role::Assistant);
        assert_eq!(summary_call[n - 2].content(), action);
        assert!(summary_call[n - 1].content().contains("Result: Wrote 8 characters to"));
    }

    #[tokio::test]
    async fn test_empty_summary_falls_back_to_result() {
        let provider = ScriptedProvider::new(&[&fence("status", ""), "   "]);
        let agent = build(provider, vec![cap(Fixed("status", "all systems nominal"))], 3);

        let report = agent.run_turn(&ConversationWindow::new(), "status?").await;
        assert_eq!(report.answer, "all systems nominal");
    }

    #[tokio::test]
    async fn test_unregistered_action_passes_through() {
        let reply = fence("delete_everything", "/");
        let provider = ScriptedProvider::new(&[&reply]);
        let agent = build(provider.clone(), vec![cap(Fixed("status", "ok"))], 3);

        let report = agent.run_turn(&ConversationWindow::new(), "wipe it").await;
        assert_eq!(report.answer, reply);
        assert_eq!(report.dispatches, 0);
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_then_summarize() {
        let action = fence("read_file", "missing.txt");
        let provider = ScriptedProvider::new(&[&action, &action, &action, &action, "I could not find it."]);
        let agent = build(
            provider.clone(),
            vec![cap(Fixed("read_file", "Error: file not found"))],
            3,
        );

        let report = agent.run_turn(&ConversationWindow::new(), "read it").await;
        assert_eq!(report.retries, 3);
        assert_eq!(report.dispatches, 4);
        assert_eq!(report.answer, "I could not find it.");
        assert!(!report.last_result.unwrap().success);

        let calls = provider.calls();
        assert_eq!(calls.len(), 5);
        // Retry contexts are rebuilt: system + user input + failure notice.
        for retry_call in &calls[1..4] {
            assert_eq!(retry_call.len(), 3);
            assert!(retry_call[2].content().starts_with("System Notification: Tool failed. Result: Error: file not found."));
        }
        assert!(calls[4].last().unwrap().content().contains("Tool executed. Result: Error: file not found"));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let provider = ScriptedProvider::new(&[
            &fence("read_file", "a.txt"),
            &fence("status", ""),
            "Done.",
        ]);
        let agent = build(
            provider,
            vec![
                cap(Fixed("read_file", "Error: file not found")),
                cap(Fixed("status", "fine")),
            ],
            3,
        );

        let report = agent.run_turn(&ConversationWindow::new(), "check").await;
        assert_eq!(report.retries, 1);
        assert_eq!(report.dispatches, 2);
        assert_eq!(report.answer, "Done.");
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let action = fence("read_file", "x");
        let provider = ScriptedProvider::new(&[&action, "Failed to read."]);
        let agent = build(provider, vec![cap(Fixed("read_file", "Error: nope"))], 0);

        let report = agent.run_turn(&ConversationWindow::new(), "read").await;
        assert_eq!(report.dispatches, 1);
        assert_eq!(report.retries, 0);
        assert_eq!(report.answer, "Failed to read.");
    }

    #[tokio::test]
    async fn test_panicking_capability_is_retried() {
        let action = fence("explode", "");
        let provider = ScriptedProvider::new(&[&action, "Giving up."]);
        let agent = build(provider.clone(), vec![cap(Panics)], 1);

        let report = agent.run_turn(&ConversationWindow::new(), "go").await;
        // Second reply has no action, so the turn ends there.
        assert_eq!(report.dispatches, 1);
        assert_eq!(report.retries, 1);
        assert_eq!(report.answer, "Giving up.");
        assert!(provider.calls()[1][2].content().contains("crashed: boom"));
    }

    #[tokio::test]
    async fn test_empty_reply_reprompts_once() {
        let provider = ScriptedProvider::new(&["  \n", "Hi!"]);
        let agent = build(provider.clone(), vec![], 3);

        let report = agent.run_turn(&ConversationWindow::new(), "hello").await;
        assert_eq!(report.answer, "Hi!");
        assert_eq!(report.retries, 0);

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), calls[0].len() + 1);
        assert!(calls[1].last().unwrap().content().contains("empty response"));
    }

    #[tokio::test]
    async fn test_answer_never_empty() {
        let provider = ScriptedProvider::new(&[]);
        let agent = build(provider.clone(), vec![], 3);

        let report = agent.run_turn(&ConversationWindow::new(), "hello").await;
        assert_eq!(report.answer, NO_RESPONSE_FALLBACK);
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_retry_reply_uses_last_result() {
        let provider = ScriptedProvider::new(&[&fence("read_file", "x"), ""]);
        let agent = build(
            provider,
            vec![cap(Fixed("read_file", "Error: file not found"))],
            3,
        );

        let report = agent.run_turn(&ConversationWindow::new(), "read").await;
        assert_eq!(report.answer, "Error: file not found");
    }

    #[tokio::test]
    async fn test_oracle_error_is_an_answer() {
        let provider = ScriptedProvider::new(&["[LLM Error] connection refused"]);
        let agent = build(provider, vec![], 3);

        let report = agent.run_turn(&ConversationWindow::new(), "hi").await;
        assert_eq!(report.answer, "[LLM Error] connection refused");
    }

    #[tokio::test]
    async fn test_history_window_is_capped() {
        let provider = ScriptedProvider::new(&["ok"]);
        let agent = build(provider.clone(), vec![], 3);

        let mut window = ConversationWindow::new();
        for i in 0..20 {
            window.push_turn(format!("q{i}"), format!("a{i}"));
        }
        agent.run_turn(&window, "latest").await;

        let sent = &provider.calls()[0];
        assert_eq!(sent.len(), 1 + 6 + 1);
        assert_eq!(sent[1].content(), "q17");
    }

    #[tokio::test]
    async fn test_process_turn_records_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(MemoryBank::open(&dir.path().join("logs.jsonl")).unwrap());
        let provider = ScriptedProvider::new(&["Nice to meet you, Ada.", "You are Ada."]);
        let agent = AgentLoop::new(
            provider.clone(),
            Arc::new(CapabilityRegistry::new()),
            MemoryGate::new(bank.clone()),
            AgentSettings::default(),
        );

        let mut session = Session::new("cli:test");
        let answer = agent.process_turn(&mut session, "  my name is Ada ").await.unwrap();
        assert_eq!(answer, "Nice to meet you, Ada.");
        assert_eq!(session.window.len(), 2);
        assert_eq!(session.window.messages()[0].content(), "my name is Ada");
        assert_eq!(bank.count().unwrap(), 1);

        agent.process_turn(&mut session, "who am I?").await.unwrap();
        let second = &provider.calls()[1];
        // Recalled memory lands in the system prompt; history follows it.
        assert!(second[0].content().contains("User: my name is Ada\nAssistant: Nice to meet you, Ada."));
        assert_eq!(second[1].content(), "my name is Ada");
        assert_eq!(session.window.len(), 4);
    }

    #[tokio::test]
    async fn test_process_turn_skips_short_answers() {
        let dir = tempfile::tempdir().unwrap();
        let bank = Arc::new(MemoryBank::open(&dir.path().join("logs.jsonl")).unwrap());
        let provider = ScriptedProvider::new(&["ok", "Sure, done."]);
        let agent = AgentLoop::new(
            provider,
            Arc::new(CapabilityRegistry::new()),
            MemoryGate::new(bank.clone()),
            AgentSettings::default(),
        );

        let mut session = Session::new("cli:test");
        assert_eq!(agent.process_turn(&mut session, "hi").await.unwrap(), "ok");
        assert!(session.window.is_empty());
        assert_eq!(bank.count().unwrap(), 0);

        agent.process_turn(&mut session, "do it").await.unwrap();
        assert_eq!(session.window.len(), 2);
        assert_eq!(bank.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_process_turn_rejects_empty_input() {
        let agent = build(ScriptedProvider::new(&[]), vec![], 3);
        let mut session = Session::new("cli:test");
        assert!(agent.process_turn(&mut session, "   ").await.is_err());
        assert!(session.window.is_empty());
    }

    #[test]
    fn test_retry_state() {
        let mut state = RetryState::new(2);
        assert!(state.can_retry());
        state.advance();
        state.advance();
        assert!(!state.can_retry());
        assert_eq!(state.attempt, state.max);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.agents.defaults.max_tool_retries = 5;
        config.agents.defaults.min_record_chars = 0;
        config.tools.failure_markers.clear();
        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.min_record_chars, 0);
        assert_eq!(settings.model.as_deref(), Some("gpt-oss:20b"));
        assert!(!settings.classifier.is_failure("Error: x"));
    }
}
