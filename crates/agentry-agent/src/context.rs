//! Context assembler — builds the message list for every oracle call.
//!
//! Layout, always in this order:
//! 1. one system message (role, instructions, capability list, recalled memory)
//! 2. the most recent `2 × short_term_cap` window messages
//! 3. the current user input
//!
//! Follow-up notices (empty-reply nudge, retry, summarize) are appended by the
//! agent loop on top of a freshly assembled list.

use std::sync::Arc;

use agentry_core::types::{ConversationWindow, Message};

use crate::capabilities::CapabilityRegistry;

/// Placeholder for the memory section when nothing was recalled.
const NO_MEMORY: &str = "(none)";

const EMPTY_REPLY_NUDGE: &str =
    "System Notification: You returned an empty response. Respond to the user now.";

// ─────────────────────────────────────────────
// ContextAssembler
// ─────────────────────────────────────────────

/// Builds oracle input from the live registry and window. Holds no cache.
#[derive(Clone, Debug)]
pub struct ContextAssembler {
    agent_name: String,
    registry: Arc<CapabilityRegistry>,
    short_term_cap: usize,
}

impl ContextAssembler {
    pub fn new(
        agent_name: impl Into<String>,
        registry: Arc<CapabilityRegistry>,
        short_term_cap: usize,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            registry,
            short_term_cap,
        }
    }

    pub fn short_term_cap(&self) -> usize {
        self.short_term_cap
    }

    /// `- name: description` per registered capability, sorted by name.
    pub fn capability_list(&self) -> String {
        self.registry
            .listing()
            .into_iter()
            .map(|(name, desc)| format!("- {name}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The single system message's text.
    pub fn build_system_prompt(&self, recalled: &[String]) -> String {
        let memory_context = if recalled.is_empty() {
            NO_MEMORY.to_string()
        } else {
            format!("Relevant past context:\n{}", recalled.join("\n---\n"))
        };

        format!(
            "You are {name}, an autonomous assistant running locally on the user's computer.\n\
             You may create, read, and modify files and run commands on this system through the capabilities below.\n\
             \n\
             [AVAILABLE CAPABILITIES]:\n\
             {capabilities}\n\
             \n\
             [CURRENT CONTEXT]:\n\
             {memory_context}\n\
             \n\
             [INSTRUCTIONS]:\n\
             1. When the user asks for something a capability can do, use the capability.\n\
             2. Do not hand shell commands to the user. Run them yourself with `run_cmd`.\n\
             3. File paths: use `~/Desktop/filename.txt` for the user's desktop and `.` for the current directory.\n\
             4. Request at most one capability per reply. Without a fenced JSON block your reply goes to the user as is.\n\
             \n\
             [RESPONSE FORMAT]:\n\
             First write your reasoning, then the capability request as fenced JSON.\n\
             \n\
             Example:\n\
             Thought: The user wants a file on the desktop. I will use write_file.\n\
             Action: ```json\n\
             {{\n  \"action\": \"write_file\",\n  \"args\": \"~/Desktop/test.txt|Content here\"\n}}\n\
             ```",
            name = self.agent_name,
            capabilities = self.capability_list(),
        )
    }

    /// System message, bounded history, then `user_input`.
    pub fn assemble(
        &self,
        user_input: &str,
        window: &ConversationWindow,
        recalled: &[String],
    ) -> Vec<Message> {
        let history = window.recent(self.short_term_cap);
        let mut messages = Vec::with_capacity(history.len() + 2);

        messages.push(Message::system(self.build_system_prompt(recalled)));
        messages.extend_from_slice(history);
        messages.push(Message::user(user_input));
        messages
    }
}

// ─────────────────────────────────────────────
// Follow-up notices
// ─────────────────────────────────────────────

/// Ask again after an empty or whitespace-only reply.
pub fn push_empty_nudge(messages: &mut Vec<Message>) {
    messages.push(Message::user(EMPTY_REPLY_NUDGE));
}

/// Report a failed capability and ask for a different request.
pub fn push_retry_notice(messages: &mut Vec<Message>, result: &str) {
    messages.push(Message::user(format!(
        "System Notification: Tool failed. Result: {result}. \
         Try again with a different action or args (reply with JSON only)."
    )));
}

/// Replay the action-bearing reply and ask for a summary of the result.
pub fn push_summarize_notice(messages: &mut Vec<Message>, action_reply: &str, result: &str) {
    messages.push(Message::assistant(action_reply));
    messages.push(Message::user(format!(
        "System Notification: Tool executed. Result: {result}. \
         Please summarize what you did to the user."
    )));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::extensions::ExtensionCatalog;
    use crate::capabilities::{Capability, CapabilityOptions};
    use agentry_core::types::Role;
    use async_trait::async_trait;

    struct Doc(&'static str, &'static str);

    #[async_trait]
    impl Capability for Doc {
        fn name(&self) -> &str {
            self.0
        }
        fn documentation(&self) -> &str {
            self.1
        }
        async fn execute(&self, _args: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn assembler(cap: usize) -> (Arc<CapabilityRegistry>, ContextAssembler) {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register(Arc::new(Doc(
                "write_file",
                "\n   Write content to a file.   Args: path|content\n\n   More detail.",
            )))
            .unwrap();
        let asm = ContextAssembler::new("Agentry", registry.clone(), cap);
        (registry, asm)
    }

    fn window_of(turns: usize) -> ConversationWindow {
        let mut w = ConversationWindow::new();
        for i in 0..turns {
            w.push_turn(format!("q{i}"), format!("a{i}"));
        }
        w
    }

    #[test]
    fn test_layout() {
        let (_, asm) = assembler(10);
        let msgs = asm.assemble("hello", &window_of(2), &[]);

        assert_eq!(msgs.len(), 6);
        assert_eq!(msgs[0].role(), Role::System);
        assert_eq!(msgs[1].content(), "q0");
        assert_eq!(msgs[4].content(), "a1");
        assert_eq!(msgs[5].role(), Role::User);
        assert_eq!(msgs[5].content(), "hello");
        assert_eq!(msgs.iter().filter(|m| m.role() == Role::System).count(), 1);
    }

    #[test]
    fn test_history_is_capped() {
        let (_, asm) = assembler(3);
        let msgs = asm.assemble("now", &window_of(10), &[]);

        assert_eq!(msgs.len(), 1 + 6 + 1);
        assert_eq!(msgs[1].content(), "q7");
        assert_eq!(msgs[6].content(), "a9");
    }

    #[test]
    fn test_capability_description_collapsed() {
        let (_, asm) = assembler(10);
        let system = asm.build_system_prompt(&[]);
        assert!(system.contains("- write_file: Write content to a file. Args: path|content\n"));
        assert!(!system.contains("More detail"));
    }

    #[test]
    fn test_memory_section() {
        let (_, asm) = assembler(10);
        assert!(asm.build_system_prompt(&[]).contains("[CURRENT CONTEXT]:\n(none)\n"));

        let recalled = vec!["User: a\nAssistant: b".to_string(), "note".to_string()];
        let system = asm.build_system_prompt(&recalled);
        assert!(system.contains("Relevant past context:\nUser: a\nAssistant: b\n---\nnote"));
        assert!(!system.contains("(none)"));
    }

    #[test]
    fn test_reads_live_registry() {
        let (registry, asm) = assembler(10);
        assert!(!asm.capability_list().contains("clock"));

        registry.register(Arc::new(Doc("clock", "Tell the time."))).unwrap();
        let msgs = asm.assemble("x", &ConversationWindow::new(), &[]);
        assert!(msgs[0].content().contains("- clock: Tell the time."));
    }

    #[test]
    fn test_builtin_list_names_catalog_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = crate::capabilities::builtin_registry(&CapabilityOptions {
            workspace: dir.path().to_path_buf(),
            restrict_to_workspace: false,
            exec_timeout: 5,
            brave_api_key: None,
            search_max_results: 5,
        })
        .unwrap();
        let asm = ContextAssembler::new("Agentry", registry, 10);

        let list = asm.capability_list();
        let line = list
            .lines()
            .find(|l| l.starts_with("- register_capability: "))
            .unwrap();
        for id in ExtensionCatalog::builtin().ids() {
            assert!(line.contains(id), "register_capability line is missing {id}: {line}");
        }
    }

    #[test]
    fn test_response_format_example() {
        let (_, asm) = assembler(10);
        let system = asm.build_system_prompt(&[]);
        assert!(system.contains("You are Agentry"));
        assert!(system.contains("Thought:"));
        assert!(system.contains("```json\n{\n  \"action\": \"write_file\""));
        assert!(system.contains("~/Desktop/filename.txt"));
    }

    #[test]
    fn test_notices() {
        let mut msgs = Vec::new();
        push_retry_notice(&mut msgs, "Error: file not found");
        assert_eq!(
            msgs[0].content(),
            "System Notification: Tool failed. Result: Error: file not found. Try again with a different action or args (reply with JSON only)."
        );

        push_summarize_notice(&mut msgs, "```json{}```", "Wrote 2 characters to /t");
        assert_eq!(msgs[1].role(), Role::Assistant);
        assert_eq!(msgs[2].role(), Role::User);
        assert!(msgs[2].content().ends_with("Please summarize what you did to the user."));

        push_empty_nudge(&mut msgs);
        assert_eq!(msgs[3].role(), Role::User);
    }
}
