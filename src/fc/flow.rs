use crate::chat::{ChatSession, TurnTranscript};
use crate::error::ClientError;
use crate::protocol::canonical::ChatMessage;
use crate::protocol::openai_chat::stream::Fragment;
use crate::protocol::openai_chat::OpenAiTool;

use super::recovery::{
    execute_invocations, format_tool_results_message, recover_invocations, ToolInvocation,
    ToolOutcome,
};
use super::registry::ToolRegistry;

/// Which request of a tool turn a fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Initial,
    FollowUp,
}

/// Progress hooks for a tool turn. All methods default to no-ops.
pub trait FlowObserver {
    fn on_fragment(&mut self, _stage: FlowStage, _fragment: &Fragment) {}
    fn on_initial_complete(&mut self, _transcript: &TurnTranscript) {}
    fn on_invocations(&mut self, _invocations: &[ToolInvocation]) {}
    fn on_outcome(&mut self, _outcome: &ToolOutcome) {}
}

impl FlowObserver for () {}

/// What one tool turn produced. `messages` is everything to append to the
/// history after the user message, in order.
#[derive(Debug, Clone)]
pub struct ToolTurn {
    pub initial: TurnTranscript,
    pub outcomes: Vec<ToolOutcome>,
    pub follow_up: Option<TurnTranscript>,
    pub messages: Vec<ChatMessage>,
}

impl ToolTurn {
    /// The text the operator should read as the final answer.
    #[must_use]
    pub fn final_text(&self) -> &str {
        self.follow_up
            .as_ref()
            .map_or_else(|| self.initial.assistant_text(), |turn| turn.text.as_str())
    }
}

/// Streamed request, tool recovery and follow-up over one chat session.
pub struct ToolCallingFlow<'a> {
    session: &'a ChatSession,
    registry: &'a ToolRegistry,
    tools: Option<Vec<OpenAiTool>>,
}

impl<'a> ToolCallingFlow<'a> {
    /// `send_tool_schemas` controls whether the registry's schemas ride
    /// along with the first request.
    #[must_use]
    pub fn new(session: &'a ChatSession, registry: &'a ToolRegistry, send_tool_schemas: bool) -> Self {
        let tools = send_tool_schemas.then(|| registry.to_openai_tools());
        Self {
            session,
            registry,
            tools,
        }
    }

    /// Run one turn over `history`, which must already end with the user's
    /// message. The history itself is not touched.
    ///
    /// # Errors
    ///
    /// Fails if either request fails. Tool failures are never errors.
    pub async fn run<O: FlowObserver>(
        &self,
        history: &[ChatMessage],
        observer: &mut O,
    ) -> Result<ToolTurn, ClientError> {
        let initial = self
            .session
            .stream_turn(history, self.tools.as_deref(), |fragment| {
                observer.on_fragment(FlowStage::Initial, fragment);
            })
            .await?;
        observer.on_initial_complete(&initial);

        let assistant = ChatMessage::assistant(initial.assistant_text());
        let invocations = recover_invocations(initial.recovery_text(), self.registry);
        if invocations.is_empty() {
            return Ok(ToolTurn {
                initial,
                outcomes: Vec::new(),
                follow_up: None,
                messages: vec![assistant],
            });
        }

        observer.on_invocations(&invocations);
        let outcomes = execute_invocations(invocations, self.registry);
        for outcome in &outcomes {
            observer.on_outcome(outcome);
        }

        let mut messages = vec![
            assistant,
            ChatMessage::user(format_tool_results_message(&outcomes)),
        ];
        let mut follow_up_history = Vec::with_capacity(history.len() + messages.len());
        follow_up_history.extend_from_slice(history);
        follow_up_history.extend_from_slice(&messages);

        let follow_up = self
            .session
            .stream_turn(&follow_up_history, None, |fragment| {
                observer.on_fragment(FlowStage::FollowUp, fragment);
            })
            .await?;
        messages.push(ChatMessage::assistant(follow_up.text.as_str()));

        Ok(ToolTurn {
            initial,
            outcomes,
            follow_up: Some(follow_up),
            messages,
        })
    }
}
