use crate::chat::{ChatSession, Conversation, TurnTranscript};
use crate::config::AppConfig;
use crate::fc::{
    default_registry, FlowObserver, FlowStage, ToolCallingFlow, ToolInvocation, ToolOutcome,
    TOOL_SYSTEM_PROMPT,
};
use crate::protocol::canonical::ChatMessage;
use crate::protocol::openai_chat::stream::{Fragment, TextChannel};

use super::{
    cancellable, describe_error, parse_input, print_banner, settle_turn, write_flush, AppError,
    InputCommand, LineReader,
};

/// Prints a tool turn as it happens.
///
/// The first request shows only the content channel; reasoning is where
/// tool JSON lands and is summarised instead.
#[derive(Debug, Default)]
struct TerminalObserver {
    follow_up_started: bool,
}

impl FlowObserver for TerminalObserver {
    fn on_fragment(&mut self, stage: FlowStage, fragment: &Fragment) {
        match stage {
            FlowStage::Initial if fragment.channel == TextChannel::Content => {
                write_flush(&fragment.text);
            }
            FlowStage::Initial => {}
            FlowStage::FollowUp => {
                if !self.follow_up_started {
                    self.follow_up_started = true;
                    write_flush("\nAssistant (final): ");
                }
                write_flush(&fragment.text);
            }
        }
    }

    fn on_initial_complete(&mut self, _transcript: &TurnTranscript) {
        println!();
    }

    fn on_invocations(&mut self, invocations: &[ToolInvocation]) {
        println!("\n[Detected {} tool call(s) in reasoning]", invocations.len());
    }

    fn on_outcome(&mut self, outcome: &ToolOutcome) {
        let invocation = &outcome.invocation;
        println!(
            "\n  🔧 Calling {}({})",
            invocation.tool_name,
            serde_json::Value::Object(invocation.arguments.clone())
        );
        println!("  ✓ Result: {}", outcome.result_text());
    }
}

/// Interactive tool-calling session with the built-in tools.
///
/// # Errors
///
/// Returns configuration and terminal errors. Failed turns are reported
/// and rolled back.
pub async fn run_tools(config: &AppConfig) -> Result<(), AppError> {
    let session = ChatSession::from_config(config)?;
    let registry = default_registry();
    let flow = ToolCallingFlow::new(&session, &registry, config.tools.send_tool_schemas);

    print_banner(&format!("{} Tool Calling", session.model()));
    println!("\nAvailable tools:");
    for tool in registry.iter() {
        println!("  - {}: {}", tool.name, tool.description);
    }
    println!("\nTool calls are recovered from the model's reasoning text.");
    println!("Type 'quit' to exit, 'clear' to start over");

    let system_prompt = config
        .tools
        .system_prompt
        .as_deref()
        .unwrap_or(TOOL_SYSTEM_PROMPT);
    let mut conversation = Conversation::new(system_prompt);
    let mut input = LineReader::stdin();

    loop {
        let Some(line) = input.read_line("\nYou: ").await? else {
            println!("\nGoodbye!");
            return Ok(());
        };
        let text = match parse_input(&line) {
            InputCommand::Empty => continue,
            InputCommand::Quit => {
                println!("\nGoodbye!");
                return Ok(());
            }
            InputCommand::Clear => {
                conversation.reset();
                println!("\n✓ Conversation cleared");
                continue;
            }
            InputCommand::Message(text) => text,
        };

        let mark = conversation.mark();
        conversation.push(ChatMessage::user(text));
        write_flush("\nAssistant: ");

        let mut observer = TerminalObserver::default();
        let result = cancellable(flow.run(conversation.messages(), &mut observer)).await;

        let settled = settle_turn(&mut conversation, mark, result, |conversation, turn| {
            if turn.follow_up.is_some() {
                println!();
            } else if turn.initial.content.is_empty() {
                println!("{}", turn.initial.reasoning);
            }
            conversation.extend(turn.messages);
        });
        if let Err(err) = settled {
            println!("\n{}", describe_error(&err));
        }
    }
}
