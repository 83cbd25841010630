use crate::chat::{ChatSession, Conversation};
use crate::config::AppConfig;
use crate::protocol::canonical::ChatMessage;

use super::{
    cancellable, describe_error, parse_input, print_banner, settle_turn, write_flush, AppError,
    InputCommand, LineReader,
};

/// Interactive streaming chat.
///
/// # Errors
///
/// Returns configuration and terminal errors. Failed turns are reported
/// and rolled back without ending the session.
pub async fn run_chat(config: &AppConfig) -> Result<(), AppError> {
    let session = ChatSession::from_config(config)?;
    print_banner(&format!("{} Interactive Chat", session.model()));
    println!("Type 'quit' or 'exit' to end the conversation");
    println!("Type 'clear' to start a new conversation");
    println!("Server: {}", config.server.base_url);

    let mut conversation = Conversation::new(config.chat.system_prompt.as_str());
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

        let result = cancellable(session.stream_turn(conversation.messages(), None, |fragment| {
            write_flush(&fragment.text);
        }))
        .await;
        println!();

        let settled = settle_turn(&mut conversation, mark, result, |conversation, transcript| {
            conversation.push(ChatMessage::assistant(transcript.text));
        });
        if let Err(err) = settled {
            println!("\n{}", describe_error(&err));
        }
    }
}
