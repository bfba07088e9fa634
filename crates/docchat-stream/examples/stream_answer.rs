use std::io::Write as _;

use docchat_stream::prelude::*;

struct Printer;

impl TurnObserver for Printer {
    fn on_context(&mut self, context: &RetrievedContext) {
        eprintln!("[{} contexts from {}]", context.contexts.len(), context.provider);
    }

    fn on_visible(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ChatError> {
    let session = ChatSession::new(ChatConfig::from_env()?)?
        .with_system_prompt("Answer from the retrieved documents.");

    let outcome = session
        .ask_with("Summarize the uploaded documents.", &mut Printer)
        .await?;
    println!();
    if let TurnOutcome::Completed(turn) = outcome
        && !turn.reasoning.is_empty()
    {
        eprintln!("[{} reasoning segments]", turn.reasoning.len());
    }
    Ok(())
}
