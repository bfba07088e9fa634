//! Interactive and one-shot streaming chat in the terminal.

use std::io::Write as _;

use docchat_stream::{ChatError, ChatSession, RetrievedContext, TurnObserver, TurnOutcome};
use tokio::io::{AsyncBufReadExt as _, BufReader};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Writes the answer to stdout as it streams; context and reasoning go to
/// stderr.
pub struct TerminalPrinter {
    show_thinking: bool,
    in_reasoning: bool,
}

impl TerminalPrinter {
    pub fn new(show_thinking: bool) -> Self {
        Self {
            show_thinking,
            in_reasoning: false,
        }
    }

    fn end_reasoning(&mut self) {
        if self.in_reasoning {
            eprintln!("{RESET}");
            self.in_reasoning = false;
        }
    }
}

impl TurnObserver for TerminalPrinter {
    fn on_context(&mut self, context: &RetrievedContext) {
        eprintln!(
            "{DIM}[{} context(s) via {}]{RESET}",
            context.contexts.len(),
            context.provider
        );
    }

    fn on_visible(&mut self, text: &str) {
        self.end_reasoning();
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    fn on_reasoning(&mut self, text: &str) {
        if !self.show_thinking {
            return;
        }
        if !self.in_reasoning {
            eprint!("{DIM}thinking: ");
            self.in_reasoning = true;
        }
        eprint!("{text}");
    }

    fn on_reasoning_closed(&mut self, _segment: &str) {
        self.end_reasoning();
    }
}

/// Streams one reply to the session's pending user message. Ctrl-C cancels
/// the turn instead of exiting.
pub async fn stream_reply(
    session: &ChatSession,
    show_thinking: bool,
) -> Result<TurnOutcome, ChatError> {
    let canceller = session.canceller();
    let mut printer = TerminalPrinter::new(show_thinking);
    let outcome = {
        let send = session.send_with(&mut printer);
        tokio::pin!(send);
        loop {
            tokio::select! {
                outcome = &mut send => break outcome,
                _ = tokio::signal::ctrl_c() => {
                    canceller.cancel();
                }
            }
        }
    };
    printer.end_reasoning();
    match &outcome {
        Ok(TurnOutcome::Completed(_)) => println!(),
        Ok(TurnOutcome::Cancelled { .. }) => eprintln!("\n{DIM}[cancelled]{RESET}"),
        Err(_) => println!(),
    }
    outcome
}

/// Asks a single question and exits.
pub async fn ask_once(session: &ChatSession, question: &str, show_thinking: bool) -> anyhow::Result<()> {
    session.push_user(question)?;
    stream_reply(session, show_thinking).await?;
    Ok(())
}

/// Line-oriented chat loop over stdin.
pub async fn repl(session: &ChatSession, show_thinking: bool) -> anyhow::Result<()> {
    eprintln!("docchat: ask about your documents. /help for commands, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/help" => {
                eprintln!("/clear    forget the conversation");
                eprintln!("/context  show contexts used for the last answer");
                eprintln!("/history  list the conversation so far");
                eprintln!("/retry    resend the last unanswered question");
                eprintln!("/quit     exit");
            }
            "/clear" => {
                session.clear_history()?;
                eprintln!("{DIM}[history cleared]{RESET}");
            }
            "/context" => match session.last_context() {
                Some(context) => {
                    eprintln!("{DIM}provider: {}{RESET}", context.provider);
                    for (idx, text) in context.contexts.iter().enumerate() {
                        eprintln!("{DIM}[{}] {text}{RESET}", idx + 1);
                    }
                }
                None => eprintln!("{DIM}[no context yet]{RESET}"),
            },
            "/history" => {
                for message in session.history() {
                    eprintln!(
                        "{DIM}{} {}:{RESET} {}",
                        message.timestamp.format("%H:%M:%S"),
                        message.role,
                        message.content
                    );
                }
            }
            "/retry" => report(stream_reply(session, show_thinking).await)?,
            text => {
                session.push_user(text)?;
                report(stream_reply(session, show_thinking).await)?;
            }
        }
    }
    Ok(())
}

/// Turn failures are shown and the loop goes on; anything else aborts.
fn report(result: Result<TurnOutcome, ChatError>) -> anyhow::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(ChatError::Turn(failure)) => {
            eprintln!("error: {failure}");
            Ok(())
        }
        Err(ChatError::Validation(message)) => {
            eprintln!("{message}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
