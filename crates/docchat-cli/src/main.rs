//! `docchat`: chat with your documents from the terminal.

mod chat;
mod config;
mod observability;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use docchat_stream::{ChatSession, ChunkingParams, IngestSource, ServiceClient};

#[derive(Parser, Debug)]
#[command(name = "docchat", version, about = "Chat with your documents", long_about = None)]
struct Cli {
    /// API base URL (overrides DOCCHAT_API_URL).
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Streaming transport: `chunked` or `push` (overrides DOCCHAT_TRANSPORT).
    #[arg(long, global = true)]
    transport: Option<String>,
    /// Contexts retrieved per question (overrides DOCCHAT_TOP_K).
    #[arg(long, global = true)]
    top_k: Option<u32>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Log filter, e.g. `debug` or `docchat_stream=trace`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Write JSONL logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat over your documents.
    Chat {
        #[arg(long)]
        system: Option<String>,
        /// Print reasoning segments as they stream.
        #[arg(long)]
        show_thinking: bool,
    },
    /// Ask one question and print the streamed answer.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        show_thinking: bool,
    },
    /// List the contexts retrieved for a query.
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Upload a text file or PDF for embedding.
    Ingest {
        path: PathBuf,
        /// Title for text documents (defaults to the file name).
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value_t = 1000)]
        chunk_size: u32,
        #[arg(long, default_value_t = 200)]
        overlap: u32,
    },
    /// Single completion without document retrieval.
    Complete {
        #[arg(required = true)]
        prompt: Vec<String>,
        #[arg(long)]
        system: Option<String>,
    },
    /// List stored documents.
    Documents,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_env();
    let cli = Cli::parse();
    observability::init(observability::LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.log_file.as_deref(),
        |key| std::env::var(key).ok(),
    ));

    let overrides = config::Overrides {
        api_url: cli.api_url,
        transport: cli.transport,
        top_k: cli.top_k,
        model: cli.model,
        provider: cli.provider,
    };
    let chat_config = config::resolve(&overrides)?;

    match cli.command {
        Command::Chat {
            system,
            show_thinking,
        } => {
            let session = new_session(chat_config, system)?;
            chat::repl(&session, show_thinking).await
        }
        Command::Ask {
            question,
            system,
            show_thinking,
        } => {
            let session = new_session(chat_config, system)?;
            chat::ask_once(&session, &question.join(" "), show_thinking).await
        }
        Command::Search { query } => {
            let top_k = chat_config.top_k;
            let client = ServiceClient::new(chat_config)?;
            let contexts = client.search(&query.join(" "), top_k).await?;
            if contexts.is_empty() {
                eprintln!("no matching documents");
            }
            for (idx, context) in contexts.iter().enumerate() {
                println!("[{}] {context}", idx + 1);
            }
            Ok(())
        }
        Command::Ingest {
            path,
            title,
            chunk_size,
            overlap,
        } => {
            let client = ServiceClient::new(chat_config)?;
            let source = read_source(&path, title)?;
            let report = client
                .ingest(
                    source,
                    ChunkingParams {
                        chunk_size,
                        overlap,
                    },
                )
                .await?;
            println!(
                "{}: {} chunk(s) processed",
                path.display(),
                report.chunks_processed
            );
            Ok(())
        }
        Command::Complete { prompt, system } => {
            let client = ServiceClient::new(chat_config)?;
            let text = client.complete(&prompt.join(" "), system.as_deref()).await?;
            println!("{text}");
            Ok(())
        }
        Command::Documents => {
            let client = ServiceClient::new(chat_config)?;
            for doc in client.list_documents().await? {
                let preview: String = doc.content.chars().take(80).collect();
                println!("{}\t{preview}", doc.id);
            }
            Ok(())
        }
    }
}

fn new_session(
    config: docchat_stream::ChatConfig,
    system: Option<String>,
) -> anyhow::Result<ChatSession> {
    let session = ChatSession::new(config)?;
    Ok(match system {
        Some(prompt) => session.with_system_prompt(prompt),
        None => session,
    })
}

/// PDFs are uploaded as binary; anything else is read as UTF-8 text.
fn read_source(path: &Path, title: Option<String>) -> anyhow::Result<IngestSource> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string();
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(IngestSource::Binary { file_name, bytes });
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {} as text", path.display()))?;
    Ok(IngestSource::Text {
        title: title.unwrap_or(file_name),
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docchat",
            "ask",
            "what",
            "is",
            "doc1",
            "--transport",
            "push",
            "--top-k",
            "3",
        ])
        .expect("parse");
        assert_eq!(cli.transport.as_deref(), Some("push"));
        assert_eq!(cli.top_k, Some(3));
        assert!(matches!(cli.command, Command::Ask { ref question, .. } if question.join(" ") == "what is doc1"));
    }

    #[test]
    fn pdf_extension_selects_binary_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("Paper.PDF");
        std::fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "plain notes").expect("write txt");

        assert!(matches!(
            read_source(&pdf, None).expect("pdf"),
            IngestSource::Binary { ref file_name, .. } if file_name == "Paper.PDF"
        ));
        assert_eq!(
            read_source(&txt, None).expect("txt"),
            IngestSource::Text {
                title: "notes.txt".into(),
                content: "plain notes".into(),
            }
        );
    }
}
