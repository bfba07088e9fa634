//! Streaming client for retrieval-augmented document chat.
//!
//! A [`ChatSession`] sends the conversation to the service, reads the answer
//! as a stream of `data: <json>` frames, separates `<think>` reasoning from
//! the visible answer, and commits the assistant message only when the turn
//! completes.
//!
//! # Usage
//!
//! ```no_run
//! use docchat_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let session = ChatSession::new(ChatConfig::from_env()?)?;
//!
//! match session.ask("What do my documents say about retries?").await? {
//!     TurnOutcome::Completed(turn) => println!("{}", turn.message.content),
//!     TurnOutcome::Cancelled { .. } => println!("(cancelled)"),
//! }
//! # Ok(())
//! # }
//! ```

/// Client configuration and transport selection.
pub mod config;
/// Line-oriented frame decoder.
pub mod decoder;
/// Payload parsing and in-order event routing.
pub mod dispatch;
/// Public error types.
pub mod errors;
/// Typed stream events.
pub mod event;
/// Messages, turn requests, retrieved context.
pub mod model;
/// Common imports for typical usage.
pub mod prelude;
/// Request/response collaborators: search, ingestion, completion.
pub mod services;
/// Turn lifecycle and history.
pub mod session;
/// Reasoning/answer separation.
pub mod thinking;
/// Chunked-body and push-channel transports.
pub mod transport;

pub use config::{ChatConfig, TransportKind};
pub use decoder::{Frame, FrameDecoder};
pub use dispatch::{Dispatcher, EventSink, parse_event};
pub use errors::{ChatError, StreamError, TurnFailure};
pub use event::StreamEvent;
pub use model::{Message, RetrievedContext, Role, TurnRequest};
pub use services::{
    ChunkingParams, DocumentChatReply, IngestReport, IngestSource, ServiceClient, StoredDocument,
};
pub use session::{Canceller, ChatSession, CompletedTurn, TurnObserver, TurnOutcome, TurnPhase};
pub use thinking::{ThinkingExtractor, ThinkingPiece, ThinkingState, ThinkingUpdate};
pub use transport::{StreamTransport, TransportStream, transport_for};
