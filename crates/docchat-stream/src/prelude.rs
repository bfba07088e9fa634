//! Common imports for typical client usage.
pub use crate::{
    Canceller, ChatConfig, ChatError, ChatSession, CompletedTurn, Message, RetrievedContext, Role,
    ServiceClient, TransportKind, TurnObserver, TurnOutcome, TurnPhase,
};
