//! Turn lifecycle: one streaming request at a time, committed all-or-nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::decoder::{Frame, FrameDecoder};
use crate::dispatch::{Dispatcher, EventSink};
use crate::errors::{ChatError, TurnFailure, turn_failure_from_stream_error};
use crate::event::StreamEvent;
use crate::model::{Message, RetrievedContext, Role, TurnRequest};
use crate::thinking::{ThinkingExtractor, ThinkingPiece};
use crate::transport::{StreamTransport, TransportStream, transport_for};

/// Where the session is in its turn lifecycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TurnPhase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Incremental updates while a turn streams. All methods default to no-ops.
pub trait TurnObserver {
    fn on_context(&mut self, _context: &RetrievedContext) {}
    /// Answer text outside reasoning segments.
    fn on_visible(&mut self, _text: &str) {}
    /// Text of the reasoning segment currently open.
    fn on_reasoning(&mut self, _text: &str) {}
    fn on_reasoning_closed(&mut self, _segment: &str) {}
}

impl TurnObserver for () {}

/// Result of a successfully committed turn.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedTurn {
    pub turn_id: uuid::Uuid,
    /// The assistant message appended to history.
    pub message: Message,
    pub context: Option<RetrievedContext>,
    /// Reasoning segments in the order they were produced.
    pub reasoning: Vec<String>,
}

/// How a turn ended, when it did not fail.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnOutcome {
    Completed(CompletedTurn),
    /// Cancelled by the caller. Nothing was committed.
    Cancelled { turn_id: uuid::Uuid },
}

impl TurnOutcome {
    pub fn turn_id(&self) -> uuid::Uuid {
        match self {
            Self::Completed(turn) => turn.turn_id,
            Self::Cancelled { turn_id } => *turn_id,
        }
    }

    pub fn completed(&self) -> Option<&CompletedTurn> {
        match self {
            Self::Completed(turn) => Some(turn),
            Self::Cancelled { .. } => None,
        }
    }
}

/// Requests cancellation of whatever turn is currently streaming.
#[derive(Clone)]
pub struct Canceller {
    inner: Arc<SessionInner>,
}

impl Canceller {
    /// Signals the active turn to stop. Returns `false` if nothing was streaming.
    ///
    /// Cancellation is cooperative: the turn observes it at its next
    /// suspension point and discards any chunk already in flight.
    pub fn cancel(&self) -> bool {
        let state = self.inner.lock();
        match &state.active {
            Some(active) => {
                debug!(turn_id = %active.turn_id, "cancellation requested");
                let _ = active.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }
}

struct ActiveTurn {
    turn_id: uuid::Uuid,
    cancel_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct SessionState {
    system_prompt: Option<Message>,
    history: Vec<Message>,
    phase: TurnPhase,
    active: Option<ActiveTurn>,
    last_context: Option<RetrievedContext>,
    last_error: Option<TurnFailure>,
}

struct SessionInner {
    transport: Arc<dyn StreamTransport>,
    config: ChatConfig,
    state: Mutex<SessionState>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A conversation with the document chat service.
///
/// Cloning yields another handle to the same conversation. At most one turn
/// streams at a time; a second `send` while one is active fails with
/// [`ChatError::Busy`].
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Creates a session using the transport selected by `config`.
    pub fn new(config: ChatConfig) -> Result<Self, ChatError> {
        let transport = transport_for(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a session over an explicit transport.
    pub fn with_transport(config: ChatConfig, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                config,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Sets a system message sent ahead of the history on every turn.
    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        {
            let mut state = self.inner.lock();
            state.system_prompt = (!prompt.trim().is_empty()).then(|| Message::system(prompt));
        }
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    pub fn canceller(&self) -> Canceller {
        Canceller {
            inner: self.inner.clone(),
        }
    }

    /// Committed turn history (system prompt excluded).
    pub fn history(&self) -> Vec<Message> {
        self.inner.lock().history.clone()
    }

    pub fn phase(&self) -> TurnPhase {
        self.inner.lock().phase
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    /// Context retrieved for the most recent completed turn.
    pub fn last_context(&self) -> Option<RetrievedContext> {
        self.inner.lock().last_context.clone()
    }

    /// Failure of the most recent turn, cleared when a new turn starts.
    pub fn last_error(&self) -> Option<TurnFailure> {
        self.inner.lock().last_error.clone()
    }

    /// Appends a user message to history.
    pub fn push_user(&self, text: impl Into<String>) -> Result<(), ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }
        let mut state = self.inner.lock();
        if state.active.is_some() {
            return Err(ChatError::Busy);
        }
        state.history.push(Message::user(text.trim()));
        Ok(())
    }

    /// Drops all committed messages and the stored context.
    pub fn clear_history(&self) -> Result<(), ChatError> {
        let mut state = self.inner.lock();
        if state.active.is_some() {
            return Err(ChatError::Busy);
        }
        state.history.clear();
        state.last_context = None;
        state.last_error = None;
        state.phase = TurnPhase::Idle;
        Ok(())
    }

    /// Pushes `text` as a user message and streams the reply.
    pub async fn ask(&self, text: impl Into<String>) -> Result<TurnOutcome, ChatError> {
        self.ask_with(text, &mut ()).await
    }

    pub async fn ask_with<O>(
        &self,
        text: impl Into<String>,
        observer: &mut O,
    ) -> Result<TurnOutcome, ChatError>
    where
        O: TurnObserver + ?Sized,
    {
        self.push_user(text)?;
        self.send_with(observer).await
    }

    /// Streams a reply to the current history.
    pub async fn send(&self) -> Result<TurnOutcome, ChatError> {
        self.send_with(&mut ()).await
    }

    /// Streams a reply to the current history, reporting progress to
    /// `observer`.
    ///
    /// On success the assistant message is appended to history. Cancellation
    /// returns [`TurnOutcome::Cancelled`]; failures return
    /// [`ChatError::Turn`]. Neither touches history.
    pub async fn send_with<O>(&self, observer: &mut O) -> Result<TurnOutcome, ChatError>
    where
        O: TurnObserver + ?Sized,
    {
        let (request, mut cancel_rx, guard) = self.begin_turn()?;
        let turn_id = guard.turn_id;
        debug!(
            turn_id = %turn_id,
            transport = %self.inner.transport.kind(),
            messages = request.messages.len(),
            "turn started"
        );

        let mut turn = TurnState::new(observer);
        let end = self.run_turn(&request, &mut cancel_rx, &mut turn).await;
        let result = self.finish_turn(turn_id, end, turn);
        drop(guard);
        result
    }

    fn begin_turn(&self) -> Result<(TurnRequest, watch::Receiver<bool>, ActiveGuard), ChatError> {
        let mut state = self.inner.lock();
        if state.active.is_some() {
            return Err(ChatError::Busy);
        }
        if state.phase.is_terminal() {
            state.phase = TurnPhase::Idle;
        }
        if !matches!(state.history.last(), Some(m) if m.role == Role::User) {
            return Err(ChatError::Validation(
                "send requires a pending user message".into(),
            ));
        }

        let turn_id = uuid::Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        state.active = Some(ActiveTurn { turn_id, cancel_tx });
        state.phase = TurnPhase::Streaming;
        state.last_error = None;

        let config = &self.inner.config;
        let request = TurnRequest {
            messages: state
                .system_prompt
                .iter()
                .chain(state.history.iter())
                .cloned()
                .collect(),
            top_k: config.top_k,
            model: config.model.clone(),
            provider: config.provider.clone(),
        };
        let guard = ActiveGuard {
            inner: self.inner.clone(),
            turn_id,
        };
        Ok((request, cancel_rx, guard))
    }

    async fn run_turn<O>(
        &self,
        request: &TurnRequest,
        cancel_rx: &mut watch::Receiver<bool>,
        turn: &mut TurnState<'_, O>,
    ) -> TurnEnd
    where
        O: TurnObserver + ?Sized,
    {
        let opened = tokio::select! {
            biased;
            _ = cancelled(cancel_rx) => return TurnEnd::Cancelled,
            opened = self.inner.transport.open(request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => return TurnEnd::Failed(turn_failure_from_stream_error(&err)),
        };

        let mut decoder = FrameDecoder::new();
        let mut dispatcher = Dispatcher::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel_rx) => return close_with(stream, TurnEnd::Cancelled),
                next = stream.next_chunk() => next,
            };
            // a chunk that raced with cancellation is discarded
            if *cancel_rx.borrow() {
                return close_with(stream, TurnEnd::Cancelled);
            }

            match next {
                Some(Ok(chunk)) => {
                    for frame in decoder.push_chunk(&chunk) {
                        if let Some(end) = turn.apply_frame(frame, &mut dispatcher) {
                            return close_with(stream, end);
                        }
                    }
                }
                Some(Err(err)) => {
                    return close_with(stream, TurnEnd::Failed(turn_failure_from_stream_error(&err)));
                }
                None => {
                    if let Some(frame) = decoder.finish()
                        && let Some(end) = turn.apply_frame(frame, &mut dispatcher)
                    {
                        return end;
                    }
                    debug!(
                        forwarded = dispatcher.forwarded(),
                        "stream ended without terminator"
                    );
                    return TurnEnd::Failed(TurnFailure::Transport {
                        message: "stream ended before completion".into(),
                        status_code: None,
                    });
                }
            }
        }
    }

    fn finish_turn<O>(
        &self,
        turn_id: uuid::Uuid,
        end: TurnEnd,
        mut turn: TurnState<'_, O>,
    ) -> Result<TurnOutcome, ChatError>
    where
        O: TurnObserver + ?Sized,
    {
        let mut state = self.inner.lock();
        if state.active.as_ref().is_some_and(|a| a.turn_id == turn_id) {
            state.active = None;
        }

        match end {
            TurnEnd::Completed => {
                let (visible, reasoning) = turn.extractor.take();
                let message = Message::assistant(visible);
                state.history.push(message.clone());
                state.phase = TurnPhase::Completed;
                if turn.context.is_some() {
                    state.last_context = turn.context.clone();
                }
                info!(
                    turn_id = %turn_id,
                    tokens = turn.tokens,
                    chars = message.content.len(),
                    "turn completed"
                );
                Ok(TurnOutcome::Completed(CompletedTurn {
                    turn_id,
                    message,
                    context: turn.context,
                    reasoning,
                }))
            }
            TurnEnd::Cancelled => {
                turn.extractor.reset();
                state.phase = TurnPhase::Cancelled;
                info!(turn_id = %turn_id, tokens = turn.tokens, "turn cancelled");
                Ok(TurnOutcome::Cancelled { turn_id })
            }
            TurnEnd::Failed(failure) => {
                turn.extractor.reset();
                state.phase = TurnPhase::Failed;
                state.last_error = Some(failure.clone());
                warn!(turn_id = %turn_id, error = %failure, "turn failed");
                Err(ChatError::Turn(failure))
            }
        }
    }
}

/// Releases the cancellation token even if the send future is dropped.
struct ActiveGuard {
    inner: Arc<SessionInner>,
    turn_id: uuid::Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if state.active.as_ref().is_some_and(|a| a.turn_id == self.turn_id) {
            debug!(turn_id = %self.turn_id, "turn abandoned before completion");
            state.active = None;
            state.phase = TurnPhase::Cancelled;
        }
    }
}

enum TurnEnd {
    Completed,
    Cancelled,
    Failed(TurnFailure),
}

/// Per-turn accumulators, owned by one `send` call.
struct TurnState<'a, O: ?Sized> {
    observer: &'a mut O,
    extractor: ThinkingExtractor,
    context: Option<RetrievedContext>,
    tokens: u64,
    end: Option<TurnEnd>,
}

impl<'a, O> TurnState<'a, O>
where
    O: TurnObserver + ?Sized,
{
    fn new(observer: &'a mut O) -> Self {
        Self {
            observer,
            extractor: ThinkingExtractor::new(),
            context: None,
            tokens: 0,
            end: None,
        }
    }

    /// Applies one frame; returns how the turn ends if this frame ends it.
    fn apply_frame(&mut self, frame: Frame, dispatcher: &mut Dispatcher) -> Option<TurnEnd> {
        match frame {
            Frame::EndOfStream => Some(TurnEnd::Completed),
            Frame::Payload(payload) => {
                dispatcher.dispatch(&payload, self);
                self.end.take()
            }
        }
    }
}

impl<O> EventSink for TurnState<'_, O>
where
    O: TurnObserver + ?Sized,
{
    fn on_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Context { contexts, provider } => {
                let context = RetrievedContext { contexts, provider };
                self.observer.on_context(&context);
                self.context = Some(context);
            }
            StreamEvent::Token { content } => {
                self.tokens += 1;
                for piece in self.extractor.push(&content).pieces {
                    match piece {
                        ThinkingPiece::Visible(text) => self.observer.on_visible(&text),
                        ThinkingPiece::Reasoning(text) => self.observer.on_reasoning(&text),
                        ThinkingPiece::Closed(segment) => self.observer.on_reasoning_closed(&segment),
                    }
                }
            }
            StreamEvent::Done => self.end = Some(TurnEnd::Completed),
            StreamEvent::Error { message } => {
                self.end = Some(TurnEnd::Failed(TurnFailure::Upstream { message }));
            }
        }
    }
}

/// Resolves once the token is set. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn close_with(stream: TransportStream, end: TurnEnd) -> TurnEnd {
    stream.close();
    end
}
