use super::packets::ResultCode;
use strum_macros::Display;
use tokio::sync::oneshot;

/// Why an outstanding command packet will never be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LinkFailure {
    #[strum(to_string = "Sending message to arduino might have failed, no answer received")]
    Timeout,
    #[strum(to_string = "Lost connection")]
    LostConnection,
    #[strum(to_string = "Arduino not connected")]
    NotConnected,
    #[strum(to_string = "Message index reused before an answer was received")]
    Superseded,
    #[strum(to_string = "Completion slot dropped")]
    Dropped,
}

pub type Outcome = Result<ResultCode, LinkFailure>;

/// State of a [`CompletionHandle`] as seen by its owning part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Resolved(ResultCode),
    Failed(LinkFailure),
}

/// Write side of a completion slot, kept by the adapter's correlation map.
#[derive(Debug)]
pub struct CompletionResolver {
    tx: oneshot::Sender<Outcome>,
}

impl CompletionResolver {
    pub fn resolve(self, code: ResultCode) { let _ = self.tx.send(Ok(code)); }

    pub fn fail(self, reason: LinkFailure) { let _ = self.tx.send(Err(reason)); }
}

/// Read side of a completion slot, polled by a part once per tick.
///
/// Resolves exactly once; after that [`poll`](Self::poll) keeps returning
/// the settled state.
#[derive(Debug)]
pub struct CompletionHandle {
    rx: oneshot::Receiver<Outcome>,
    settled: Option<HandleState>,
}

impl CompletionHandle {
    /// A handle that is already failed, for commands that never made it onto the wire.
    pub fn failed(reason: LinkFailure) -> Self {
        let (resolver, handle) = completion_pair();
        resolver.fail(reason);
        handle
    }

    pub fn poll(&mut self) -> HandleState {
        if let Some(state) = self.settled {
            return state;
        }
        let state = match self.rx.try_recv() {
            Ok(Ok(code)) => HandleState::Resolved(code),
            Ok(Err(reason)) => HandleState::Failed(reason),
            Err(oneshot::error::TryRecvError::Empty) => return HandleState::Pending,
            Err(oneshot::error::TryRecvError::Closed) => HandleState::Failed(LinkFailure::Dropped),
        };
        self.settled = Some(state);
        state
    }
}

pub fn completion_pair() -> (CompletionResolver, CompletionHandle) {
    let (tx, rx) = oneshot::channel();
    (CompletionResolver { tx }, CompletionHandle { rx, settled: None })
}
