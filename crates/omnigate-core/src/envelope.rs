use tokio::sync::oneshot;

use crate::context::DispatchContext;
use crate::errors::BifrostError;
use crate::request::{BifrostRequest, RequestKind};
use crate::response::BifrostResponse;

pub type DispatchReply = Result<BifrostResponse, BifrostError>;

/// The envelope a worker consumes exactly once. `reply` is a single-slot
/// oneshot: in Go this would be a pair of response/error channels, but a
/// `Result` oneshot gives the same single-slot, checked-once-per-dispatch
/// guarantee with one less moving part.
pub struct ChannelMessage {
    pub kind: RequestKind,
    pub request: Option<BifrostRequest>,
    pub context: Option<DispatchContext>,
    reply_tx: Option<oneshot::Sender<DispatchReply>>,
    reply_rx: Option<oneshot::Receiver<DispatchReply>>,
}

impl ChannelMessage {
    pub fn new() -> Self {
        Self {
            kind: RequestKind::ChatCompletion,
            request: None,
            context: None,
            reply_tx: None,
            reply_rx: None,
        }
    }

    /// Reset to a blank, reusable state. Called by the pool on checkout so a
    /// stale reply from a previous dispatch can never leak into a new one.
    pub fn reset(&mut self) {
        self.request = None;
        self.context = None;
        let (tx, rx) = oneshot::channel();
        self.reply_tx = Some(tx);
        self.reply_rx = Some(rx);
    }

    pub fn configure(&mut self, request: BifrostRequest, context: DispatchContext) {
        self.kind = request.kind();
        self.request = Some(request);
        self.context = Some(context);
    }

    pub fn take_reply_sender(&mut self) -> oneshot::Sender<DispatchReply> {
        self.reply_tx
            .take()
            .expect("ChannelMessage::reset must run before take_reply_sender")
    }

    pub fn take_reply_receiver(&mut self) -> oneshot::Receiver<DispatchReply> {
        self.reply_rx
            .take()
            .expect("ChannelMessage::reset must run before take_reply_receiver")
    }

    /// Strips the envelope down to the lightweight value a worker actually
    /// needs, leaving `self` (request/context now `None`) resident with its
    /// owner so it can be handed back to the pool once the reply arrives.
    pub fn into_queued(&mut self) -> QueuedMessage {
        QueuedMessage {
            request: self.request.take().expect("configure before enqueue"),
            context: self.context.take().expect("configure before enqueue"),
            reply_tx: self.take_reply_sender(),
        }
    }
}

/// What actually travels through a provider's bounded queue. Cheap to move;
/// the `ChannelMessage` it was carved out of stays with the dispatcher.
pub struct QueuedMessage {
    pub request: BifrostRequest,
    pub context: DispatchContext,
    pub reply_tx: oneshot::Sender<DispatchReply>,
}

impl Default for ChannelMessage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_replaces_the_reply_channel() {
        let mut msg = ChannelMessage::new();
        msg.reset();
        let tx = msg.take_reply_sender();
        let _ = tx.send(Err(BifrostError::cancelled()));

        msg.reset();
        let rx = msg.take_reply_receiver();
        assert!(rx.try_recv().is_err());
    }
}
