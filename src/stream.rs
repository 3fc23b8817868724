//! Stream adapter over a registry subscription.

use crate::error::{Error, Result};
use crate::registry::{BroadcastRegistry, LineSubscriber, SubscriptionId};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Subscriber that forwards every line into a channel.
///
/// The send never blocks, so a slow reader of the channel does not slow
/// down the tail loop; lines queue up in order instead.
struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<String>,
}

impl LineSubscriber for ChannelSubscriber {
    fn on_line(&self, line: &str) -> Result<()> {
        self.sender
            .send(line.to_owned())
            .map_err(|_| Error::SubscriberClosed)
    }
}

/// A stream of the lines broadcast after it was created.
///
/// Dropping the stream unregisters it.
pub struct LineStream {
    receiver: mpsc::UnboundedReceiver<String>,
    registry: Arc<BroadcastRegistry>,
    id: SubscriptionId,
}

impl LineStream {
    /// Registers a new channel-backed subscriber on `registry`.
    pub fn subscribe(registry: &Arc<BroadcastRegistry>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = registry.register(Arc::new(ChannelSubscriber { sender }));

        LineStream {
            receiver,
            registry: Arc::clone(registry),
            id,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the next line if one is already queued.
    pub fn try_next(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

impl Stream for LineStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

impl std::fmt::Debug for LineStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineStream").field("id", &self.id).finish()
    }
}
