//! Tab message outbox.
//!
//! The core never talks to tabs directly. It posts [`TabMessage`]s to a
//! [`TabDispatcher`]; delivery is fire-and-forget and failures are swallowed.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::classifier::Decision;
use crate::session::Session;

/// Browser tab identifier.
pub type TabId = i64;

/// Default capacity of the broadcast outbox.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Instruction for a tab's content script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TabMessage {
    /// A session started; tabs should begin analysis.
    StartBlocking { session: Session },
    /// The session ended; tabs should restore everything.
    StopBlocking,
    /// Hide the listed elements.
    ApplyBlocks {
        selectors: Vec<String>,
        reason: String,
        score: u8,
    },
    /// Replace the page with the blocked view.
    BlockPage { reason: String, score: u8 },
    /// Restore any hidden elements.
    ClearBlocks,
}

impl TabMessage {
    /// Maps a decision to the message that applies it.
    pub fn for_decision(decision: &Decision) -> Self {
        if decision.blocks_page() {
            TabMessage::BlockPage {
                reason: decision.reason.clone(),
                score: decision.score,
            }
        } else if !decision.selectors_to_block.is_empty() {
            TabMessage::ApplyBlocks {
                selectors: decision.selectors_to_block.clone(),
                reason: decision.reason.clone(),
                score: decision.score,
            }
        } else {
            TabMessage::ClearBlocks
        }
    }

    /// Short name used in logs.
    pub fn action(&self) -> &'static str {
        match self {
            TabMessage::StartBlocking { .. } => "startBlocking",
            TabMessage::StopBlocking => "stopBlocking",
            TabMessage::ApplyBlocks { .. } => "applyBlocks",
            TabMessage::BlockPage { .. } => "blockPage",
            TabMessage::ClearBlocks => "clearBlocks",
        }
    }
}

/// Message recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tab_id")]
pub enum DispatchTarget {
    All,
    Tab(TabId),
}

/// A message with its recipients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub target: DispatchTarget,
    pub message: TabMessage,
}

/// Outbox for tab messages. Must not block.
pub trait TabDispatcher: Send + Sync {
    fn dispatch(&self, target: DispatchTarget, message: TabMessage);
}

/// Dispatcher that publishes to a `tokio` broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    tx: broadcast::Sender<Envelope>,
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribes to all future envelopes.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl TabDispatcher for BroadcastDispatcher {
    fn dispatch(&self, target: DispatchTarget, message: TabMessage) {
        let action = message.action();
        if self.tx.send(Envelope { target, message }).is_err() {
            tracing::debug!(action, ?target, "No listeners for tab message (ignored)");
        } else {
            tracing::trace!(action, ?target, "Tab message dispatched");
        }
    }
}
