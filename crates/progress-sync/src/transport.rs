// crates/progress-sync/src/transport.rs
//! Message transport seam
//!
//! The coordinator never talks to a network directly. It sends typed
//! messages through a [`ProgressTransport`] and receives raw JSON through
//! the handlers it subscribes.

use crate::error::{ProgressError, ProgressResult};
use crate::protocol::{MessageType, ProgressMessage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Handler for raw inbound messages of one type
pub type MessageHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Publish/subscribe channel carrying progress messages
pub trait ProgressTransport: Send + Sync {
    /// Publishes a message
    fn send(&self, message: &ProgressMessage) -> ProgressResult<()>;

    /// Registers a handler for inbound messages of `message_type`
    fn subscribe(&self, message_type: MessageType, handler: MessageHandler);
}

/// In-process transport that records what is sent
///
/// `deliver` hands raw JSON to subscribers, which is how tests and demos
/// simulate remote sessions.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<ProgressMessage>>,
    handlers: Mutex<HashMap<MessageType, Vec<MessageHandler>>>,
}

impl MemoryTransport {
    /// Creates an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a raw message to subscribers of its `type`
    ///
    /// Returns the number of handlers that received it.
    pub fn deliver(&self, value: serde_json::Value) -> ProgressResult<usize> {
        let message_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .and_then(MessageType::from_name);
        let Some(message_type) = message_type else {
            return Ok(0);
        };

        let snapshot: Vec<MessageHandler> = self
            .handlers
            .lock()?
            .get(&message_type)
            .cloned()
            .unwrap_or_default();

        for handler in &snapshot {
            handler(value.clone());
        }
        Ok(snapshot.len())
    }

    /// Delivers a typed message as its JSON encoding
    pub fn deliver_message(&self, message: &ProgressMessage) -> ProgressResult<usize> {
        self.deliver(serde_json::to_value(message)?)
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<ProgressMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Removes and returns the messages sent so far
    pub fn take_sent(&self) -> Vec<ProgressMessage> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }

    /// Number of handlers subscribed to a type
    pub fn subscriber_count(&self, message_type: MessageType) -> usize {
        self.handlers
            .lock()
            .map(|h| h.get(&message_type).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ProgressTransport for MemoryTransport {
    fn send(&self, message: &ProgressMessage) -> ProgressResult<()> {
        self.sent
            .lock()
            .map_err(|_| ProgressError::Transport("send queue poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }

    fn subscribe(&self, message_type: MessageType, handler: MessageHandler) {
        match self.handlers.lock() {
            Ok(mut handlers) => handlers.entry(message_type).or_default().push(handler),
            Err(_) => log::warn!("Transport handler lock poisoned, dropping subscription"),
        }
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("sent", &self.sent().len())
            .finish_non_exhaustive()
    }
}
