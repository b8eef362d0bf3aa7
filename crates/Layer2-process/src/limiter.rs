//! Output limiter - caps how many messages one process may send
//!
//! The first message over the limit is swallowed and turned into a single
//! kill request. Everything after that is dropped until the process's `end`
//! message, which is always forwarded.

use crate::message::Message;
use playpen_foundation::DEFAULT_MESSAGE_LIMIT;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 64;

/// What to do with one examined message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Pass it on
    Forward,
    /// Pass it on; it was the `end` message and nothing follows
    Finish,
    /// Swallow it and request a kill
    Kill,
    /// Swallow it
    Drop,
}

/// Counter deciding the fate of each message of one process
#[derive(Debug, Clone)]
pub struct MessageLimit {
    limit: usize,
    seen: usize,
}

impl MessageLimit {
    pub fn new(limit: usize) -> Self {
        Self { limit, seen: 0 }
    }

    /// Messages examined so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn examine(&mut self, msg: &Message) -> Verdict {
        let verdict = if msg.is_end() {
            Verdict::Finish
        } else if self.seen < self.limit {
            Verdict::Forward
        } else if self.seen == self.limit {
            Verdict::Kill
        } else {
            Verdict::Drop
        };
        self.seen = self.seen.saturating_add(1);
        verdict
    }
}

/// Spawns one limiting relay task per process
#[derive(Debug, Clone)]
pub struct Limiter {
    limit: usize,
    capacity: usize,
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LIMIT)
    }
}

impl Limiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Input buffer size. Writers only block once this many messages are queued.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Start relaying to `dest`. Returns the stream the process should write to.
    ///
    /// The task exits after forwarding `end`, when the returned sender and all
    /// its clones are dropped, or when `dest` is closed.
    pub fn spawn(
        &self,
        kill: mpsc::UnboundedSender<Message>,
        dest: mpsc::Sender<Message>,
    ) -> mpsc::Sender<Message> {
        let (tx, mut rx) = mpsc::channel::<Message>(self.capacity);
        let mut state = MessageLimit::new(self.limit);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match state.examine(&msg) {
                    Verdict::Forward => {
                        if dest.send(msg).await.is_err() {
                            debug!("Limiter destination closed");
                            return;
                        }
                    }
                    Verdict::Finish => {
                        let _ = dest.send(msg).await;
                        return;
                    }
                    Verdict::Kill => {
                        warn!(
                            "Process {} exceeded {} messages, requesting kill",
                            msg.id, state.limit
                        );
                        if kill.send(Message::kill(msg.id)).is_err() {
                            debug!("Kill request stream closed");
                        }
                    }
                    Verdict::Drop => {}
                }
            }
        });

        tx
    }
}
