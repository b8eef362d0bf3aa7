//! # playpen-process
//!
//! Process supervision core for playpen.
//! Starts child programs on behalf of clients, streams their output back as
//! messages, and kills programs on request or when they produce too much.
//!
//! ## Features
//!
//! - Output relays turning stdout/stderr chunks into messages
//! - Per-process output limiter with kill-on-overflow
//! - Exactly one `end` message per process, always last
//! - Sessions mapping `run` / `kill` commands onto the supervisor

pub mod limiter;
pub mod message;
pub mod relay;
pub mod session;
pub mod state;
pub mod supervisor;

pub use limiter::{Limiter, MessageLimit, Verdict};
pub use message::{Message, MessageKind};
pub use relay::MessageWriter;
pub use session::Session;
pub use state::ProcessState;
pub use supervisor::{Process, Supervisor};
