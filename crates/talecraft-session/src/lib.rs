//! # talecraft-session
//!
//! Per-slot generation sessions on top of `talecraft-client`.
//!
//! Each [`Slot`](talecraft_types::Slot) (initial draft, continuation,
//! rewrite) holds at most one live session. Starting a new session in a slot
//! cancels the previous one, and the coordinator guarantees that a cancelled
//! or superseded session never delivers another callback.

pub mod coordinator;
pub mod listener;

pub use coordinator::{GenerationCoordinator, SessionId, DEFAULT_TEARDOWN_GRACE};
pub use listener::{CallbackListener, GenerationListener};
