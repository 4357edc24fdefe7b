//! Recording session management
//!
//! This module provides the `SessionController` that coordinates:
//! - Audio capture into the buffer queue
//! - The background chunk writer
//! - The session's marker log
//! - The Idle → Recording → Stopping → Idle state machine

mod markers;
mod session;
mod stats;

pub use markers::{Marker, MarkerLog};
pub use session::SessionController;
pub use stats::{Session, SessionState, SessionStats};
