//! HTTP API for external control of the recorder
//!
//! - GET /health - Health check
//! - GET /devices - Enumerate input devices
//! - GET /session - Query controller status
//! - POST /session/start - Start a new recording
//! - POST /session/mark - Drop a marker in the active recording
//! - POST /session/stop - Stop the active recording

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
