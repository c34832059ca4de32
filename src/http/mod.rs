//! HTTP API
//!
//! Participant-facing session endpoints, researcher-authenticated media
//! endpoints and the speech proxy:
//! - POST /start-session, /pause-session, /resume-session, /complete-session
//! - GET /check-session?session_id=...
//! - POST /submit-response, /submit-screener
//! - POST /videos/start-session, /videos/upload-chunk, /videos/finalize
//! - POST /ai/synthesize, /ai/transcribe
//! - GET /health - Health check

mod auth;
mod error;
mod handlers;
mod routes;
mod state;

pub use auth::{client_key, ClientKey, ResearcherDirectory};
pub use error::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
