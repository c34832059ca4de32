use std::sync::Arc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::store::InterviewStore;

/// Gate for unauthenticated media/AI endpoints: the caller must present the
/// id of an existing interview session.
#[derive(Clone)]
pub struct SessionValidator {
    store: Arc<dyn InterviewStore>,
}

impl SessionValidator {
    pub fn new(store: Arc<dyn InterviewStore>) -> Self {
        Self { store }
    }

    /// Whether `token` names an existing session. Store failures count as invalid.
    pub async fn validate_session(&self, token: &str) -> bool {
        if token.trim().is_empty() {
            return false;
        }
        match self.store.session(token).await {
            Ok(session) => session.is_some(),
            Err(e) => {
                warn!("Session validation failed for {}: {}", token, e);
                false
            }
        }
    }

    /// Like [`Self::validate_session`] but fails with `Unauthorized`
    pub async fn require(&self, token: Option<&str>) -> Result<()> {
        match token {
            Some(token) if self.validate_session(token).await => Ok(()),
            _ => Err(Error::Unauthorized("a valid session_id is required".to_string())),
        }
    }
}
