use std::path::PathBuf;
use std::sync::Arc;

use super::auth::ResearcherDirectory;
use crate::admission::{CounterStore, RateLimiter, SessionValidator};
use crate::audio::{SpeechSynthesizer, Transcriber};
use crate::clock::Clock;
use crate::config::{Config, LimitsConfig};
use crate::media::{Finalizer, UploadRegistry};
use crate::nats::EventPublisher;
use crate::session::{SessionPolicy, SessionService};
use crate::store::{InterviewStore, ObjectStore};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub store: Arc<dyn InterviewStore>,
    pub uploads: Arc<UploadRegistry>,
    pub finalizer: Arc<Finalizer>,
    pub limiter: RateLimiter,
    pub validator: SessionValidator,
    pub researchers: Arc<ResearcherDirectory>,
    /// Speech endpoints answer 503 while these are unset
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub limits: LimitsConfig,
    /// Directory served under `/media`, when this process serves media itself
    pub media_dir: Option<PathBuf>,
}

impl AppState {
    /// Wire every service from configuration and the external collaborators
    pub fn new(
        cfg: &Config,
        store: Arc<dyn InterviewStore>,
        objects: Arc<dyn ObjectStore>,
        counters: Arc<dyn CounterStore>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = SessionService::new(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&clock),
            SessionPolicy::from(&cfg.session),
        );
        let uploads = Arc::new(UploadRegistry::new(Arc::clone(&objects), Arc::clone(&clock)));
        let finalizer = Finalizer::new(
            Arc::clone(&uploads),
            objects,
            Arc::clone(&store),
            events,
            Arc::clone(&clock),
            cfg.service.public_base_url.clone(),
        );

        Self {
            sessions: Arc::new(sessions),
            validator: SessionValidator::new(Arc::clone(&store)),
            store,
            uploads,
            finalizer: Arc::new(finalizer),
            limiter: RateLimiter::new(counters, clock),
            researchers: Arc::new(ResearcherDirectory::new(cfg.auth.researcher_tokens.clone())),
            synthesizer: None,
            transcriber: None,
            limits: cfg.limits.clone(),
            media_dir: None,
        }
    }

    pub fn with_speech(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = Some(dir.into());
        self
    }
}
