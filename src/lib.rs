pub mod admission;
pub mod audio;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod monitor;
pub mod nats;
pub mod session;
pub mod store;

pub use admission::{CounterStore, MemoryCounterStore, RateLimiter, SessionValidator};
pub use audio::{AudioEngine, AudioFrame, AudioState, DeviceError, DeviceErrorKind};
pub use capture::{
    AnswerTarget, CaptureDevice, CaptureSummary, ChunkUploader, ChunkedCapture, HttpChunkUploader, RecordingFinalizer,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{create_router, AppState};
pub use media::{FinalizeRequest, FinalizeResponse, Finalizer, UploadRegistry};
pub use monitor::{DeviceProbe, DeviceStatus, HealthMonitor, MonitorHandle};
pub use nats::{EventPublisher, NatsClient, NoopPublisher};
pub use session::{InterviewSession, SessionService, SessionStatus, Study, StudyStatus};
pub use store::{FsObjectStore, InterviewStore, MemoryObjectStore, MemoryStore, ObjectStore};
