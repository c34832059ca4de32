//! Audio orchestration: devices, codecs, analysis, speech and the engine
//! that ties them into speak/listen turns.

pub mod analyser;
pub mod backend;
pub mod codec;
mod engine;
pub mod speech;

pub use analyser::{LevelFrame, LevelTap};
pub use backend::{
    AudioFrame, AudioOutput, DeviceError, DeviceErrorKind, DeviceLease, Microphone, MicrophoneStream,
};
pub use codec::DecodedAudio;
pub use engine::{AudioEngine, AudioState};
pub use speech::{InterviewApiClient, OpenAiSpeech, SpeechRequest, SpeechSynthesizer, Transcriber};
