use futures::future::{AbortHandle, Abortable};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::analyser::{LevelFrame, LevelTap};
use super::backend::{AudioFrame, AudioOutput, DeviceLease, Microphone};
use super::codec::{self, DecodedAudio};
use super::speech::{SpeechRequest, SpeechSynthesizer, Transcriber};
use crate::error::{Error, Result};

/// Where the engine is in its speak or listen flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum AudioState {
    Idle,
    Synthesizing,
    Playing,
    Recording,
    Transcribing,
    Error(String),
}

impl AudioState {
    fn is_listening(&self) -> bool {
        matches!(self, Self::Recording | Self::Transcribing)
    }
}

impl fmt::Display for AudioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Synthesizing => f.write_str("synthesizing"),
            Self::Playing => f.write_str("playing"),
            Self::Recording => f.write_str("recording"),
            Self::Transcribing => f.write_str("transcribing"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// PCM gathered from the microphone during one recording
#[derive(Debug, Default)]
struct CapturedAudio {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
}

impl CapturedAudio {
    fn push(&mut self, frame: AudioFrame) {
        self.sample_rate = frame.sample_rate;
        self.channels = frame.channels;
        self.samples.extend_from_slice(&frame.samples);
    }
}

struct ActiveRecording {
    lease: DeviceLease,
    stop: oneshot::Sender<()>,
    collector: JoinHandle<CapturedAudio>,
}

struct ActiveSpeech {
    generation: u64,
    handle: AbortHandle,
}

/// Audio orchestration for voice interviews
///
/// One engine drives one participant's turns: speaking the interviewer's
/// prompt and listening to the answer. A new `speak` cancels the previous
/// one, starting to record interrupts speech, and every device or playback
/// resource is released on every exit path including drop.
pub struct AudioEngine {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transcriber: Arc<dyn Transcriber>,
    microphone: Arc<dyn Microphone>,
    output: Arc<dyn AudioOutput>,
    state: watch::Sender<AudioState>,
    playback_levels: watch::Sender<LevelFrame>,
    capture_levels: watch::Sender<LevelFrame>,
    generation: AtomicU64,
    speech: Mutex<Option<ActiveSpeech>>,
    recording: Mutex<Option<ActiveRecording>>,
}

impl AudioEngine {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        microphone: Arc<dyn Microphone>,
        output: Arc<dyn AudioOutput>,
    ) -> Self {
        let (state, _) = watch::channel(AudioState::Idle);
        let (playback_levels, _) = watch::channel(LevelFrame::default());
        let (capture_levels, _) = watch::channel(LevelFrame::default());
        Self {
            synthesizer,
            transcriber,
            microphone,
            output,
            state,
            playback_levels,
            capture_levels,
            generation: AtomicU64::new(0),
            speech: Mutex::new(None),
            recording: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AudioState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AudioState> {
        self.state.subscribe()
    }

    /// Levels of what is being played, for the speaking visualization
    pub fn playback_levels(&self) -> watch::Receiver<LevelFrame> {
        self.playback_levels.subscribe()
    }

    /// Levels of what the microphone hears
    pub fn capture_levels(&self) -> watch::Receiver<LevelFrame> {
        self.capture_levels.subscribe()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn set_state(&self, state: AudioState) {
        debug!("Audio state -> {}", state);
        self.state.send_replace(state);
    }

    /// Synthesize `text` and play it. Resolves when playback ends.
    ///
    /// A call superseded by a later `speak` or by `stop_speaking` resolves
    /// with `Ok(())`. Speaking while recording is rejected and leaves the
    /// recording untouched.
    pub async fn speak(&self, text: &str, voice_id: &str, session_id: &str) -> Result<()> {
        if self.is_recording() {
            return Err(Error::InvalidState("recording in progress".to_string()));
        }
        self.cancel_speech();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (handle, registration) = AbortHandle::new_pair();
        *self.speech.lock().unwrap_or_else(|e| e.into_inner()) = Some(ActiveSpeech { generation, handle });

        self.set_state(AudioState::Synthesizing);
        let request = SpeechRequest {
            text: text.to_string(),
            voice_id: voice_id.to_string(),
            session_id: session_id.to_string(),
            language: None,
        };

        let flow = async {
            let encoded = self.synthesizer.synthesize(&request).await?;
            let audio = decode_off_thread(encoded).await?;
            if audio.is_empty() {
                return Ok(());
            }
            self.set_state(AudioState::Playing);
            let tap = LevelTap::new(self.playback_levels.clone());
            self.output.play(audio, tap).await
        };

        let result = Abortable::new(flow, registration).await;

        // Only the newest speak owns the state and the handle
        if !self.finish_speech(generation) {
            return Ok(());
        }
        self.playback_levels.send_replace(LevelFrame::default());

        match result {
            Err(_aborted) => Ok(()),
            Ok(Ok(())) => {
                self.set_state(AudioState::Idle);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Speech for session {} failed: {}", session_id, e);
                self.output.stop();
                self.set_state(AudioState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Cancel any synthesis in flight and halt playback
    pub fn stop_speaking(&self) {
        self.cancel_speech();
        if !self.state.borrow().is_listening() {
            self.set_state(AudioState::Idle);
        }
    }

    fn cancel_speech(&self) {
        if let Some(active) = self.speech.lock().unwrap_or_else(|e| e.into_inner()).take() {
            debug!("Cancelling speech #{}", active.generation);
            active.handle.abort();
        }
        self.output.stop();
        self.playback_levels.send_replace(LevelFrame::default());
    }

    /// Clear the active speech if it is still `generation`
    fn finish_speech(&self, generation: u64) -> bool {
        let mut speech = self.speech.lock().unwrap_or_else(|e| e.into_inner());
        match speech.as_ref() {
            Some(active) if active.generation == generation => {
                *speech = None;
                true
            }
            _ => false,
        }
    }

    /// Acquire the microphone and start buffering the answer
    pub async fn start_recording(&self) -> Result<()> {
        if self.is_recording() {
            return Err(Error::InvalidState("already recording".to_string()));
        }
        self.cancel_speech();

        let stream = match self.microphone.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Microphone unavailable ({}): {}", e.kind, e.message);
                self.set_state(AudioState::Error(e.to_string()));
                return Err(Error::Device(e));
            }
        };

        let (stop, stop_rx) = oneshot::channel();
        let tap = LevelTap::new(self.capture_levels.clone());
        let collector = tokio::spawn(collect(stream.frames, stop_rx, tap));

        let mut recording = self.recording.lock().unwrap_or_else(|e| e.into_inner());
        if recording.is_some() {
            // Lost a race with a concurrent start; the new lease drops here
            collector.abort();
            return Err(Error::InvalidState("already recording".to_string()));
        }
        info!("Recording from {}", stream.lease.name());
        *recording = Some(ActiveRecording {
            lease: stream.lease,
            stop,
            collector,
        });
        drop(recording);

        self.set_state(AudioState::Recording);
        Ok(())
    }

    /// Stop recording, release the microphone and transcribe what was heard.
    ///
    /// Returns `None` when nothing was captured; the transcriber is not
    /// called in that case.
    pub async fn stop_recording(&self, session_id: &str) -> Result<Option<String>> {
        let Some(active) = self.recording.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            warn!("stop_recording called with no recording in progress");
            return Ok(None);
        };

        let _ = active.stop.send(());
        active.lease.release();
        let captured = active.collector.await;
        self.capture_levels.send_replace(LevelFrame::default());

        let captured = match captured {
            Ok(captured) => captured,
            Err(e) => {
                let e = Error::Audio(format!("capture task failed: {e}"));
                self.set_state(AudioState::Error(e.to_string()));
                return Err(e);
            }
        };

        if captured.samples.is_empty() {
            info!("Recording for session {} captured no audio", session_id);
            self.set_state(AudioState::Idle);
            return Ok(None);
        }

        self.set_state(AudioState::Transcribing);
        let result = async {
            let wav = codec::encode_wav(&captured.samples, captured.sample_rate, captured.channels)?;
            self.transcriber.transcribe(wav, "audio/wav", session_id).await
        }
        .await;

        match result {
            Ok(text) => {
                self.set_state(AudioState::Idle);
                Ok(Some(text))
            }
            Err(e) => {
                error!("Transcription for session {} failed: {}", session_id, e);
                self.set_state(AudioState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Tear down everything: speech, playback and any open microphone
    pub fn shutdown(&self) {
        self.cancel_speech();
        if let Some(active) = self.recording.lock().unwrap_or_else(|e| e.into_inner()).take() {
            active.collector.abort();
            active.lease.release();
            self.capture_levels.send_replace(LevelFrame::default());
        }
        self.set_state(AudioState::Idle);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn decode_off_thread(encoded: Vec<u8>) -> Result<DecodedAudio> {
    tokio::task::spawn_blocking(move || codec::decode(encoded, Some("mp3")))
        .await
        .map_err(|e| Error::Audio(format!("decode task failed: {e}")))?
}

/// Buffer frames until told to stop or the device goes away
async fn collect(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut stop: oneshot::Receiver<()>,
    tap: LevelTap,
) -> CapturedAudio {
    let mut captured = CapturedAudio::default();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    tap.observe(&frame.samples, frame.sample_rate, frame.channels);
                    captured.push(frame);
                }
                None => break,
            },
            _ = &mut stop => {
                // Keep what the device already handed over
                while let Ok(frame) = frames.try_recv() {
                    captured.push(frame);
                }
                break;
            }
        }
    }
    tap.reset();
    captured
}
