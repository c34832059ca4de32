use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Decoded PCM audio (16-bit, interleaved)
#[derive(Debug, Clone, Default)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_seconds: f64,
}

impl DecodedAudio {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        let duration_seconds = if sample_rate == 0 || channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (f64::from(sample_rate) * f64::from(channels))
        };
        Self {
            samples,
            sample_rate,
            channels,
            duration_seconds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a compressed or container audio payload (mp3, wav, ogg, ...).
///
/// `extension` is a probe hint only; the container is still sniffed.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio> {
    let input_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Audio(format!("unrecognized audio format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Audio("no decodable audio track".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Audio(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::Audio(format!("failed to read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt frame is skipped, not fatal
            Err(SymphoniaError::DecodeError(e)) => warn!("Skipping undecodable audio frame: {}", e),
            Err(e) => return Err(Error::Audio(format!("decode failed: {e}"))),
        }
    }

    let audio = DecodedAudio::new(samples, sample_rate, channels);
    debug!(
        "Decoded {} bytes into {:.1}s of audio ({}Hz, {} channels)",
        input_len, audio.duration_seconds, audio.sample_rate, audio.channels
    );
    Ok(audio)
}

/// Encode interleaved PCM as a 16-bit WAV file in memory
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(format!("failed to start WAV: {e}")))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(format!("failed to write sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| Error::Audio(format!("failed to finalize WAV: {e}")))?;
    }

    let bytes = cursor.into_inner();
    info!(
        "Encoded {} samples ({}Hz, {} channels) into {} byte WAV",
        samples.len(),
        sample_rate,
        channels,
        bytes.len()
    );
    Ok(bytes)
}
