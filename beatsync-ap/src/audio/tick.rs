//! Tick sample: the click played once per beat
//!
//! Loaded from a file with symphonia (down-mixed to mono) or synthesized as a
//! short decaying sine burst.

use crate::audio::resampler::Resampler;
use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Mono f32 click sample
#[derive(Debug, Clone)]
pub struct TickSample {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl TickSample {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// 1 kHz sine burst with exponential decay, 15 ms long
    pub fn synthesized(sample_rate: u32) -> Self {
        const FREQ_HZ: f32 = 1000.0;
        const DURATION_S: f32 = 0.015;
        const GAIN: f32 = 0.8;

        let num_samples = (sample_rate as f32 * DURATION_S) as usize;
        let samples = (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let envelope = (-t * 250.0).exp();
                (t * FREQ_HZ * std::f32::consts::TAU).sin() * envelope * GAIN
            })
            .collect();

        Self::new(samples, sample_rate)
    }

    /// Decode a sound file into a mono click
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| Error::Decode(format!("{}: no audio track", path.display())))?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("{}: {}", path.display(), e)))?;

        let mut mono = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(Error::Decode(format!("{}: {}", path.display(), e))),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(msg)) => {
                    warn!("Skipping undecodable packet in {}: {}", path.display(), msg);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("{}: {}", path.display(), e))),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            let channels = spec.channels.count().max(1);

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            mono.extend(
                buffer
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }

        if mono.is_empty() {
            return Err(Error::Decode(format!("{}: no samples", path.display())));
        }

        debug!(
            "Decoded tick sound {} ({} samples at {}Hz)",
            path.display(),
            mono.len(),
            sample_rate
        );
        Ok(Self::new(mono, sample_rate))
    }

    /// Load `path` if given, otherwise (or on failure) synthesize a click
    pub fn load_or_synthesize(path: Option<&Path>, sample_rate: u32) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(sample) => {
                    info!("Using tick sound {}", path.display());
                    sample
                }
                Err(e) => {
                    warn!("Failed to load tick sound ({}), using synthesized click", e);
                    Self::synthesized(sample_rate)
                }
            },
            None => Self::synthesized(sample_rate),
        }
    }

    /// Convert to `rate`, keeping the original on resampler failure
    pub fn at_rate(self, rate: u32) -> Self {
        match Resampler::resample_mono(&self.samples, self.sample_rate, rate) {
            Ok(samples) => Self::new(samples, rate),
            Err(e) => {
                warn!("{}; playing tick at {}Hz unconverted", e, self.sample_rate);
                self
            }
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate.max(1))
    }
}
