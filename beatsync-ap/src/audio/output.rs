//! Tick output using cpal
//!
//! The cpal stream lives on its own thread for its whole life (streams are not
//! `Send` on every platform). The clock thread only flips an atomic trigger;
//! the audio callback restarts the click whenever it sees the trigger.
//!
//! Stream errors raise a flag. While the flag is up `play()` reports the
//! device as unavailable and the device thread tries to rebuild the stream
//! about once a second.

use crate::audio::tick::TickSample;
use crate::audio::SoundPlayback;
use crate::error::{Error, PlaybackError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the device thread retries a failed stream
const SUPERVISE_INTERVAL: Duration = Duration::from_secs(1);

/// State shared between the handle, the device thread and the audio callback
struct OutputShared {
    /// Set by `play()`, cleared by the callback when the click restarts
    trigger: AtomicBool,
    /// Set by the stream error callback
    error_flag: AtomicBool,
    /// Count of stream errors since startup
    error_count: AtomicU32,
    /// Volume 0.0-1.0 stored as f32 bits (lock-free for the callback)
    volume_bits: AtomicU32,
    /// Clicks actually started by the callback
    ticks_played: AtomicU64,
}

impl OutputShared {
    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

/// Where the device thread found its device
#[derive(Debug, Clone)]
struct DeviceInfo {
    name: String,
    sample_rate: u32,
}

/// Handle to the tick output device thread.
///
/// Implements [`SoundPlayback`] so it can be handed to the clock.
pub struct TickOutput {
    shared: Arc<OutputShared>,
    /// Dropping the sender tells the device thread to shut down
    control_tx: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    info: DeviceInfo,
}

impl TickOutput {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the output device and start the stream.
    ///
    /// Blocks until the device thread reports success or failure. Failure here
    /// is fatal for the application.
    pub fn open(device_name: Option<String>, tick_sound: Option<PathBuf>, volume: f32) -> Result<Self> {
        let shared = Arc::new(OutputShared {
            trigger: AtomicBool::new(false),
            error_flag: AtomicBool::new(false),
            error_count: AtomicU32::new(0),
            volume_bits: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            ticks_played: AtomicU64::new(0),
        });

        let (control_tx, control_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<DeviceInfo, String>>();

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("tick-output".to_string())
            .spawn(move || {
                device_thread(device_name, tick_sound, thread_shared, control_rx, ready_tx);
            })?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                info!(
                    "Tick output ready on '{}' at {}Hz",
                    info.name, info.sample_rate
                );
                Ok(Self {
                    shared,
                    control_tx: Mutex::new(Some(control_tx)),
                    thread: Mutex::new(Some(thread)),
                    info,
                })
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                Err(Error::AudioOutput(message))
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::AudioOutput(
                    "tick output thread exited during startup".to_string(),
                ))
            }
        }
    }

    pub fn device_name(&self) -> &str {
        &self.info.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.info.sample_rate
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume()
    }

    /// Set volume, clamped to 0.0-1.0
    pub fn set_volume(&self, volume: f32) {
        self.shared
            .volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Clicks the device has started playing
    pub fn ticks_played(&self) -> u64 {
        self.shared.ticks_played.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u32 {
        self.shared.error_count.load(Ordering::Relaxed)
    }

    /// Stop the stream and release the device.
    ///
    /// Idempotent. Call only after the clock has stopped ticking.
    pub fn close(&self) {
        let sender = self.control_tx.lock().ok().and_then(|mut tx| tx.take());
        drop(sender);

        let handle = self.thread.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Tick output thread panicked");
            }
            info!("Tick output closed");
        }
    }
}

impl SoundPlayback for TickOutput {
    fn play(&self) -> std::result::Result<(), PlaybackError> {
        if self.shared.error_flag.load(Ordering::SeqCst) {
            return Err(PlaybackError::DeviceUnavailable(format!(
                "stream on '{}' failed, recovering",
                self.info.name
            )));
        }
        if self.shared.trigger.swap(true, Ordering::AcqRel) {
            // Previous click never reached the callback
            return Err(PlaybackError::Busy);
        }
        Ok(())
    }
}

impl Drop for TickOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Body of the device thread: open, report, supervise, tear down
fn device_thread(
    device_name: Option<String>,
    tick_sound: Option<PathBuf>,
    shared: Arc<OutputShared>,
    control_rx: mpsc::Receiver<()>,
    ready_tx: mpsc::Sender<std::result::Result<DeviceInfo, String>>,
) {
    let opened = open_device(device_name.as_deref()).and_then(|(device, name)| {
        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config = supported.config();
        let tick = Arc::new(
            TickSample::load_or_synthesize(tick_sound.as_deref(), config.sample_rate.0)
                .at_rate(config.sample_rate.0),
        );
        let stream = start_stream(&device, &config, sample_format, &tick, &shared)?;
        Ok((device, name, config, sample_format, tick, stream))
    });

    let (device, name, config, sample_format, tick, stream) = match opened {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };

    debug!(
        "Tick output config: sample_rate={}, channels={}, format={:?}, tick={}ms",
        config.sample_rate.0,
        config.channels,
        sample_format,
        tick.duration_ms()
    );

    let _ = ready_tx.send(Ok(DeviceInfo {
        name: name.clone(),
        sample_rate: config.sample_rate.0,
    }));

    let mut stream = Some(stream);
    loop {
        match control_rx.recv_timeout(SUPERVISE_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if shared.error_flag.load(Ordering::SeqCst) {
            warn!(
                "Attempting tick output recovery on '{}' (error count: {})",
                name,
                shared.error_count.load(Ordering::Relaxed)
            );
            // Drop the failed stream before building a new one
            stream = None;
            match start_stream(&device, &config, sample_format, &tick, &shared) {
                Ok(new_stream) => {
                    stream = Some(new_stream);
                    shared.trigger.store(false, Ordering::SeqCst);
                    shared.error_flag.store(false, Ordering::SeqCst);
                    info!("Tick output recovered");
                }
                Err(e) => debug!("Tick output recovery failed: {}", e),
            }
        }
    }

    drop(stream);
    info!(
        "Tick output stopped ({} clicks played, {} stream errors)",
        shared.ticks_played.load(Ordering::Relaxed),
        shared.error_count.load(Ordering::Relaxed)
    );
}

/// Find the requested device, falling back to the default device
fn open_device(device_name: Option<&str>) -> Result<(Device, String)> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok((device, name.to_string()));
        }
        warn!(
            "Requested device '{}' not found, falling back to default device",
            name
        );
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using default audio device: {}", name);
    Ok((device, name))
}

fn start_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    tick: &Arc<TickSample>,
    shared: &Arc<OutputShared>,
) -> Result<Stream> {
    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, config, tick, shared)?,
        SampleFormat::I16 => build_stream::<i16>(device, config, tick, shared)?,
        SampleFormat::U16 => build_stream::<u16>(device, config, tick, shared)?,
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
    Ok(stream)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    tick: &Arc<TickSample>,
    shared: &Arc<OutputShared>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let tick = Arc::clone(tick);
    let callback_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);

    // Position inside the click; past the end means silence
    let mut cursor = usize::MAX;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if callback_shared.trigger.swap(false, Ordering::AcqRel) {
                    cursor = 0;
                    callback_shared.ticks_played.fetch_add(1, Ordering::Relaxed);
                }

                let volume = callback_shared.volume();
                let samples = tick.samples();

                for frame in data.chunks_mut(channels) {
                    let value = match samples.get(cursor) {
                        Some(sample) => {
                            cursor += 1;
                            (sample * volume).clamp(-1.0, 1.0)
                        }
                        None => 0.0,
                    };
                    let out = T::from_sample(value);
                    for slot in frame.iter_mut() {
                        *slot = out;
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {} - marking for recovery", err);
                error_shared.error_flag.store(true, Ordering::SeqCst);
                error_shared.error_count.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
