//! Playback backends.

use super::{PlaybackEnd, Player, SynthesizedAudio};
use crate::cancel::CancelToken;
use crate::error::Result;

/// Player that produces no sound but takes as long as the audio would.
///
/// Used when no output device is compiled in, and in tests (with a small
/// time scale) to exercise interruption timing.
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    time_scale: f64,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self { time_scale: 1.0 }
    }
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pace playback at `scale` times the real duration (0 = instant).
    pub fn with_time_scale(scale: f64) -> Self {
        Self {
            time_scale: scale.max(0.0),
        }
    }
}

impl Player for SimulatedPlayer {
    fn play(
        &self,
        audio: &SynthesizedAudio,
        _volume: f32,
        stop: &CancelToken,
    ) -> Result<PlaybackEnd> {
        if stop.is_cancelled() {
            return Ok(PlaybackEnd::Interrupted);
        }
        let length = audio.duration().mul_f64(self.time_scale);
        if stop.wait_timeout(length) {
            Ok(PlaybackEnd::Interrupted)
        } else {
            Ok(PlaybackEnd::Completed)
        }
    }
}

#[cfg(feature = "cpal-output")]
pub use device::CpalPlayer;

#[cfg(feature = "cpal-output")]
mod device {
    //! Audio playback to system speakers via cpal.

    use super::{PlaybackEnd, Player, SynthesizedAudio};
    use crate::cancel::CancelToken;
    use crate::error::{NarratorError, Result};
    use cpal::StreamConfig;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::{error, info};

    /// Plays through a cpal output device, opened per utterance.
    #[derive(Debug, Clone, Default)]
    pub struct CpalPlayer {
        /// Output device name (None = system default).
        output_device: Option<String>,
    }

    impl CpalPlayer {
        pub fn new(output_device: Option<String>) -> Self {
            Self { output_device }
        }

        fn open_device(&self) -> Result<cpal::Device> {
            let host = cpal::default_host();
            let device = if let Some(ref name) = self.output_device {
                host.output_devices()
                    .map_err(|e| NarratorError::Speech(format!("cannot enumerate devices: {e}")))?
                    .find(|d| {
                        d.description()
                            .ok()
                            .map(|desc| desc.name() == name)
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| {
                        NarratorError::Speech(format!("output device '{name}' not found"))
                    })?
            } else {
                host.default_output_device()
                    .ok_or_else(|| NarratorError::Speech("no default output device".into()))?
            };
            let device_name = device
                .description()
                .map(|d| d.name().to_owned())
                .unwrap_or_else(|_| "<unknown>".into());
            info!("using output device: {device_name}");
            Ok(device)
        }
    }

    struct PlaybackBuffer {
        samples: Vec<f32>,
        position: usize,
        finished: bool,
    }

    impl Player for CpalPlayer {
        fn play(
            &self,
            audio: &SynthesizedAudio,
            volume: f32,
            stop: &CancelToken,
        ) -> Result<PlaybackEnd> {
            if stop.is_cancelled() {
                return Ok(PlaybackEnd::Interrupted);
            }
            let device = self.open_device()?;
            let stream_config = StreamConfig {
                channels: 1,
                sample_rate: audio.sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };

            let gain = volume.clamp(0.0, 1.0);
            let buffer = Arc::new(Mutex::new(PlaybackBuffer {
                samples: audio.samples.iter().map(|s| s * gain).collect(),
                position: 0,
                finished: false,
            }));
            let buffer_clone = Arc::clone(&buffer);

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        let mut buf = match buffer_clone.lock() {
                            Ok(b) => b,
                            Err(_) => return,
                        };
                        for sample in data.iter_mut() {
                            if buf.position < buf.samples.len() {
                                *sample = buf.samples[buf.position];
                                buf.position += 1;
                            } else {
                                *sample = 0.0;
                                buf.finished = true;
                            }
                        }
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| NarratorError::Speech(format!("failed to build output stream: {e}")))?;

            stream
                .play()
                .map_err(|e| NarratorError::Speech(format!("failed to start output stream: {e}")))?;

            loop {
                if stop.wait_timeout(Duration::from_millis(10)) {
                    drop(stream);
                    return Ok(PlaybackEnd::Interrupted);
                }
                let buf = buffer
                    .lock()
                    .map_err(|e| NarratorError::Speech(format!("playback buffer lock poisoned: {e}")))?;
                if buf.finished {
                    break;
                }
            }

            drop(stream);
            Ok(PlaybackEnd::Completed)
        }
    }
}
