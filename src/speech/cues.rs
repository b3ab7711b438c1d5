//! Short tones marking success, failure, and "listening now".

use super::SynthesizedAudio;

const CUE_SAMPLE_RATE: u32 = 24_000;
const CUE_AMPLITUDE: f32 = 0.4;

/// Audible cue kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCue {
    /// Rising two-tone chirp.
    Success,
    /// Single low tone.
    Error,
    /// Short mid tone before the microphone opens.
    Listening,
}

/// One segment of a cue: a tone, or silence when `freq_hz` is zero.
struct Segment {
    freq_hz: f32,
    millis: u32,
}

impl AudioCue {
    fn segments(self) -> &'static [Segment] {
        match self {
            Self::Success => &[
                Segment {
                    freq_hz: 800.0,
                    millis: 150,
                },
                Segment {
                    freq_hz: 0.0,
                    millis: 100,
                },
                Segment {
                    freq_hz: 1200.0,
                    millis: 150,
                },
            ],
            Self::Error => &[Segment {
                freq_hz: 300.0,
                millis: 300,
            }],
            Self::Listening => &[Segment {
                freq_hz: 600.0,
                millis: 100,
            }],
        }
    }

    /// Render the cue as samples.
    pub fn render(self) -> SynthesizedAudio {
        let mut samples = Vec::new();
        for segment in self.segments() {
            let count = (CUE_SAMPLE_RATE as u64 * u64::from(segment.millis) / 1000) as usize;
            if segment.freq_hz <= 0.0 {
                samples.extend(std::iter::repeat_n(0.0, count));
                continue;
            }
            let step = std::f32::consts::TAU * segment.freq_hz / CUE_SAMPLE_RATE as f32;
            // 5 ms linear fade at both ends avoids clicks.
            let fade = (CUE_SAMPLE_RATE as usize / 200).min(count / 2).max(1);
            samples.extend((0..count).map(|i| {
                let edge = i.min(count - 1 - i);
                let gain = if edge < fade {
                    edge as f32 / fade as f32
                } else {
                    1.0
                };
                (i as f32 * step).sin() * CUE_AMPLITUDE * gain
            }));
        }
        SynthesizedAudio {
            samples,
            sample_rate: CUE_SAMPLE_RATE,
        }
    }
}
