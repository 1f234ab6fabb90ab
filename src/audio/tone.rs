use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

use crate::cues::ToneRequest;

const SAMPLE_RATE: u32 = 44100;
const FLOOR_GAIN: f32 = 0.01;

/// Finite sine beep whose gain decays exponentially from `gain` to a floor,
/// so back-to-back cues don't click.
pub struct Tone {
    frequency_hz: f32,
    gain: f32,
    decay_per_sample: f32,
    num_sample: usize,
    total_samples: usize,
}

impl Tone {
    pub fn new(request: ToneRequest, gain: f32) -> Self {
        let total_samples =
            ((request.duration.as_secs_f32() * SAMPLE_RATE as f32).round() as usize).max(1);
        let gain = gain.clamp(FLOOR_GAIN, 1.0);
        let decay_per_sample = (FLOOR_GAIN / gain).powf(1.0 / total_samples as f32);

        Self {
            frequency_hz: request.frequency_hz,
            gain,
            decay_per_sample,
            num_sample: 0,
            total_samples,
        }
    }
}

impl Iterator for Tone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }

        let t = self.num_sample as f32 / SAMPLE_RATE as f32;
        let sample = (2.0 * PI * self.frequency_hz * t).sin() * self.gain;

        self.gain *= self.decay_per_sample;
        self.num_sample += 1;

        Some(sample)
    }
}

impl Source for Tone {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / SAMPLE_RATE as f32,
        ))
    }
}
