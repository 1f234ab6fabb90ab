//! Cue engine: maps timing events to short tones and hands them to the
//! injected audio sink. Emission is best-effort and never fails the caller.

use std::{sync::Arc, time::Duration};

use log::debug;
use serde::Serialize;

use crate::audio::AudioCueSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CountdownStep {
    Three,
    Two,
    One,
}

impl CountdownStep {
    pub fn from_remaining(remaining_secs: u32) -> Option<Self> {
        match remaining_secs {
            3 => Some(CountdownStep::Three),
            2 => Some(CountdownStep::Two),
            1 => Some(CountdownStep::One),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CueKind {
    PhaseStart,
    PhaseEnd,
    Countdown(CountdownStep),
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneRequest {
    pub frequency_hz: f32,
    pub duration: Duration,
}

impl ToneRequest {
    const fn new(frequency_hz: f32, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration: Duration::from_millis(duration_ms),
        }
    }
}

/// Countdown pitches climb from 3 to 1 and never collide with the
/// start (800 Hz), end (1 kHz) or interval (600 Hz) tones.
pub fn tone_for(kind: CueKind) -> ToneRequest {
    match kind {
        CueKind::PhaseStart => ToneRequest::new(800.0, 200),
        CueKind::PhaseEnd => ToneRequest::new(1000.0, 300),
        CueKind::Interval => ToneRequest::new(600.0, 150),
        CueKind::Countdown(CountdownStep::Three) => ToneRequest::new(523.0, 120),
        CueKind::Countdown(CountdownStep::Two) => ToneRequest::new(659.0, 120),
        CueKind::Countdown(CountdownStep::One) => ToneRequest::new(784.0, 120),
    }
}

#[derive(Clone)]
pub struct CueEngine {
    sink: Arc<dyn AudioCueSink>,
    enabled: bool,
}

impl CueEngine {
    pub fn new(sink: Arc<dyn AudioCueSink>, enabled: bool) -> Self {
        Self { sink, enabled }
    }

    pub fn emit(&self, kind: CueKind) {
        if !self.enabled {
            return;
        }
        if let Err(err) = self.sink.play(tone_for(kind)) {
            debug!("cue {kind:?} skipped: {err}");
        }
    }

    /// Releases the audio output context; a later cue recreates it.
    pub fn close(&self) {
        self.sink.close();
    }
}
