//! Audio output capability used by the cue engine.
//!
//! The real engine (`ToneEngineHandle`) owns the rodio output stream on a
//! dedicated thread and is only compiled with the `audio` feature. Hosts
//! without an output device use `SilentSink`.

#[cfg(feature = "audio")]
mod engine;
#[cfg(feature = "audio")]
mod tone;

#[cfg(feature = "audio")]
pub use engine::ToneEngineHandle;

use std::sync::Arc;

use anyhow::Result;
use log::debug;

use crate::cues::ToneRequest;

/// Process-wide tone output. Implementations create their output context
/// lazily on the first `play` and drop it on `close`.
pub trait AudioCueSink: Send + Sync {
    fn play(&self, tone: ToneRequest) -> Result<()>;

    fn close(&self) {}
}

/// Sink for hosts with audio disabled or unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl AudioCueSink for SilentSink {
    fn play(&self, tone: ToneRequest) -> Result<()> {
        debug!(
            "silent cue {:.0} Hz for {} ms",
            tone.frequency_hz,
            tone.duration.as_millis()
        );
        Ok(())
    }
}

/// Picks the best sink this build supports.
pub fn default_sink(volume: f32) -> Arc<dyn AudioCueSink> {
    #[cfg(feature = "audio")]
    {
        Arc::new(ToneEngineHandle::new(volume))
    }

    #[cfg(not(feature = "audio"))]
    {
        let _ = volume;
        Arc::new(SilentSink)
    }
}
