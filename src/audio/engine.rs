use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

use anyhow::{anyhow, Result};

use crate::cues::ToneRequest;

use super::{tone::Tone, AudioCueSink};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

enum ToneCommand {
    Play(ToneRequest),
    Close,
}

/// Handle to the tone thread. The rodio stream is not `Send`, so it lives on
/// its own thread and is driven through a command channel.
pub struct ToneEngineHandle {
    tx: Arc<Mutex<Option<Sender<ToneCommand>>>>,
    volume: f32,
}

impl ToneEngineHandle {
    pub fn new(volume: f32) -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            volume: volume.clamp(0.0, 1.0),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<ToneCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("tone engine lock poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<ToneCommand>();
        let volume = self.volume;

        thread::Builder::new()
            .name("cue-tones".to_string())
            .spawn(move || {
                let mut stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                // Recreates the output when it was never opened or has been
                // dropped, and resumes a sink the platform left paused.
                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    if let Some(s) = sink.as_ref() {
                        if s.is_paused() {
                            s.play();
                        }
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        ToneCommand::Play(request) => {
                            if let Err(err) = ensure_sink(&mut stream, &mut sink) {
                                log_warn!("cue dropped: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.append(Tone::new(request, volume));
                            }
                        }
                        ToneCommand::Close => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            break;
                        }
                    }
                }

                drop(stream);
                log_info!("tone engine released audio output");
            })
            .map_err(|e| anyhow!("failed to spawn tone thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl AudioCueSink for ToneEngineHandle {
    fn play(&self, tone: ToneRequest) -> Result<()> {
        let tx = self.ensure_thread()?;
        if tx.send(ToneCommand::Play(tone)).is_err() {
            // Thread exited; forget it so the next cue starts a fresh one.
            if let Ok(mut guard) = self.tx.lock() {
                *guard = None;
            }
            return Err(anyhow!("tone thread stopped"));
        }
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(ToneCommand::Close);
            }
        }
    }
}

impl Drop for ToneEngineHandle {
    fn drop(&mut self) {
        self.close();
    }
}
