pub mod capture;
pub mod controller;
pub mod snapshot;
pub mod state;

pub use capture::{ActionError, CaptureError, CaptureInput};
pub use controller::{PlaybackServices, TimerController};
pub use snapshot::{format_clock, CaptureDialog, PlaybackSnapshot, StartLabel};
pub use state::{PlaybackStatus, SequencerState, TimerAction};
