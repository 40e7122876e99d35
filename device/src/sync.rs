//! Device timing markers.
//!
//! Timing events are recorded into a stream around a unit of work; once the
//! stop event has been synchronized the elapsed device time between the two
//! markers can be read back.
//!
//! # Example
//!
//! ```ignore
//! let start = backend.create_event()?;
//! let stop = backend.create_event()?;
//!
//! start.record(&stream)?;
//! backend.matmul(/* ... */)?;
//! stop.record(&stream)?;
//! stop.synchronize()?;
//!
//! let ms = stop.elapsed_ms(&start)?;
//! ```
//!
//! Events are released when dropped.

use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{EventNotRecordedSnafu, Result};

/// Start/stop marker for measuring device time on a stream.
///
/// # Thread Safety
///
/// Events are `Send` so a tuner can own them on any worker thread; they are
/// never shared between concurrent searches.
pub trait TimingEvent: Send + fmt::Debug {
    /// Stream type this event can be recorded into.
    type Stream: ?Sized;

    /// Enqueue the marker on `stream`.
    fn record(&self, stream: &Self::Stream) -> Result<()>;

    /// Block until all work enqueued before the marker has completed.
    fn synchronize(&self) -> Result<()>;

    /// Milliseconds elapsed between `start` and this event.
    ///
    /// Both events must have been recorded and this event synchronized.
    fn elapsed_ms(&self, start: &Self) -> Result<f32>;
}

/// Host timing marker based on the monotonic clock.
///
/// Host streams execute synchronously, so recording captures the completion
/// time of everything submitted before it and `synchronize` only checks that
/// the event was recorded.
#[derive(Debug, Default)]
pub struct HostEvent {
    recorded: Mutex<Option<Instant>>,
}

impl HostEvent {
    pub fn new() -> Self {
        Self::default()
    }

    fn instant(&self) -> Result<Instant> {
        let recorded = *self.recorded.lock();
        recorded.ok_or_else(|| EventNotRecordedSnafu.build())
    }
}

impl TimingEvent for HostEvent {
    type Stream = crate::host::HostStream;

    fn record(&self, _stream: &Self::Stream) -> Result<()> {
        *self.recorded.lock() = Some(Instant::now());
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        self.instant().map(|_| ())
    }

    fn elapsed_ms(&self, start: &Self) -> Result<f32> {
        let stop = self.instant()?;
        let start = start.instant()?;
        Ok(stop.saturating_duration_since(start).as_secs_f32() * 1e3)
    }
}
