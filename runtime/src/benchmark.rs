//! Event-timed candidate measurement for plan search.
//!
//! Each timed repetition brackets one execution with a pair of timing
//! events recorded into the caller's stream, then waits on the stop event
//! before reading the elapsed device time.

use fusetune_device::{MatmulBackend, TimingEvent};
use snafu::ResultExt;

use crate::error::{Result, TimingSnafu};

/// Borrowed descriptors of one matmul configuration.
pub struct MatmulCall<'a, B: MatmulBackend> {
    pub backend: &'a B,
    pub desc: &'a B::Desc,
    pub a: &'a B::Layout,
    pub b: &'a B::Layout,
    pub c: &'a B::Layout,
}

impl<B: MatmulBackend> Clone for MatmulCall<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: MatmulBackend> Copy for MatmulCall<'_, B> {}

impl<'a, B: MatmulBackend> MatmulCall<'a, B> {
    pub fn new(backend: &'a B, desc: &'a B::Desc, a: &'a B::Layout, b: &'a B::Layout, c: &'a B::Layout) -> Self {
        Self { backend, desc, a, b, c }
    }

    /// Execute once with `plan`, or the backend's default strategy for `None`.
    pub fn run(
        &self,
        plan: Option<&B::Plan>,
        operands: &mut B::Operands,
        stream: &B::Stream,
        workspace: &mut B::Workspace,
    ) -> fusetune_device::Result<()> {
        self.backend.matmul(self.desc, self.a, self.b, self.c, plan, operands, stream, workspace)
    }
}

/// Start and stop markers shared by every timed repetition of a search.
///
/// Both events are released when the pair is dropped.
#[derive(Debug)]
pub struct EventPair<E> {
    start: E,
    stop: E,
}

impl<E: TimingEvent> EventPair<E> {
    pub fn create<B: MatmulBackend<Event = E>>(backend: &B) -> Result<Self> {
        let start = backend.create_event().context(TimingSnafu)?;
        let stop = backend.create_event().context(TimingSnafu)?;
        Ok(Self { start, stop })
    }

    /// Time `work` on `stream` and return the elapsed milliseconds with its output.
    ///
    /// The markers are recorded and read even when `work` reports a failure.
    pub fn measure<T>(&self, stream: &E::Stream, work: impl FnOnce() -> T) -> Result<(f32, T)> {
        self.start.record(stream).context(TimingSnafu)?;
        let output = work();
        self.stop.record(stream).context(TimingSnafu)?;
        self.stop.synchronize().context(TimingSnafu)?;
        let elapsed = self.stop.elapsed_ms(&self.start).context(TimingSnafu)?;
        Ok((elapsed, output))
    }
}

/// Timed-phase outcome of one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    /// Every repetition succeeded; mean time per repetition.
    Completed { average_ms: f32 },
    /// A repetition failed; the remaining ones were skipped.
    Disqualified,
}

impl Score {
    /// Mean time, or `f32::MAX` for a disqualified candidate.
    pub fn average_ms(&self) -> f32 {
        match self {
            Self::Completed { average_ms } => *average_ms,
            Self::Disqualified => f32::MAX,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Run `plan` `repetitions` times under the event pair and score it.
///
/// Execution failures disqualify the candidate. Event failures are returned
/// as [`Error::Timing`](crate::Error::Timing).
pub fn score_candidate<B: MatmulBackend>(
    call: MatmulCall<'_, B>,
    plan: &B::Plan,
    events: &EventPair<B::Event>,
    repetitions: i64,
    operands: &mut B::Operands,
    stream: &B::Stream,
    workspace: &mut B::Workspace,
) -> Result<Score> {
    let mut total_ms = 0.0f32;
    for repetition in 0..repetitions {
        let (elapsed, status) = events.measure(stream, || call.run(Some(plan), operands, stream, workspace))?;
        if let Err(error) = status {
            tracing::warn!(?plan, repetition, %error, "candidate failed during timing, disqualified");
            return Ok(Score::Disqualified);
        }
        total_ms += elapsed;
    }

    Ok(Score::Completed { average_ms: total_ms / repetitions.max(1) as f32 })
}
