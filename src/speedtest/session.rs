//! Owns the single live progress stream and the state it feeds.
//!
//! One tokio task per session reads chunks, parses frames and applies them in
//! arrival order. Starting or resetting cancels that task and waits for it to
//! finish before shared state is touched, so two readers never write at once.

use super::frame::{FrameParser, RawFrame};
use super::phase::{MeasurementPhase, PhaseMachine, ProgressState, Transition};
use super::samples::{SampleAccumulator, SampleView};
use super::transport::{EventTransport, ReadOutcome, TransportReader};
use super::ProgressSnapshot;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTrack {
    Download,
    Upload,
}

impl SampleTrack {
    fn for_phase(phase: MeasurementPhase) -> Option<Self> {
        match phase {
            MeasurementPhase::Download => Some(SampleTrack::Download),
            MeasurementPhase::Upload => Some(SampleTrack::Upload),
            MeasurementPhase::Started | MeasurementPhase::Ping => None,
        }
    }
}

struct SharedState {
    machine: PhaseMachine,
    streaming: bool,
    download: SampleAccumulator,
    upload: SampleAccumulator,
    current_phase: Option<MeasurementPhase>,
    opened_at: Option<Instant>,
}

impl SharedState {
    fn new(throttle_window: Duration) -> Self {
        Self {
            machine: PhaseMachine::new(),
            streaming: false,
            download: SampleAccumulator::new(throttle_window),
            upload: SampleAccumulator::new(throttle_window),
            current_phase: None,
            opened_at: None,
        }
    }

    fn clear(&mut self) {
        self.machine.reset();
        self.streaming = false;
        self.download.reset();
        self.upload.reset();
        self.current_phase = None;
        self.opened_at = None;
    }

    fn track(&self, track: SampleTrack) -> &SampleAccumulator {
        match track {
            SampleTrack::Download => &self.download,
            SampleTrack::Upload => &self.upload,
        }
    }

    fn track_mut(&mut self, track: SampleTrack) -> &mut SampleAccumulator {
        match track {
            SampleTrack::Download => &mut self.download,
            SampleTrack::Upload => &mut self.upload,
        }
    }

    fn apply(&mut self, frame: &RawFrame) -> Transition {
        let transition = self.machine.apply(frame);
        match transition {
            Transition::Updated => {
                if let ProgressState::Progress(update) = self.machine.state() {
                    let phase = update.phase;
                    let sample = update
                        .bandwidth_mbps
                        .map(|mbps| (mbps, update.elapsed_seconds));
                    self.record(phase, sample);
                }
            }
            Transition::Terminal => self.finish(),
            Transition::Ignored => {}
        }
        transition
    }

    fn record(&mut self, phase: MeasurementPhase, sample: Option<(f64, Option<f64>)>) {
        if let Some(previous) = self.current_phase.replace(phase) {
            if previous != phase {
                if let Some(track) = SampleTrack::for_phase(previous) {
                    self.track_mut(track).flush();
                }
            }
        }

        let (Some(track), Some((mbps, elapsed))) = (SampleTrack::for_phase(phase), sample) else {
            return;
        };
        let elapsed = elapsed.unwrap_or_else(|| {
            self.opened_at
                .map(|at| at.elapsed().as_secs_f64())
                .unwrap_or_default()
        });
        self.track_mut(track).push(mbps, elapsed);
    }

    fn finish(&mut self) {
        self.streaming = false;
        self.download.flush();
        self.upload.flush();
    }

    fn fail(&mut self, message: String) {
        self.machine.fail(message);
        self.finish();
    }
}

fn lock(shared: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ActiveStream {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// All failures end up as [`ProgressState::Error`]; nothing here returns `Err`.
pub struct StreamSession {
    transport: Arc<dyn EventTransport>,
    url: String,
    shared: Arc<Mutex<SharedState>>,
    active: Option<ActiveStream>,
}

impl StreamSession {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        url: impl Into<String>,
        throttle_window: Duration,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            shared: Arc::new(Mutex::new(SharedState::new(throttle_window))),
            active: None,
        }
    }

    pub async fn start_streaming(&mut self) {
        self.teardown().await;

        {
            let mut shared = lock(&self.shared);
            shared.clear();
            shared.streaming = true;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(read_stream(
            Arc::clone(&self.transport),
            self.url.clone(),
            cancel.clone(),
            Arc::clone(&self.shared),
        ));
        tracing::info!(url = %self.url, "speed test stream started");
        self.active = Some(ActiveStream { cancel, handle });
    }

    pub async fn reset(&mut self) {
        self.teardown().await;
        lock(&self.shared).clear();
    }

    /// Waits until the running stream ends on its own.
    ///
    /// Dropping this future before it finishes leaves the stream owned by the
    /// session, so a later start or reset still cancels it.
    pub async fn wait(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let joined = (&mut active.handle).await;
        self.active = None;
        if let Err(err) = joined {
            tracing::warn!(error = %err, "stream reader task failed");
            lock(&self.shared).fail(CONNECTION_LOST_MESSAGE.to_string());
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::from(lock(&self.shared).machine.state())
    }

    pub fn state(&self) -> ProgressState {
        lock(&self.shared).machine.state().clone()
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.shared).streaming
    }

    pub fn samples(&self, track: SampleTrack) -> SampleView {
        lock(&self.shared).track(track).view()
    }

    pub fn sample_version(&self, track: SampleTrack) -> u64 {
        lock(&self.shared).track(track).version()
    }

    async fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.cancel.cancel();
        if let Err(err) = active.handle.await {
            if err.is_panic() {
                tracing::warn!(error = %err, "stream reader task panicked");
            }
        }
        tracing::info!(url = %self.url, "speed test stream torn down");
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

async fn read_stream(
    transport: Arc<dyn EventTransport>,
    url: String,
    cancel: CancellationToken,
    shared: Arc<Mutex<SharedState>>,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = transport.open(&url) => opened,
    };

    let stream = match opened {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(error = %err, "could not open speed test stream");
            lock(&shared).fail(format!("Unable to connect to speed test stream: {err}"));
            return;
        }
    };
    lock(&shared).opened_at = Some(Instant::now());

    let mut reader = TransportReader::new(stream, cancel);
    let mut parser = FrameParser::new();

    loop {
        match reader.next_chunk().await {
            ReadOutcome::Chunk(chunk) => {
                let frames = parser.feed(&chunk);
                if dispatch(&shared, &frames) {
                    reader.close();
                    tracing::info!("speed test stream reached a terminal state");
                    return;
                }
            }
            ReadOutcome::Closed => {
                if parser.pending() > 0 {
                    tracing::debug!(bytes = parser.pending(), "discarding unterminated frame");
                }
                parser.clear();
                lock(&shared).finish();
                tracing::info!("speed test stream closed by server");
                return;
            }
            ReadOutcome::Failed(err) => {
                tracing::warn!(error = %err, "speed test stream lost");
                lock(&shared).fail(CONNECTION_LOST_MESSAGE.to_string());
                return;
            }
            ReadOutcome::Cancelled => {
                tracing::debug!("speed test stream cancelled");
                return;
            }
        }
    }
}

/// Applies frames in order; returns true once a terminal state is reached.
fn dispatch(shared: &Mutex<SharedState>, frames: &[RawFrame]) -> bool {
    if frames.is_empty() {
        return false;
    }
    let mut shared = lock(shared);
    for frame in frames {
        if shared.apply(frame) == Transition::Terminal {
            return true;
        }
    }
    false
}
