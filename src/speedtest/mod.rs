pub mod base_path;
pub mod error;
pub mod frame;
pub mod phase;
pub mod samples;
pub mod session;
pub mod transport;

pub use phase::{MeasurementPhase, ProgressState, ProgressUpdate, SpeedTestResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TestPhase {
    #[default]
    Idle,
    Started,
    Ping,
    Download,
    Upload,
    Complete,
    Error,
}

impl TestPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TestPhase::Idle => "idle",
            TestPhase::Started => "started",
            TestPhase::Ping => "ping",
            TestPhase::Download => "download",
            TestPhase::Upload => "upload",
            TestPhase::Complete => "complete",
            TestPhase::Error => "error",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(
            self,
            TestPhase::Started | TestPhase::Ping | TestPhase::Download | TestPhase::Upload
        )
    }
}

impl From<MeasurementPhase> for TestPhase {
    fn from(phase: MeasurementPhase) -> Self {
        match phase {
            MeasurementPhase::Started => TestPhase::Started,
            MeasurementPhase::Ping => TestPhase::Ping,
            MeasurementPhase::Download => TestPhase::Download,
            MeasurementPhase::Upload => TestPhase::Upload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub phase: TestPhase,
    pub bandwidth_mbps: Option<f64>,
    pub ping_ms: Option<f64>,
    pub elapsed: Option<f64>,
    pub progress: Option<f64>,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub measurement_id: Option<String>,
    pub message: Option<String>,
}

impl From<&ProgressState> for ProgressSnapshot {
    fn from(state: &ProgressState) -> Self {
        match state {
            ProgressState::Idle => Self::default(),
            ProgressState::Started => Self {
                phase: TestPhase::Started,
                ..Self::default()
            },
            ProgressState::Progress(update) => Self {
                phase: update.phase.into(),
                bandwidth_mbps: update.bandwidth_mbps,
                ping_ms: update.ping_ms,
                elapsed: update.elapsed_seconds,
                progress: update.fraction_complete,
                ..Self::default()
            },
            ProgressState::Complete(result) => Self {
                phase: TestPhase::Complete,
                ping_ms: result.ping_ms,
                download_mbps: result.download_mbps,
                upload_mbps: result.upload_mbps,
                jitter_ms: result.jitter_ms,
                measurement_id: result.measurement_id.clone(),
                ..Self::default()
            },
            ProgressState::Error { message } => Self {
                phase: TestPhase::Error,
                message: Some(message.clone()),
                ..Self::default()
            },
        }
    }
}
