
use super::error::FrameDecodeError;
use super::frame::RawFrame;
use serde::Deserialize;
use serde_json::Value;

pub const ERROR_FALLBACK_MESSAGE: &str = "Speed test failed";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementPhase {
    #[default]
    Started,
    Ping,
    Download,
    Upload,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default)]
    pub phase: MeasurementPhase,
    pub bandwidth_mbps: Option<f64>,
    pub ping_ms: Option<f64>,
    #[serde(rename = "elapsed")]
    pub elapsed_seconds: Option<f64>,
    #[serde(rename = "progress")]
    pub fraction_complete: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedTestResult {
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub ping_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub measurement_id: Option<String>,
}

impl SpeedTestResult {
    /// Reads whichever fields are present and well-typed; never fails.
    fn from_payload(data: &str) -> Self {
        let value = match serde_json::from_str::<Value>(data) {
            Ok(value) => value,
            Err(source) => {
                let err = FrameDecodeError::new("complete", source);
                tracing::debug!(error = %err, "complete payload unreadable, keeping empty result");
                return Self::default();
            }
        };

        let number = |key: &str| value.get(key).and_then(Value::as_f64);
        let measurement_id = match value.get("measurement_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        Self {
            download_mbps: number("download_mbps"),
            upload_mbps: number("upload_mbps"),
            ping_ms: number("ping_ms"),
            jitter_ms: number("jitter_ms"),
            measurement_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ProgressState {
    #[default]
    Idle,
    Started,
    Progress(ProgressUpdate),
    Complete(SpeedTestResult),
    Error { message: String },
}

impl ProgressState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressState::Complete(_) | ProgressState::Error { .. })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProgressState::Error {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Ignored,
    Updated,
    Terminal,
}

#[derive(Debug, Default)]
pub struct PhaseMachine {
    state: ProgressState,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = ProgressState::Idle;
    }

    /// Moves to `Error` unless a terminal state was already reached.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = ProgressState::error(message);
        true
    }

    pub fn apply(&mut self, frame: &RawFrame) -> Transition {
        if self.state.is_terminal() {
            tracing::debug!(event = %frame.event, "frame after terminal state ignored");
            return Transition::Ignored;
        }

        match frame.event.as_str() {
            "started" => {
                self.state = ProgressState::Started;
                Transition::Updated
            }
            "progress" => match serde_json::from_str::<ProgressUpdate>(&frame.data) {
                Ok(update) => {
                    self.state = ProgressState::Progress(update);
                    Transition::Updated
                }
                Err(source) => {
                    let err = FrameDecodeError::new("progress", source);
                    tracing::debug!(error = %err, "dropping progress frame");
                    Transition::Ignored
                }
            },
            "complete" => {
                self.state = ProgressState::Complete(SpeedTestResult::from_payload(&frame.data));
                Transition::Terminal
            }
            "error" => {
                self.state = ProgressState::error(error_message(&frame.data));
                Transition::Terminal
            }
            other => {
                tracing::debug!(event = other, "ignoring unrecognized event");
                Transition::Ignored
            }
        }
    }
}

fn error_message(data: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorPayload {
        message: Option<String>,
    }

    serde_json::from_str::<ErrorPayload>(data)
        .ok()
        .and_then(|payload| payload.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| ERROR_FALLBACK_MESSAGE.to_string())
}
