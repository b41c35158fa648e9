use crate::speedtest::samples::SampleView;
use crate::speedtest::session::{SampleTrack, StreamSession};
use crate::speedtest::{ProgressSnapshot, TestPhase};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::time::Duration;

const PING_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Ping,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Download => Panel::Upload,
            Panel::Upload => Panel::Ping,
            Panel::Ping => Panel::Download,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Download => Panel::Ping,
            Panel::Upload => Panel::Download,
            Panel::Ping => Panel::Upload,
        }
    }
}

pub struct App {
    pub session: StreamSession,
    pub should_quit: bool,

    // UI state
    pub selected_panel: Panel,
    pub expanded: bool,

    // Last values read from the session
    pub snapshot: ProgressSnapshot,
    pub streaming: bool,
    pub download: SampleView,
    pub upload: SampleView,
    pub ping_samples: Vec<f64>,
    pub download_progress: f64,
    pub upload_progress: f64,
}

impl App {
    pub fn new(session: StreamSession) -> Self {
        Self {
            session,
            should_quit: false,
            selected_panel: Panel::Download,
            expanded: false,
            snapshot: ProgressSnapshot::default(),
            streaming: false,
            download: SampleView::default(),
            upload: SampleView::default(),
            ping_samples: Vec::new(),
            download_progress: 0.0,
            upload_progress: 0.0,
        }
    }

    pub fn phase(&self) -> TestPhase {
        self.snapshot.phase
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Enter => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else {
                    Some(AppAction::StartTest)
                }
            }
            KeyCode::Esc => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if self.streaming {
                    Some(AppAction::CancelTest)
                } else {
                    None
                }
            }
            KeyCode::Char('r') => Some(AppAction::CancelTest),
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.next();
                }
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.prev();
                }
                None
            }
            KeyCode::Char(' ') => {
                self.expanded = !self.expanded;
                None
            }
            _ => None,
        }
    }

    pub async fn start_test(&mut self) {
        self.reset_view();
        self.session.start_streaming().await;
        self.refresh();
    }

    pub async fn cancel_test(&mut self) {
        self.session.reset().await;
        self.reset_view();
        self.refresh();
    }

    pub fn refresh(&mut self) {
        self.streaming = self.session.is_streaming();

        let snapshot = self.session.snapshot();
        if snapshot != self.snapshot {
            self.track_progress(&snapshot);
            self.snapshot = snapshot;
        }

        for (track, view) in [
            (SampleTrack::Download, &mut self.download),
            (SampleTrack::Upload, &mut self.upload),
        ] {
            if self.session.sample_version(track) != view.version {
                *view = self.session.samples(track);
            }
        }
    }

    fn track_progress(&mut self, snapshot: &ProgressSnapshot) {
        match snapshot.phase {
            TestPhase::Ping => {
                if let Some(ping) = snapshot.ping_ms {
                    self.ping_samples.push(ping);
                    // Keep last 100 samples
                    if self.ping_samples.len() > PING_HISTORY {
                        self.ping_samples.remove(0);
                    }
                }
            }
            TestPhase::Download => {
                if let Some(fraction) = snapshot.progress {
                    self.download_progress = fraction.clamp(0.0, 1.0);
                }
            }
            TestPhase::Upload => {
                self.download_progress = 1.0;
                if let Some(fraction) = snapshot.progress {
                    self.upload_progress = fraction.clamp(0.0, 1.0);
                }
            }
            TestPhase::Complete => {
                self.download_progress = 1.0;
                self.upload_progress = 1.0;
            }
            TestPhase::Idle | TestPhase::Started | TestPhase::Error => {}
        }
    }

    fn reset_view(&mut self) {
        self.snapshot = ProgressSnapshot::default();
        self.download = SampleView::default();
        self.upload = SampleView::default();
        self.ping_samples.clear();
        self.download_progress = 0.0;
        self.upload_progress = 0.0;
        self.expanded = false;
    }

    pub fn current_download_mbps(&self) -> f64 {
        self.snapshot
            .download_mbps
            .or_else(|| self.download.samples.last().map(|s| s.value_mbps))
            .unwrap_or(0.0)
    }

    pub fn current_upload_mbps(&self) -> f64 {
        self.snapshot
            .upload_mbps
            .or_else(|| self.upload.samples.last().map(|s| s.value_mbps))
            .unwrap_or(0.0)
    }

    pub fn current_ping_ms(&self) -> f64 {
        let ping = match self.snapshot.phase {
            TestPhase::Complete => self.snapshot.ping_ms,
            _ => self.ping_samples.last().copied(),
        };
        ping.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speedtest::error::{StreamOpenError, TransportError};
    use crate::speedtest::transport::{ChunkStream, EventTransport};
    use bytes::Bytes;
    use crossterm::event::{KeyEvent, KeyModifiers};
    use futures::future::BoxFuture;
    use futures::{stream, FutureExt, StreamExt};
    use std::sync::Arc;

    struct FixedTransport(&'static str);

    impl EventTransport for FixedTransport {
        fn open<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<ChunkStream, StreamOpenError>> {
            let body = Bytes::from_static(self.0.as_bytes());
            async move { Ok(stream::iter([Ok::<_, TransportError>(body)]).boxed()) }.boxed()
        }
    }

    fn app(body: &'static str) -> App {
        let session = StreamSession::new(
            Arc::new(FixedTransport(body)),
            "http://test/stream",
            Duration::from_millis(250),
        );
        App::new(session)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn keys_map_to_actions() {
        let mut app = app("");
        assert_eq!(app.handle_key_event(press(KeyCode::Enter)), Some(AppAction::StartTest));
        assert_eq!(app.handle_key_event(press(KeyCode::Esc)), None);

        app.streaming = true;
        assert_eq!(app.handle_key_event(press(KeyCode::Esc)), Some(AppAction::CancelTest));
        assert_eq!(app.handle_key_event(press(KeyCode::Enter)), Some(AppAction::StartTest));
        assert_eq!(app.handle_key_event(press(KeyCode::Char(' '))), None);
        assert!(app.expanded);
        assert_eq!(app.handle_key_event(press(KeyCode::Enter)), None);
        assert!(!app.expanded);
        app.handle_key_event(press(KeyCode::Char(' ')));
        assert_eq!(app.handle_key_event(press(KeyCode::Esc)), None);
        assert!(!app.expanded);

        app.handle_key_event(press(KeyCode::Tab));
        assert_eq!(app.selected_panel, Panel::Upload);
        app.handle_key_event(press(KeyCode::BackTab));
        assert_eq!(app.selected_panel, Panel::Download);

        assert_eq!(app.handle_key_event(press(KeyCode::Char('q'))), Some(AppAction::Quit));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn refresh_collects_a_finished_run() {
        let mut app = app(concat!(
            "event: progress\ndata: {\"phase\":\"ping\",\"ping_ms\":18}\n\n",
            "event: progress\ndata: {\"phase\":\"download\",\"bandwidth_mbps\":70,\"progress\":0.4}\n\n",
            "event: complete\ndata: {\"download_mbps\":72.5,\"upload_mbps\":19.1,\"ping_ms\":17.0}\n\n",
        ));
        app.start_test().await;
        app.session.wait().await;
        app.refresh();

        assert_eq!(app.phase(), TestPhase::Complete);
        assert!(!app.streaming);
        assert_eq!(app.current_download_mbps(), 72.5);
        assert_eq!(app.current_upload_mbps(), 19.1);
        assert_eq!(app.current_ping_ms(), 17.0);
        assert_eq!(app.download.peak, 70.0);
        assert_eq!(app.download_progress, 1.0);

        app.cancel_test().await;
        assert_eq!(app.phase(), TestPhase::Idle);
        assert!(app.download.samples.is_empty());
    }
}
