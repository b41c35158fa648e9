use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::Event;
use ericspeed_live::app::{poll_event, App, AppAction};
use ericspeed_live::logging;
use ericspeed_live::settings::{Cli, Settings};
use ericspeed_live::speedtest::session::StreamSession;
use ericspeed_live::speedtest::transport::HttpTransport;
use ericspeed_live::speedtest::{ProgressSnapshot, TestPhase};
use ericspeed_live::ui::draw_ui;
use ratatui::DefaultTerminal;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from(Cli::parse());
    if settings.plain || settings.log.file.is_some() {
        logging::init(&settings.log)?;
    }

    let transport =
        HttpTransport::new(settings.connect_timeout).context("failed to build HTTP client")?;
    let url = settings.stream_url();
    tracing::info!(%url, "using progress stream");
    let session = StreamSession::new(Arc::new(transport), url, settings.throttle_window);

    if settings.plain {
        return run_plain(session).await;
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, App::new(session)).await;

    ratatui::restore();
    result
}

async fn run_app(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
    loop {
        app.refresh();
        terminal.draw(|frame| draw_ui(frame, &app))?;

        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            match app.handle_key_event(key) {
                Some(AppAction::Quit) => break,
                Some(AppAction::StartTest) => app.start_test().await,
                Some(AppAction::CancelTest) => app.cancel_test().await,
                None => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    app.session.reset().await;
    Ok(())
}

async fn run_plain(mut session: StreamSession) -> Result<()> {
    session.start_streaming().await;

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut last = ProgressSnapshot::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                session.reset().await;
                println!("cancelled");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let snapshot = session.snapshot();
        if snapshot != last {
            println!("{}", describe(&snapshot));
            last = snapshot;
        }
        if !session.is_streaming() {
            break;
        }
    }

    session.wait().await;
    let snapshot = session.snapshot();
    if snapshot != last {
        println!("{}", describe(&snapshot));
    }
    if snapshot.phase == TestPhase::Error {
        anyhow::bail!(snapshot.message.unwrap_or_default());
    }
    Ok(())
}

fn describe(snapshot: &ProgressSnapshot) -> String {
    let mut line = snapshot.phase.as_str().to_string();
    let fields = [
        ("bandwidth", snapshot.bandwidth_mbps, "Mbps"),
        ("ping", snapshot.ping_ms, "ms"),
        ("download", snapshot.download_mbps, "Mbps"),
        ("upload", snapshot.upload_mbps, "Mbps"),
        ("jitter", snapshot.jitter_ms, "ms"),
    ];
    for (label, value, unit) in fields {
        if let Some(value) = value {
            line.push_str(&format!(" {label}={value:.1}{unit}"));
        }
    }
    if let Some(progress) = snapshot.progress {
        line.push_str(&format!(" {:.0}%", progress * 100.0));
    }
    if let Some(id) = &snapshot.measurement_id {
        line.push_str(&format!(" id={id}"));
    }
    if let Some(message) = &snapshot.message {
        line.push_str(&format!(" message={message:?}"));
    }
    line
}
