use crate::app::{App, Panel};
use crate::speedtest::samples::{SampleView, SpeedSample};
use crate::speedtest::TestPhase;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

// Color Palette - Elegant & Minimal
const ACCENT: Color = Color::Rgb(100, 149, 237); // Cornflower blue
const SUCCESS: Color = Color::Rgb(134, 194, 156); // Soft green
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const INFO: Color = Color::Rgb(147, 180, 220); // Soft blue
const INFO_DIM: Color = Color::Rgb(90, 110, 140);
const WARN: Color = Color::Rgb(220, 180, 130); // Soft amber
const DANGER: Color = Color::Rgb(224, 122, 122);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

struct MetricPanel<'a> {
    title: &'static str,
    color: Color,
    dim_color: Color,
    speed: f64,
    progress: f64,
    samples: &'a SampleView,
}

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .split(frame.area());

    draw_header(frame, chunks[0], app);

    if app.expanded {
        draw_panel(frame, chunks[1], app, app.selected_panel, true);
    } else {
        let panels = Layout::horizontal([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(chunks[1]);

        for (area, panel) in panels.iter().zip([Panel::Download, Panel::Upload, Panel::Ping]) {
            draw_panel(frame, *area, app, panel, app.selected_panel == panel);
        }
    }

    draw_help(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(16),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    frame.render_widget(
        Paragraph::new("ericspeed live")
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        chunks[0],
    );

    let (status, color) = match app.phase() {
        TestPhase::Idle => ("Ready".to_string(), TEXT_MUTED),
        TestPhase::Started => ("Waiting for server...".to_string(), TEXT_SECONDARY),
        TestPhase::Ping => ("Measuring latency...".to_string(), WARN),
        TestPhase::Download => ("Testing download...".to_string(), SUCCESS),
        TestPhase::Upload => ("Testing upload...".to_string(), INFO),
        TestPhase::Complete => match &app.snapshot.measurement_id {
            Some(id) => (format!("Complete · #{id}"), ACCENT),
            None => ("Complete".to_string(), ACCENT),
        },
        TestPhase::Error => (
            app.snapshot
                .message
                .clone()
                .unwrap_or_else(|| "Failed".to_string()),
            DANGER,
        ),
    };
    let status = if !app.streaming && app.phase().is_running() {
        format!("{status} (stream closed)")
    } else {
        status
    };

    frame.render_widget(
        Paragraph::new(status)
            .style(Style::default().fg(color))
            .alignment(Alignment::Center),
        chunks[1],
    );

    frame.render_widget(
        Paragraph::new(create_phase_text(app.phase())).alignment(Alignment::Right),
        chunks[2],
    );
}

fn create_phase_text(phase: TestPhase) -> Line<'static> {
    let phases = [
        (TestPhase::Ping, "ping"),
        (TestPhase::Download, "down"),
        (TestPhase::Upload, "up"),
    ];

    let mut spans = Vec::new();

    for (i, (p, label)) in phases.iter().enumerate() {
        let is_active = phase == *p;
        let is_complete = match phase {
            TestPhase::Download => *p == TestPhase::Ping,
            TestPhase::Upload => *p == TestPhase::Ping || *p == TestPhase::Download,
            TestPhase::Complete => true,
            _ => false,
        };

        let style = if is_active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if is_complete {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };

        spans.push(Span::styled(*label, style));

        if i < phases.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

fn draw_panel(frame: &mut Frame, area: Rect, app: &App, panel: Panel, selected: bool) {
    match panel {
        Panel::Download => draw_metric_panel(
            frame,
            area,
            selected,
            app.expanded,
            MetricPanel {
                title: "Download",
                color: SUCCESS,
                dim_color: SUCCESS_DIM,
                speed: app.current_download_mbps(),
                progress: app.download_progress,
                samples: &app.download,
            },
        ),
        Panel::Upload => draw_metric_panel(
            frame,
            area,
            selected,
            app.expanded,
            MetricPanel {
                title: "Upload",
                color: INFO,
                dim_color: INFO_DIM,
                speed: app.current_upload_mbps(),
                progress: app.upload_progress,
                samples: &app.upload,
            },
        ),
        Panel::Ping => draw_ping_panel(frame, area, app, selected),
    }
}

fn panel_block(title: &str, color: Color, selected: bool) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if selected { BORDER_ACTIVE } else { BORDER }))
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(if selected { color } else { TEXT_SECONDARY }),
        ))
}

fn draw_metric_panel(frame: &mut Frame, area: Rect, selected: bool, detailed: bool, panel: MetricPanel) {
    let block = panel_block(panel.title, panel.color, selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let mut spans = vec![Span::styled(
        format_speed(panel.speed),
        Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
    )];
    if panel.samples.peak > 0.0 {
        spans.push(Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)));
        spans.push(Span::styled(
            format!("peak {}", format_speed(panel.samples.peak)),
            Style::default().fg(TEXT_MUTED),
        ));
    }
    if detailed {
        let (avg, _, min) = get_stats(&panel.samples.samples);
        spans.push(Span::styled(
            format!("  ·  avg {}  ·  min {}", format_speed(avg), format_speed(min)),
            Style::default().fg(TEXT_MUTED),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)).alignment(Alignment::Center), chunks[0]);

    draw_progress_bar(frame, chunks[1], panel.progress, panel.color, panel.dim_color);

    let points: Vec<(f64, f64)> = panel
        .samples
        .samples
        .iter()
        .map(|s| (s.time_offset_seconds, s.value_mbps))
        .collect();
    draw_chart(frame, chunks[2], &points, panel.color, detailed.then_some("Mbps"));
}

fn draw_ping_panel(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let block = panel_block("Latency", WARN, selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    let ping = app.current_ping_ms();
    let value = if ping > 0.0 {
        format!("{:.0} ms", ping)
    } else {
        "—".to_string()
    };
    frame.render_widget(
        Paragraph::new(value)
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        chunks[0],
    );

    let jitter = match app.snapshot.jitter_ms {
        Some(jitter) => format!("jitter {:.1} ms", jitter),
        None => "jitter —".to_string(),
    };
    frame.render_widget(
        Paragraph::new(jitter)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[1],
    );

    let points: Vec<(f64, f64)> = app
        .ping_samples
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();
    draw_chart(frame, chunks[2], &points, WARN, app.expanded.then_some("ms"));
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(empty), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_chart(frame: &mut Frame, area: Rect, points: &[(f64, f64)], color: Color, unit: Option<&str>) {
    if points.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let (x_min, x_max) = get_range(points.iter().map(|p| p.0));
    let (y_min, y_max) = get_range(points.iter().map(|p| p.1));
    let range = (y_max - y_min).max(1.0);
    let y_min = (y_min - range * 0.1).max(0.0);
    let y_max = y_max + range * 0.1;

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(points);

    let mut y_axis = Axis::default()
        .style(Style::default().fg(BORDER))
        .bounds([y_min, y_max]);
    if let Some(unit) = unit {
        y_axis = y_axis.labels(vec![
            Span::styled(format!("{:.0}", y_min), Style::default().fg(TEXT_MUTED)),
            Span::styled(format!("{:.0} {}", y_max, unit), Style::default().fg(TEXT_MUTED)),
        ]);
    }

    let chart = Chart::new(vec![dataset])
        .x_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([x_min, x_max.max(x_min + 1.0)]),
        )
        .y_axis(y_axis);

    frame.render_widget(chart, area);
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    frame.render_widget(
        Paragraph::new(help_text(app.expanded, app.streaming))
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

fn help_text(expanded: bool, streaming: bool) -> &'static str {
    if expanded {
        "esc close · q quit"
    } else if streaming {
        "enter restart · tab select · space expand · esc cancel · q quit"
    } else {
        "enter start · r reset · tab select · space expand · q quit"
    }
}

// Helpers
fn get_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn get_stats(samples: &[SpeedSample]) -> (f64, f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let avg = samples.iter().map(|s| s.value_mbps).sum::<f64>() / samples.len() as f64;
    let (min, max) = get_range(samples.iter().map(|s| s.value_mbps));
    (avg, max, min)
}

fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.1} Gbps", mbps / 1000.0)
    } else if mbps >= 1.0 {
        format!("{:.1} Mbps", mbps)
    } else if mbps > 0.0 {
        format!("{:.0} Kbps", mbps * 1000.0)
    } else {
        "—".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_speeds_by_magnitude() {
        assert_eq!(format_speed(0.0), "—");
        assert_eq!(format_speed(0.25), "250 Kbps");
        assert_eq!(format_speed(94.26), "94.3 Mbps");
        assert_eq!(format_speed(1500.0), "1.5 Gbps");
    }

    #[test]
    fn help_offers_restart_while_streaming() {
        assert!(help_text(false, true).starts_with("enter restart"));
        assert!(help_text(false, false).starts_with("enter start"));
        assert!(!help_text(true, true).contains("enter"));
    }

    #[test]
    fn stats_cover_all_samples() {
        let samples = [10.0, 30.0, 20.0].map(|v| SpeedSample {
            time_offset_seconds: 0.0,
            value_mbps: v,
        });
        assert_eq!(get_stats(&samples), (20.0, 30.0, 10.0));
        assert_eq!(get_stats(&[]), (0.0, 0.0, 0.0));
    }
}
