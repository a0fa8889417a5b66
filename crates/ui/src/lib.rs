#![forbid(unsafe_code)]

mod state;

use chrono::{DateTime, Local};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Wrap};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub use state::{DashboardState, JobCounts, JobRecord, JobStatus, KEY_HINTS};

pub fn render(frame: &mut Frame, state: &DashboardState) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_title_bar(frame, root[0], state);
    render_gauge(frame, root[1], state);

    let status_text = if state.status_text.is_empty() {
        "-"
    } else {
        state.status_text.as_str()
    };
    frame.render_widget(
        Paragraph::new(truncate_to_width(status_text, root[2].width as usize)),
        root[2],
    );

    render_jobs_table(frame, root[3], state);

    let counts = state.counts();
    let status = format!(
        "jobs q:{} r:{} ok:{} cx:{} err:{} | {}",
        counts.queued,
        counts.running,
        counts.finished,
        counts.canceled,
        counts.failed,
        state.status_line
    );
    frame.render_widget(
        Paragraph::new(truncate_to_width(&status, root[4].width as usize))
            .style(Style::default().bg(Color::Blue).fg(Color::White)),
        root[4],
    );

    if let Some(message) = state.error_popup.as_deref() {
        render_error_popup(frame, message);
    }
}

fn render_title_bar(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let activity = if state.busy {
        Span::styled(
            " BUSY ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    } else if state.idle {
        Span::styled(" idle ", Style::default().fg(Color::Green))
    } else {
        Span::styled(" working ", Style::default().fg(Color::Cyan))
    };
    let line = Line::from(vec![
        Span::styled(" jobline ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("worker: {} ", state.worker_name)),
        activity,
    ]);
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

fn render_gauge(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let block = Block::default().title("Progress").borders(Borders::ALL);
    let gauge = match state.percent {
        Some(percent) => Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::Green))
            .percent(percent.clamp(0, 100) as u16),
        None => Gauge::default()
            .block(block)
            .gauge_style(Style::default().fg(Color::DarkGray))
            .ratio(0.0)
            .label("-"),
    };
    frame.render_widget(gauge, area);
}

fn render_jobs_table(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let header = Row::new(vec![
        Cell::from("id"),
        Cell::from("job"),
        Cell::from("status"),
        Cell::from("progress"),
        Cell::from("finished"),
        Cell::from("error"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row<'_>> = if state.jobs().is_empty() {
        vec![Row::new(vec![
            Cell::from("-"),
            Cell::from("-"),
            Cell::from("empty"),
            Cell::from("-"),
            Cell::from("-"),
            Cell::from("-"),
        ])]
    } else {
        state.jobs().iter().rev().map(job_row).collect()
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(Block::default().title("Jobs").borders(Borders::ALL));
    frame.render_widget(table, area);
}

fn job_row(job: &JobRecord) -> Row<'_> {
    let style = match job.status {
        JobStatus::Queued => Style::default().fg(Color::Cyan),
        JobStatus::Running => Style::default().fg(Color::Yellow),
        JobStatus::Finished => Style::default(),
        JobStatus::Canceled | JobStatus::Discarded => Style::default().fg(Color::DarkGray),
        JobStatus::Failed => Style::default().fg(Color::Red),
    };
    let progress = job
        .last_progress
        .map(|percent| format!("{percent}%"))
        .unwrap_or_else(|| String::from("-"));
    let error = job
        .last_error
        .as_ref()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| String::from("-"));

    Row::new(vec![
        Cell::from(job.id.to_string()),
        Cell::from(job.label.as_str()),
        Cell::from(job.status.label()),
        Cell::from(progress),
        Cell::from(format_finished(job.finished_at)),
        Cell::from(error),
    ])
    .style(style)
}

fn render_error_popup(frame: &mut Frame, message: &str) {
    let area = centered_rect(frame.area(), 60, 8);
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title("Error")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(inner);
    frame.render_widget(
        Paragraph::new(message).wrap(Wrap { trim: true }),
        layout[0],
    );
    frame.render_widget(
        Paragraph::new("Esc dismiss").alignment(Alignment::Center),
        layout[1],
    );
}

fn format_finished(finished_at: Option<DateTime<Local>>) -> String {
    finished_at
        .map(|time| time.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| String::from("-"))
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let limit = width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width > limit {
            break;
        }
        used += ch_width;
        out.push(ch);
    }
    if width > 0 {
        out.push('~');
    }
    out
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(2));
    let height = height.min(area.height.saturating_sub(2));

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(width),
            Constraint::Fill(1),
        ])
        .split(area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(horizontal[1]);

    vertical[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn render_to_text(state: &DashboardState, width: u16, height: u16) -> String {
        let backend = TestBackend::new(width, height);
        let mut terminal = Terminal::new(backend).expect("test backend should initialize");
        terminal
            .draw(|frame| render(frame, state))
            .expect("render should succeed");
        let buffer = terminal.backend().buffer();
        let area = buffer.area;
        let mut out = String::new();
        for y in 0..area.height {
            for x in 0..area.width {
                out.push_str(buffer[(x, y)].symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn render_draws_progress_and_job_rows() {
        let mut state = DashboardState::new("slicing_worker", 16);
        let done = state.submit("arrange");
        state.finish(done, JobStatus::Finished, None);
        let slicing = state.submit("slice");
        state.start(slicing);
        state.submit("export");
        state.set_progress(42);
        state.set_status_text("Generating G-code");

        let frame = render_to_text(&state, 100, 20);
        assert!(frame.contains("worker: slicing_worker"));
        assert!(frame.contains("42%"), "gauge should show the percent");
        assert!(frame.contains("Generating G-code"));
        assert!(frame.contains("arrange"));
        assert!(frame.contains("queued"));
    }

    #[test]
    fn render_draws_error_popup_over_the_dashboard() {
        let mut state = DashboardState::new("worker", 16);
        state.show_error("An unexpected error occurred: boom");

        let frame = render_to_text(&state, 100, 24);
        assert!(frame.contains("Error"));
        assert!(frame.contains("An unexpected error occurred: boom"));
        assert!(frame.contains("Esc dismiss"));
    }

    #[test]
    fn truncate_to_width_respects_wide_chars() {
        assert_eq!(truncate_to_width("plate", 10), "plate");
        assert_eq!(truncate_to_width("plate 1 of 4", 6), "plate~");
        assert_eq!(truncate_to_width("切片进行中", 5), "切片~");
    }
}
