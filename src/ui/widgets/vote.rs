use crate::config::VoteConfig;
use crate::session::VoteSession;
use crate::tally::{DisplayMode, LabelMode, TallySnapshot};
use crate::window::WindowState;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Bar, BarChart, BarGroup, Block, Borders, Paragraph},
    Frame,
};

const BAR_COLORS: [Color; 8] = [
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::Green,
    Color::LightRed,
    Color::LightBlue,
    Color::LightMagenta,
    Color::LightGreen,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    Idle,
    Open { remaining_secs: i64 },
    /// Past the close instant, waiting for the next chat message to seal it.
    Closing,
    Closed,
}

impl WindowStatus {
    pub fn of(session: &VoteSession, now_ms: i64) -> Self {
        match session.window_timing() {
            (WindowState::Open, Some(close_at)) if close_at > now_ms => WindowStatus::Open {
                remaining_secs: (close_at - now_ms + 999) / 1000,
            },
            (WindowState::Open, _) => WindowStatus::Closing,
            (WindowState::Closed, _) => WindowStatus::Closed,
            (WindowState::Idle, _) => WindowStatus::Idle,
        }
    }

    fn describe(&self) -> (String, Color) {
        match self {
            WindowStatus::Idle => ("No vote yet".to_string(), Color::Gray),
            WindowStatus::Open { remaining_secs } => {
                (format!("Voting open: {}s left", remaining_secs), Color::Green)
            }
            WindowStatus::Closing => ("Closing...".to_string(), Color::Yellow),
            WindowStatus::Closed => ("Vote closed".to_string(), Color::Red),
        }
    }
}

/// Bar chart of the current tally plus a status line.
#[derive(Debug, Clone)]
pub struct VotePanel {
    title: String,
    label_mode: LabelMode,
    display: DisplayMode,
    show_total: bool,
    option_texts: Vec<String>,
}

impl VotePanel {
    pub fn new(title: impl Into<String>, config: &VoteConfig) -> Self {
        Self {
            title: title.into(),
            label_mode: config.label_mode,
            display: config.display,
            show_total: config.show_total,
            option_texts: config.option_texts.clone(),
        }
    }

    pub fn label_mode(&self) -> LabelMode {
        self.label_mode
    }

    pub fn display(&self) -> DisplayMode {
        self.display
    }

    pub fn show_total(&self) -> bool {
        self.show_total
    }

    pub fn toggle_label_mode(&mut self) {
        self.label_mode = match self.label_mode {
            LabelMode::Index => LabelMode::Text,
            LabelMode::Text => LabelMode::Index,
        };
    }

    pub fn toggle_display(&mut self) {
        self.display = match self.display {
            DisplayMode::Number => DisplayMode::Ratio,
            DisplayMode::Ratio => DisplayMode::Number,
        };
    }

    pub fn toggle_total(&mut self) {
        self.show_total = !self.show_total;
    }

    fn bars(&self, snapshot: &TallySnapshot) -> Vec<Bar<'static>> {
        snapshot
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let label = snapshot.label(i, self.label_mode, self.display, &self.option_texts);
                let (name, value_text) = label.split_once('\n').unwrap_or((label.as_str(), ""));
                let value = match self.display {
                    DisplayMode::Number => u64::from(option.count(snapshot.mode)),
                    DisplayMode::Ratio => (option.ratio * 100.0).round() as u64,
                };
                Bar::default()
                    .value(value)
                    .label(Line::from(name.to_string()))
                    .text_value(value_text.to_string())
                    .style(Style::default().fg(BAR_COLORS[option.index % BAR_COLORS.len()]))
            })
            .collect()
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, snapshot: &TallySnapshot, status: WindowStatus) {
        let block = Block::default()
            .title(format!(" {} ", self.title))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White));

        let inner = block.inner(area);
        frame.render_widget(block, area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(inner);

        let (status_text, status_color) = status.describe();
        let mut header = vec![Span::styled(
            status_text,
            Style::default()
                .fg(status_color)
                .add_modifier(Modifier::BOLD),
        )];
        if self.show_total {
            header.push(Span::styled(
                format!("  | Total: {}", snapshot.total()),
                Style::default().fg(Color::White),
            ));
        }
        frame.render_widget(Paragraph::new(Line::from(header)), chunks[0]);

        let bars = self.bars(snapshot);
        let max = match self.display {
            DisplayMode::Number => snapshot
                .options
                .iter()
                .map(|o| u64::from(o.count(snapshot.mode)))
                .max()
                .unwrap_or(0)
                .max(1),
            DisplayMode::Ratio => 100,
        };
        let count = snapshot.options.len().max(1) as u16;
        let bar_width = (chunks[1].width.saturating_sub(count) / count).clamp(3, 12);
        let chart = BarChart::default()
            .data(BarGroup::default().bars(&bars))
            .bar_width(bar_width)
            .bar_gap(1)
            .max(max);
        frame.render_widget(chart, chunks[1]);

        let help = Paragraph::new(Line::from(Span::styled(
            "o: Open | c: Close | m: Mode | l: Labels | d: Count/% | t: Total | +/-: Options | q: Quit",
            Style::default().fg(Color::DarkGray),
        )))
        .alignment(Alignment::Center);
        frame.render_widget(help, chunks[2]);
    }
}
