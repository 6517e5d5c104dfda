use crate::config::VoteConfig;
use crate::poller::ChatPoller;
use crate::session::VoteSession;
use crate::ui::widgets::vote::{VotePanel, WindowStatus};
use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

pub struct App {
    session: Arc<VoteSession>,
    poller: Arc<ChatPoller>,
    panel: VotePanel,
    duration_secs: u64,
}

impl App {
    pub fn new(session: Arc<VoteSession>, poller: Arc<ChatPoller>, config: &VoteConfig) -> Self {
        Self {
            session,
            poller,
            panel: VotePanel::new("Chat Vote", config),
            duration_secs: config.duration_secs,
        }
    }

    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Action {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.poller.shutdown();
                return Action::Quit;
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.poller.shutdown();
                return Action::Quit;
            }
            KeyCode::Char('o') => self.session.open(self.duration_secs),
            KeyCode::Char('c') => self.session.close(),
            KeyCode::Char('m') => self.session.set_count_mode(self.session.count_mode().toggle()),
            KeyCode::Char('l') => self.panel.toggle_label_mode(),
            KeyCode::Char('d') => self.panel.toggle_display(),
            KeyCode::Char('t') => self.panel.toggle_total(),
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.session.set_option_count(self.session.option_count() + 1)
            }
            KeyCode::Char('-') => {
                self.session
                    .set_option_count(self.session.option_count().saturating_sub(1))
            }
            _ => {}
        }
        Action::Continue
    }

    pub fn render(&self, frame: &mut Frame) {
        let now = chrono::Utc::now().timestamp_millis();
        let snapshot = self.session.snapshot();
        let status = WindowStatus::of(&self.session, now);
        let area = frame.area();
        self.panel.render(frame, area, &snapshot, status);
    }
}

/// Takes over the terminal until the user quits.
pub async fn run(mut app: App) -> Result<()> {
    enable_raw_mode()?;
    let mut terminal = match setup_terminal() {
        Ok(terminal) => terminal,
        Err(e) => {
            let _ = io::stdout().execute(LeaveAlternateScreen);
            let _ = disable_raw_mode();
            return Err(e);
        }
    };

    let result = event_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        terminal.draw(|frame| app.render(frame))?;

        tokio::select! {
            _ = redraw.tick() => {}
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key.code, key.modifiers) == Action::Quit {
                        return Ok(());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::demo::DemoChatFetcher;
    use crate::poller::{PollerSettings, PollerState};
    use crate::resolver::OptionResolver;
    use crate::tally::CountMode;
    use crate::window::WindowState;

    fn app() -> App {
        let poller = Arc::new(ChatPoller::new(
            Arc::new(DemoChatFetcher::default()),
            PollerSettings::default(),
        ));
        let session = Arc::new(VoteSession::new(
            4,
            CountMode::EveryVote,
            OptionResolver::default(),
        ));
        App::new(session, poller, &VoteConfig::default())
    }

    #[test]
    fn test_open_and_close_keys() {
        let mut app = app();
        assert_eq!(app.handle_key(KeyCode::Char('o'), KeyModifiers::NONE), Action::Continue);
        assert_eq!(app.session.window_state(), WindowState::Open);
        let before = app.session.closes_at().unwrap();
        app.handle_key(KeyCode::Char('c'), KeyModifiers::NONE);
        assert!(app.session.closes_at().unwrap() <= before);
    }

    #[test]
    fn test_mode_and_option_keys() {
        let mut app = app();
        app.handle_key(KeyCode::Char('m'), KeyModifiers::NONE);
        assert_eq!(app.session.count_mode(), CountMode::OncePerVoter);
        app.handle_key(KeyCode::Char('+'), KeyModifiers::NONE);
        assert_eq!(app.session.option_count(), 5);
        for _ in 0..10 {
            app.handle_key(KeyCode::Char('-'), KeyModifiers::NONE);
        }
        assert_eq!(app.session.option_count(), 2);
    }

    #[test]
    fn test_quit_requests_poller_shutdown() {
        let mut app = app();
        assert_eq!(app.handle_key(KeyCode::Char('q'), KeyModifiers::NONE), Action::Quit);
        assert_eq!(app.poller.state(), PollerState::ShuttingDown);

        let mut app = self::app();
        assert_eq!(app.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL), Action::Quit);
    }
}
