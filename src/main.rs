use anyhow::{bail, Result};
use chatvote::chat::demo::DemoChatFetcher;
use chatvote::chat::youtube::{Credentials, YoutubeChatFetcher};
use chatvote::chat::ChatFetcher;
use chatvote::config::{Config, ConfigOverrides, StreamConfig};
use chatvote::logging::{self, LogTarget};
use chatvote::poller::ChatPoller;
use chatvote::resolver::{OptionResolver, MAX_OPTIONS};
use chatvote::session::VoteSession;
use chatvote::tally::CountMode;
use chatvote::ui::app::{self, App};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const DEMO_STREAM_ID: &str = "demo";
const CLOSE_GRACE: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "chatvote")]
#[command(about = "Run a numbered vote from a YouTube live chat", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Live chat id to poll
    #[arg(long)]
    live_chat_id: Option<String>,

    /// YouTube Data API key
    #[arg(long)]
    api_key: Option<String>,

    /// OAuth access token (used instead of the API key when present)
    #[arg(long)]
    access_token: Option<String>,

    /// Drive the vote with synthetic chat messages
    #[arg(long)]
    demo: bool,

    /// Number of options in play (2-8)
    #[arg(long)]
    options: Option<usize>,

    /// Vote duration in seconds (30-300)
    #[arg(long)]
    duration: Option<u64>,

    /// Count each voter once instead of every vote
    #[arg(long)]
    once_per_voter: bool,

    /// Log filter, e.g. "debug" or "chatvote=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Run one vote without the terminal UI and print the result
    #[arg(long)]
    headless: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            live_chat_id: self.live_chat_id.clone(),
            api_key: self.api_key.clone(),
            access_token: self.access_token.clone(),
            demo: self.demo.then_some(true),
            option_count: self.options,
            duration_secs: self.duration,
            count_mode: self.once_per_voter.then_some(CountMode::OncePerVoter),
            log_level: self.log_level.clone(),
        }
    }
}

fn build_fetcher(stream: &StreamConfig) -> Result<Arc<dyn ChatFetcher>> {
    if stream.demo {
        return Ok(Arc::new(DemoChatFetcher::default()));
    }
    let credentials = match (&stream.access_token, &stream.api_key) {
        (Some(token), _) => Credentials::AccessToken(token.clone()),
        (None, Some(key)) => Credentials::ApiKey(key.clone()),
        (None, None) => bail!(
            "No YouTube credentials. Set stream.api_key or stream.access_token, or pass --demo"
        ),
    };
    Ok(Arc::new(YoutubeChatFetcher::with_api_base(
        stream.api_base.clone(),
        credentials,
    )))
}

async fn stop_poller(poller: &ChatPoller, mut handle: JoinHandle<()>) {
    poller.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
        tracing::warn!("chat poller did not drain in time, aborting");
        handle.abort();
    }
}

async fn run_headless(
    config: &Config,
    session: Arc<VoteSession>,
    poller: Arc<ChatPoller>,
    handle: JoinHandle<()>,
) -> Result<()> {
    let (closed_tx, mut closed_rx) = tokio::sync::mpsc::unbounded_channel();
    session.subscribe_window_closed(move |batch| {
        let _ = closed_tx.send(batch.len());
    });

    session.open(config.vote.duration_secs);
    tokio::time::sleep(Duration::from_secs(config.vote.duration_secs)).await;
    session.close();

    match tokio::time::timeout(CLOSE_GRACE, closed_rx.recv()).await {
        Ok(Some(messages)) => tracing::info!(messages, "vote finished"),
        _ => tracing::warn!("no chat after the close instant, reporting the running tally"),
    }

    let snapshot = session.snapshot();
    for i in 0..snapshot.options.len() {
        let label = snapshot.label(
            i,
            config.vote.label_mode,
            config.vote.display,
            &config.vote.option_texts,
        );
        println!("{}", label.replace('\n', " "));
    }
    if config.vote.show_total {
        println!("Total: {}", snapshot.total());
    }

    stop_poller(&poller, handle).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config.clone().or_else(Config::default_path) {
        Some(path) => path,
        None => bail!("Could not determine a config directory, pass --config"),
    };
    let config = Config::load(&config_path)?.merge(cli.overrides());

    let target = if cli.headless {
        LogTarget::Stderr
    } else {
        LogTarget::File(logging::default_log_file())
    };
    logging::init(&config.log_level, target)?;
    tracing::info!(config = %config_path.display(), "configuration loaded");

    if cli.save_config {
        config.save(&config_path)?;
        tracing::info!(config = %config_path.display(), "configuration saved");
    }

    let fetcher = build_fetcher(&config.stream)?;
    let poller = Arc::new(ChatPoller::new(fetcher, config.poller.settings()));
    poller.subscribe_shutdown(|| tracing::info!("chat poller drained"));

    let resolver = OptionResolver::new(MAX_OPTIONS).with_demo(config.stream.demo);
    let session = Arc::new(VoteSession::new(
        config.vote.option_count,
        config.vote.count_mode,
        resolver,
    ));
    session.attach(&poller);

    let stream_id = if config.stream.live_chat_id.is_empty() && config.stream.demo {
        DEMO_STREAM_ID.to_string()
    } else {
        config.stream.live_chat_id.clone()
    };
    if stream_id.is_empty() {
        tracing::warn!("no live chat id configured, waiting for one");
    }
    let handle = poller.start(stream_id);

    if cli.headless {
        return run_headless(&config, session, poller, handle).await;
    }

    let app = App::new(Arc::clone(&session), Arc::clone(&poller), &config.vote);
    let result = app::run(app).await;
    stop_poller(&poller, handle).await;
    result
}
