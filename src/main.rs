use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dictation_relay::audio::FrameSourceFactory;
use dictation_relay::chat::{
    AnswerService, ChatHistory, ChatSession, CommandAnswerService, UnconfiguredAnswerService,
};
use dictation_relay::coordination::{CoordinationChannel, FileChannel, Reconciler};
use dictation_relay::recognizer::{
    model_provider, unavailable_provider, ModelLoader, RecognizerProvider, SpeechModel,
};
use dictation_relay::session::{
    capture_for, CancellationToken, ProcessSpawner, SessionConfig, SessionController,
    SessionWorker, SourceProvider, StartOutcome, ThreadSpawner, WorkerSpawner,
};
use dictation_relay::{create_router, AppState, Config};
use std::ffi::OsString;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_CONFIG: &str = "config/dictation";

#[derive(Parser)]
#[command(name = "dictation-relay", version, about = "Voice dictation sessions for a chat front-end")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a background dictation session
    Start,
    /// Ask the active session to stop
    Stop,
    /// Show whether a session is active and its latest partial text
    Status,
    /// Take the session result
    Result {
        /// Keep polling up to this many seconds for the result
        #[arg(long, default_value_t = 0)]
        wait: u64,
    },
    /// Clean up records left behind by a crashed worker
    Reconcile,
    /// Record in the foreground and print what was recognized
    TestCapture {
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// Send a question to the chat collaborator
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// List past chat exchanges
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Serve the HTTP API, running workers in-process
    Serve,
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        session_id: Uuid,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Start => start(&cfg, &cli.config),
        Commands::Stop => stop(&cfg, &cli.config),
        Commands::Status => status(&cfg, &cli.config),
        Commands::Result { wait } => result(&cfg, &cli.config, Duration::from_secs(wait)),
        Commands::Reconcile => reconcile(&cfg),
        Commands::TestCapture { seconds } => test_capture(&cfg, Duration::from_secs(seconds)),
        Commands::Ask { question } => runtime()?.block_on(ask(&cfg, &question.join(" "))),
        Commands::History { clear } => history(&cfg, clear),
        Commands::Serve => runtime()?.block_on(serve(cfg)),
        Commands::Worker { session_id } => worker(&cfg, session_id),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn open_channel(cfg: &Config) -> Result<Arc<dyn CoordinationChannel>> {
    let channel = FileChannel::open(&cfg.coordination.dir)
        .with_context(|| format!("opening {}", cfg.coordination.dir.display()))?;
    Ok(Arc::new(channel))
}

/// Controller for one-shot CLI calls; workers run as detached processes
fn cli_controller(cfg: &Config, config_path: &str) -> Result<SessionController> {
    let channel = open_channel(cfg)?;
    let spawner = ProcessSpawner::current_exe(vec![
        OsString::from("--config"),
        OsString::from(config_path),
    ])?
    .with_log(cfg.coordination.dir.join("worker.log"));

    let controller = SessionController::new(
        channel,
        Arc::new(spawner),
        ModelLoader::probe(&cfg.recognizer),
        cfg.stale_after(),
    );
    controller.reconcile()?;
    Ok(controller)
}

fn source_provider(cfg: &Config) -> SourceProvider {
    let audio = cfg.audio.clone();
    Arc::new(move || FrameSourceFactory::create(&audio))
}

fn recognizer_provider(cfg: &Config) -> (RecognizerProvider, bool) {
    match ModelLoader::load(&cfg.recognizer) {
        Ok(model) => (model_provider(model), true),
        Err(e) => {
            warn!("Speech recognition disabled: {}", e);
            (unavailable_provider(e.to_string()), false)
        }
    }
}

fn start(cfg: &Config, config_path: &str) -> Result<()> {
    let controller = cli_controller(cfg, config_path)?;
    match controller.start()? {
        StartOutcome::Started(session_id) => println!("started {}", session_id),
        StartOutcome::AlreadyActive => println!("already active"),
    }
    Ok(())
}

fn stop(cfg: &Config, config_path: &str) -> Result<()> {
    let controller = cli_controller(cfg, config_path)?;
    if controller.request_stop()? {
        println!("stopping");
    } else {
        println!("no active session");
    }
    Ok(())
}

fn status(cfg: &Config, config_path: &str) -> Result<()> {
    let controller = cli_controller(cfg, config_path)?;
    match controller.status()? {
        Some(status) => {
            println!("recording {} (pid {})", status.session_id, status.pid);
            if let Some(partial) = controller.poll_partial()? {
                println!("partial: {}", partial);
            }
        }
        None => println!("idle"),
    }
    if !controller.stt_available() {
        println!("speech recognition unavailable");
    }
    Ok(())
}

fn result(cfg: &Config, config_path: &str, wait: Duration) -> Result<()> {
    let controller = cli_controller(cfg, config_path)?;
    let deadline = Instant::now() + wait;
    loop {
        if let Some(record) = controller.poll_final()? {
            println!("{}", record.text);
            if record.is_error() {
                bail!("session {} failed", record.session_id);
            }
            return Ok(());
        }
        if Instant::now() >= deadline {
            println!("no result");
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(cfg.coordination.poll_timeout_ms));
    }
}

fn reconcile(cfg: &Config) -> Result<()> {
    let report = Reconciler::new(open_channel(cfg)?, cfg.stale_after()).run()?;
    if report.is_clean() {
        println!("nothing to reconcile");
    } else {
        println!("{:?}", report);
    }
    Ok(())
}

fn test_capture(cfg: &Config, duration: Duration) -> Result<()> {
    let model: Arc<dyn SpeechModel> = ModelLoader::load(&cfg.recognizer)?;
    let session = SessionConfig::from(cfg);
    let mut recognizer = model.create_recognizer(session.sample_rate)?;
    let source = FrameSourceFactory::create(&cfg.audio)?;

    println!("Recording for {}s...", duration.as_secs());
    let text = capture_for(source, recognizer.as_mut(), duration, &session)?;
    println!("{}", text);
    Ok(())
}

fn answer_service(cfg: &Config) -> Arc<dyn AnswerService> {
    match CommandAnswerService::from_config(&cfg.chat) {
        Some(service) => Arc::new(service),
        None => Arc::new(UnconfiguredAnswerService),
    }
}

async fn ask(cfg: &Config, question: &str) -> Result<()> {
    let mut chat = ChatSession::new(answer_service(cfg)).with_history_file(&cfg.chat.history_path)?;
    let entry = chat.ask(question).await?;
    println!("{}", entry.answer);
    if entry.is_error {
        bail!("question failed");
    }
    Ok(())
}

fn history(cfg: &Config, clear: bool) -> Result<()> {
    let path = &cfg.chat.history_path;
    let mut history = ChatHistory::load(path)?;
    if clear {
        history.clear();
        history.save(path)?;
        println!("history cleared");
        return Ok(());
    }
    for (index, entry) in history.entries().iter().enumerate() {
        let marker = if entry.is_error { " [error]" } else { "" };
        println!(
            "{:>3}  {}  {}{}",
            index,
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.title(),
            marker
        );
    }
    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let channel = open_channel(&cfg)?;
    let (recognizers, stt_available) = recognizer_provider(&cfg);
    let spawner = Arc::new(ThreadSpawner::new(
        channel.clone(),
        source_provider(&cfg),
        recognizers,
        SessionConfig::from(&cfg),
    ));

    let controller = SessionController::new(
        channel,
        spawner.clone() as Arc<dyn WorkerSpawner>,
        stt_available,
        cfg.stale_after(),
    );
    controller.reconcile()?;

    let chat = ChatSession::new(answer_service(&cfg)).with_history_file(&cfg.chat.history_path)?;
    let app = create_router(AppState::new(controller, chat));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("{} listening on http://{}", cfg.service.name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    let finished = tokio::task::spawn_blocking(move || spawner.shutdown()).await?;
    info!(workers = finished.len(), "Workers stopped");
    Ok(())
}

/// Hidden entry point of a detached worker process
fn worker(cfg: &Config, session_id: Uuid) -> Result<()> {
    let channel = open_channel(cfg)?;
    let (recognizers, _) = recognizer_provider(cfg);
    let token = CancellationToken::new(channel.clone());

    let record = SessionWorker::new(
        session_id,
        channel,
        source_provider(cfg),
        recognizers,
        SessionConfig::from(cfg),
        token,
    )
    .run();

    if record.is_error() {
        bail!("session {} ended with error: {}", session_id, record.text);
    }
    Ok(())
}
