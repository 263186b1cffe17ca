use anyhow::Result;
use clap::{Parser, Subcommand};
use magus::bus::{BusMessage, IntentMessage, SpeakMessage, TOPIC_INTENT, TOPIC_SPEAK, TOPIC_UNRECOGNIZED};
use magus::fallback::LlmClient;
use magus::scheduler::DEFAULT_POLL_INTERVAL;
use magus::tools::WeatherClient;
use magus::{Agent, Config, EventChecker, EventStore, IntentParser, MessageBus, SchedulerEngine, ToolDispatcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "magus", about = "Voice-assistant intent pipeline with durable timers")]
struct Cli {
    /// Path to a config.toml file
    #[arg(short = 'c', long, value_name = "PATH", env = "MAGUS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the assistant: event recovery, the polling checker and a
    /// line-oriented utterance loop on stdin
    Run,
    /// Resolve and execute a single utterance, then exit
    Say {
        /// The utterance, e.g. "поставь таймер на 5 минут"
        text: Vec<String>,
    },
    /// Add a contact to the phone book
    AddContact {
        name: String,
        phone_number: String,
    },
}

struct Runtime {
    agent: Agent,
    scheduler: Arc<SchedulerEngine>,
    bus: MessageBus,
}

fn build_runtime(config: &Config) -> Result<Runtime> {
    let store = Arc::new(EventStore::open(&config.database_path())?);
    let bus = MessageBus::default();
    let scheduler = Arc::new(
        SchedulerEngine::new(Arc::clone(&store), bus.clone())
            .with_delivery_timeout(Duration::from_secs(config.delivery_timeout_secs)),
    );

    let weather = match &config.weather.api_key {
        Some(key) => Some(WeatherClient::new(key.clone(), config.weather.city.clone())?),
        None => None,
    };

    let fallback = if config.fallback.enabled {
        Some(LlmClient::new(
            config.fallback.endpoint.clone(),
            config.fallback.model.clone(),
            config.fallback.api_key.clone(),
            Duration::from_secs(config.fallback.timeout_secs),
        )?)
    } else {
        None
    };

    let dispatcher = ToolDispatcher::new(Arc::clone(&scheduler), weather);
    let parser = IntentParser::new(config.confidence_threshold);
    let agent = Agent::new(parser, dispatcher, fallback, bus.clone());

    Ok(Runtime {
        agent,
        scheduler,
        bus,
    })
}

async fn run_repl(config: &Config) -> Result<()> {
    let runtime = build_runtime(config)?;
    let agent = Arc::new(runtime.agent);
    let report = runtime.scheduler.recover().await?;
    info!(
        restored = report.restored,
        expired = report.expired,
        "startup recovery complete"
    );

    let cancel = CancellationToken::new();
    let poll_interval = if config.poll_interval_ms > 0 {
        Duration::from_millis(config.poll_interval_ms)
    } else {
        DEFAULT_POLL_INTERVAL
    };
    let checker = EventChecker::new(Arc::clone(&runtime.scheduler), poll_interval, cancel.clone());
    let checker_handle = tokio::spawn(checker.run());

    // All spoken output flows through the bus, including asynchronous timer
    // firings, so one printer task covers both paths.
    let mut speak_rx = runtime.bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(BusMessage { topic, payload }) = speak_rx.recv().await {
            if topic != TOPIC_SPEAK {
                continue;
            }
            match serde_json::from_str::<SpeakMessage>(&payload) {
                Ok(msg) => println!("{}", msg.text),
                Err(e) => warn!("malformed speak payload: {e}"),
            }
        }
    });

    // Structured intents and upstream recognition failures can also arrive
    // over the bus; route them to the same agent.
    let mut intent_rx = runtime.bus.subscribe();
    let router_agent = Arc::clone(&agent);
    let router = tokio::spawn(async move {
        while let Ok(BusMessage { topic, payload }) = intent_rx.recv().await {
            match topic.as_str() {
                TOPIC_INTENT => match serde_json::from_str::<IntentMessage>(&payload) {
                    Ok(msg) => {
                        router_agent.handle_intent_message(&msg).await;
                    }
                    Err(e) => warn!("malformed intent payload: {e}"),
                },
                TOPIC_UNRECOGNIZED => {
                    router_agent.handle_unrecognized();
                }
                _ => {}
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        if text == "выход" || text == "exit" {
                            break;
                        }
                        agent.handle_utterance(text, None).await;
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    cancel.cancel();
    let _ = checker_handle.await;
    printer.abort();
    router.abort();
    Ok(())
}

async fn run_once(config: &Config, text: &str) -> Result<()> {
    let runtime = build_runtime(config)?;
    runtime.scheduler.recover().await?;
    let response = runtime.agent.handle_utterance(text, None).await;
    println!("{response}");
    Ok(())
}

async fn add_contact(config: &Config, name: &str, phone_number: &str) -> Result<()> {
    let store = EventStore::open(&config.database_path())?;
    store.add_contact(name, phone_number).await?;
    println!("Контакт {name} сохранён");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    magus::logging::init_from_env();

    let cli = Cli::parse();
    let config = Config::load(cli.config.clone())?;
    std::fs::create_dir_all(&config.settings_dir)?;

    match &cli.command {
        Command::Run => run_repl(&config).await,
        Command::Say { text } => run_once(&config, &text.join(" ")).await,
        Command::AddContact { name, phone_number } => {
            add_contact(&config, name, phone_number).await
        }
    }
}
