use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use switchyard_core::config::AppConfig;
use switchyard_core::event::EventBus;
use switchyard_core::traits::LlmClient;
use switchyard_core::types::{ConversationState, GraphEvent, Message, Role, SessionId};

use switchyard_agent::{GraphExecutor, Router, SessionRunner};

/// Used when no config file exists. Needs ANTHROPIC_API_KEY in the environment.
const FALLBACK_CONFIG: &str = r#"
[model]
provider = "anthropic"
model_id = "claude-sonnet-4-20250514"
api_key = "${ANTHROPIC_API_KEY}"

[[workers]]
name = "math_agent"
description = "Evaluates arithmetic expressions such as 2+2 or (3 * 4) / 6"
kind = "math"

[[workers]]
name = "general_agent"
description = "Answers general questions that need no other specialist"
kind = "llm"
"#;

#[derive(Parser)]
#[command(name = "switchyard", version, about = "LLM-routed multi-agent conversation graph")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Session ID (auto-generated if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL mode
    Repl,
    /// Run a single turn and exit
    Run {
        /// The user message; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Print the stored transcript of a session
    History {
        session: String,
    },
    /// List sessions in the checkpoint store
    Sessions,
    /// Delete a session's checkpoint
    Forget {
        session: String,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchyard=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "switchyard", &mut io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        eprintln!(
            "Warning: {} not found, using the built-in default (requires ANTHROPIC_API_KEY)",
            cli.config.display()
        );
        AppConfig::parse(FALLBACK_CONFIG)?
    };

    if let Some(Commands::Config) = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let event_bus = Arc::new(EventBus::default());
    let runner = build_runner(&config, event_bus.clone())?;

    let session_id = cli
        .session
        .as_deref()
        .map(SessionId::from_string)
        .unwrap_or_default();

    match cli.command {
        Some(Commands::Run { prompt }) => {
            let text = prompt.join(" ");
            let input = if text.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                text
            };
            run_once(&runner, &event_bus, &session_id, &input).await?;
        }
        Some(Commands::History { session }) => {
            let state = runner.history(&SessionId::from_string(&session)).await?;
            if state.is_empty() {
                println!("No history for session {}", session);
            } else {
                println!("Session {} (turn {})", session, state.turn());
                print_messages(state.messages());
            }
        }
        Some(Commands::Sessions) => {
            let sessions = runner.store().list().await?;
            if sessions.is_empty() {
                println!("No stored sessions.");
            }
            for sid in sessions {
                let state = runner.history(&sid).await?;
                let updated = state
                    .updated_at()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  turn {}  {} messages  {}",
                    sid,
                    state.turn(),
                    state.len(),
                    updated
                );
            }
        }
        Some(Commands::Forget { session }) => {
            if runner.store().delete(&SessionId::from_string(&session)).await? {
                println!("Deleted session {}", session);
            } else {
                println!("No such session: {}", session);
            }
        }
        Some(Commands::Config) | Some(Commands::Completions { .. }) => {
            unreachable!("handled before runner setup")
        }
        Some(Commands::Repl) | None => {
            run_repl(&runner, &event_bus, &session_id, &config).await?;
        }
    }

    Ok(())
}

/// Wire LLM clients, workers, the checkpoint store and the graph.
fn build_runner(config: &AppConfig, event_bus: Arc<EventBus>) -> anyhow::Result<SessionRunner> {
    let llm: Arc<dyn LlmClient> = Arc::from(switchyard_llm::create_resilient_client(
        &config.model,
        &config.fallback_models,
    )?);

    // The router gets its own client only when it has a model override
    let router_llm: Arc<dyn LlmClient> = match config.router.model {
        Some(ref model) => {
            Arc::from(switchyard_llm::create_resilient_client(model, &config.fallback_models)?)
        }
        None => llm.clone(),
    };

    let registry = switchyard_workers::build_registry(config, llm)?;
    if registry.is_empty() {
        anyhow::bail!("no workers configured; add at least one [[workers]] entry");
    }

    let store = switchyard_memory::open_store(config)?;
    let router = Router::new(
        router_llm,
        config.router_model().clone(),
        config.router.clone(),
    );

    info!(
        workers = %registry.names().join(", "),
        max_steps = config.graph.max_steps,
        model = %config.router_model().model_id,
        "Graph ready"
    );

    let executor = GraphExecutor::new(router, registry, config.graph.clone(), store)
        .with_event_bus(event_bus);
    Ok(SessionRunner::new(executor))
}

async fn run_once(
    runner: &SessionRunner,
    event_bus: &EventBus,
    session_id: &SessionId,
    input: &str,
) -> anyhow::Result<()> {
    let mut rx = event_bus.subscribe();

    let print_handle = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                GraphEvent::RouteDecided { raw, next, .. } => {
                    eprintln!("[route: {:?} -> {}]", raw, next);
                }
                GraphEvent::NodeFinished {
                    node,
                    appended,
                    elapsed_ms,
                    ..
                } if node != "router" => {
                    eprintln!("[{}: {} message(s), {}ms]", node, appended, elapsed_ms);
                }
                GraphEvent::CeilingReached { max_steps, .. } => {
                    eprintln!("[step limit {} reached]", max_steps);
                }
                GraphEvent::TurnComplete {
                    steps, termination, ..
                } => {
                    eprintln!("[done: {} steps, {:?}]", steps, termination);
                    break;
                }
                _ => {}
            }
        }
    });

    let turn = match runner.history(session_id).await {
        Ok(prior) => runner
            .run_turn(session_id, input)
            .await
            .map(|state| (state, prior.len())),
        Err(e) => Err(e),
    };

    match turn {
        Ok((state, prior)) => {
            // The printer stops on TurnComplete, which precedes the return
            print_handle.await.ok();
            print_turn(&state, prior);
            Ok(())
        }
        Err(e) => {
            print_handle.abort();
            error!(session_id = %session_id, error = %e, "Turn failed");
            Err(e.into())
        }
    }
}

async fn run_repl(
    runner: &SessionRunner,
    event_bus: &EventBus,
    session_id: &SessionId,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("Switchyard v{}", env!("CARGO_PKG_VERSION"));
    println!("Session: {}", session_id);
    println!("Workers: {}", runner.registry().names().join(", "));
    println!("Type /help for commands, /quit to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/session" => {
                println!("Session ID: {}", session_id);
                continue;
            }
            "/history" => {
                let state = runner.history(session_id).await?;
                print_messages(state.messages());
                continue;
            }
            "/workers" => {
                for (name, description) in runner.registry().menu() {
                    println!("  {:<20} {}", name, description);
                }
                continue;
            }
            "/status" => {
                let state = runner.history(session_id).await?;
                println!("Session: {}", session_id);
                println!(
                    "Router model: {} ({})",
                    config.router_model().model_id,
                    config.router_model().provider
                );
                println!("Step limit: {}", config.graph.max_steps);
                println!("Turns: {}  Messages: {}", state.turn(), state.len());
                continue;
            }
            "/help" => {
                println!("/history   show this session's transcript");
                println!("/workers   list registered workers");
                println!("/status    session and graph settings");
                println!("/session   show the session ID");
                println!("/quit      exit");
                continue;
            }
            cmd if cmd.starts_with('/') => {
                println!("Unknown command: {}. Type /help.", cmd);
                continue;
            }
            _ => {}
        }

        // A failed turn is reported and the session stays open
        if let Err(e) = run_once(runner, event_bus, session_id, input).await {
            eprintln!("[error: {}]", e);
        }
        println!();
    }

    Ok(())
}

/// Print everything appended after the user message of this turn.
fn print_turn(state: &ConversationState, prior: usize) {
    print_messages(state.messages_since(prior + 1));
}

fn print_messages(messages: &[Message]) {
    for msg in messages {
        match msg.role {
            Role::Worker => println!(
                "[{}] {}",
                msg.author.as_deref().unwrap_or("worker"),
                msg.content
            ),
            Role::System => println!("(system) {}", msg.content),
            Role::User => println!("you: {}", msg.content),
            Role::Assistant => println!("assistant: {}", msg.content),
        }
    }
}
