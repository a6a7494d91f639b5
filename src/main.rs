mod cli;
mod render;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use swe_core::{AgentBuilder, AgentEvent, ConsoleOperator, EventSink, ScopedEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug);

    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                return Ok(());
            }
            Commands::ShowConfig => {
                let mut config = swe_config::load(cli.config.as_deref())?;
                cli.apply(&mut config);
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                return Ok(());
            }
        }
    }

    let mut config = swe_config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    let verbosity = config.agent.verbosity;

    let task = match (&cli.task, &cli.resume) {
        (Some(t), _) => t.clone(),
        (None, Some(_)) => String::new(),
        (None, None) => read_task()?,
    };
    if task.trim().is_empty() && cli.resume.is_none() {
        anyhow::bail!("no task given");
    }

    let model: Arc<dyn swe_model::ModelProvider> = swe_model::from_config(&config.model)
        .context("configuring model provider")?
        .into();
    tracing::debug!(
        provider = model.name(),
        model = model.model_name(),
        working_dir = %config.working_dir().display(),
        "starting"
    );

    let (tx, mut rx) = mpsc::channel::<ScopedEvent>(256);
    let printer = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            if let AgentEvent::Flush(ack) = &ev.event {
                ack.notify_one();
                continue;
            }
            if let Some(line) = render::render(&ev, verbosity) {
                println!("{line}");
            }
        }
    });

    let events = EventSink::new(tx);
    let operator = ConsoleOperator::new().with_events(events.clone());
    let mut agent = AgentBuilder::new(Arc::new(config))
        .with_events(events)
        .build(model, Arc::new(operator));
    let outcome = agent.run(&task, cli.resume.as_deref()).await;

    // Closing every sender lets the printer drain and stop.
    drop(agent);
    let _ = printer.await;

    println!("\n{}", render::outcome_summary(&outcome));
    std::process::exit(if outcome.success { 0 } else { 1 });
}

fn read_task() -> anyhow::Result<String> {
    print!("Enter task description: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("reading task from stdin")?;
    Ok(line.trim().to_string())
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
