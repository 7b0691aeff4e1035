pub mod agent_engine;
pub mod apps;
pub mod cli;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod perception;
pub mod prompts;

#[cfg(test)]
pub(crate) mod testing;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::engine::AgentEngine;
use crate::apps::{AppRegistry, Platform};
use crate::cli::Args;
use crate::config::AppConfig;
use crate::errors::DeskPilotResult;
use crate::executor::dispatcher::ActionDispatcher;
use crate::executor::input::EnigoInput;
use crate::executor::safety::{AutoApprove, ConsoleHooks, OperatorHooks};
use crate::llm::client::ModelClient;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;
use crate::perception::screenshot::XcapScreen;

/// CLI entry point. Exit code 0 only when the model finished the task.
pub async fn run() -> ExitCode {
    // Before parsing so `.env` values reach the clap `env` fallbacks.
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "info" })
            }),
        )
        .init();
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), ".env loaded"),
        Err(e) => tracing::debug!(error = %e, "no .env loaded"),
    }

    let mut config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config; using defaults");
            AppConfig::default()
        }
    };
    args.apply(&mut config);
    let apps = AppRegistry::with_extra(&config.apps);

    if args.list_apps {
        println!("Supported applications:");
        for app in apps.list() {
            println!("  - {app}");
        }
        return ExitCode::SUCCESS;
    }

    if args.init_config {
        return match config::save_config(&config) {
            Ok(path) => {
                println!("Configuration written to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to write config");
                ExitCode::FAILURE
            }
        };
    }

    let Some(task) = args.task() else {
        eprintln!("Error: please provide a task description.");
        eprintln!("Usage: deskpilot \"your task here\"");
        return ExitCode::FAILURE;
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let engine = match build_engine(&config, apps, cancel) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "failed to start agent");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        model = %config.model.model,
        base_url = %config.model.base_url,
        lang = ?config.lang,
        max_steps = config.max_steps,
        "agent ready"
    );

    if engine.run(&task).await.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// First Ctrl+C stops the loop at the next checkpoint; a second one exits immediately.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("interrupt received, stopping after the current action");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn build_engine(
    config: &AppConfig,
    apps: AppRegistry,
    cancel: CancellationToken,
) -> DeskPilotResult<AgentEngine> {
    let platform = Platform::current();
    let provider = Arc::new(OpenAiCompatibleProvider::new(&config.model)?);
    let model = ModelClient::new(provider, CallConfig::from(&config.model));

    let hooks: Arc<dyn OperatorHooks> = if config.safety.confirm_sensitive {
        Arc::new(ConsoleHooks)
    } else {
        Arc::new(AutoApprove::new(ConsoleHooks))
    };
    let dispatcher = ActionDispatcher::new(
        Arc::new(EnigoInput::new(platform, &config.timing)),
        hooks,
        apps.clone(),
        platform,
        config.timing.clone(),
    );
    let screen = Arc::new(XcapScreen::new(apps));

    Ok(AgentEngine::new(
        config.agent_config(),
        screen,
        model,
        dispatcher,
        cancel,
    ))
}
