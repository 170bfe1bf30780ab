use std::io::{self, Write};
use std::sync::Arc;

use colored::Colorize;
use log::debug;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use super::args::Args;
use crate::{
    core::{normalize, Config, DispatchEvent, Dispatcher, SendMessage},
    providers::{LLMProvider, OpenAIProvider},
    tools::ToolDefinition,
};

const CLI_ASSISTANT_ID: &str = "cli";

pub async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(provider) = args.provider {
        config.update_provider(provider);
    }

    debug!(
        "[Config] provider: {:?}, model: {}",
        config.provider,
        args.model.as_deref().unwrap_or_else(|| config.get_model())
    );

    if args.check || args.list_models {
        return probe(&config, args.list_models).await;
    }

    let tools = args
        .tools
        .as_deref()
        .map(ToolDefinition::load_all)
        .transpose()?
        .unwrap_or_default();
    let mut message = SendMessage::new(args.query.unwrap_or_default(), CLI_ASSISTANT_ID);
    if let Some(model) = args.model {
        message = message.with_model(model);
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(Dispatcher::new(OpenAIProvider::new(), config, tx).with_tools(tools));
    let printer = tokio::spawn(print_events(UnboundedReceiverStream::new(rx)));
    let interrupt = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                dispatcher.cancel(CLI_ASSISTANT_ID);
            }
        }
    });

    let reply = dispatcher.send_message(message).await;

    // The printer finishes once every sender is gone.
    interrupt.abort();
    let _ = interrupt.await;
    drop(dispatcher);
    printer.await??;

    match reply {
        Ok(_) => Ok(()),
        Err(e) if e.is_aborted() => {
            eprintln!("{}", e.message.yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Handles `--check` and `--list-models`.
async fn probe(config: &Config, list_models: bool) -> anyhow::Result<()> {
    let mut provider = OpenAIProvider::new();
    provider
        .initialize(&config.connection_options())
        .map_err(|e| normalize(&e))?;

    if list_models {
        let models = provider.list_models().await.map_err(|e| normalize(&e))?;
        for model in models {
            match model.owned_by {
                Some(owner) => println!("{} {}", model.id, format!("({owner})").dimmed()),
                None => println!("{}", model.id),
            }
        }
    } else {
        provider
            .verify_connection()
            .await
            .map_err(|e| normalize(&e))?;
        println!(
            "{} {:?} is reachable with the configured key",
            "ok".green().bold(),
            config.provider
        );
    }

    Ok(())
}

async fn print_events(mut events: UnboundedReceiverStream<DispatchEvent>) -> io::Result<()> {
    let mut stdout = io::stdout();
    while let Some(event) = events.next().await {
        match event {
            DispatchEvent::AssistantChunk { chunk, .. } => {
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            DispatchEvent::ToolCall { tool_call, .. } => {
                writeln!(stdout, "\n{} {tool_call}", "tool call:".cyan().bold())?;
            }
            DispatchEvent::AssistantMessage { content, .. } => {
                if !content.is_empty() {
                    // Ensure final newline
                    writeln!(stdout)?;
                }
            }
            DispatchEvent::StateUpdate { state } => debug!("[Dispatch] state: {state:?}"),
            DispatchEvent::Error { .. } => {}
        }
    }
    Ok(())
}
