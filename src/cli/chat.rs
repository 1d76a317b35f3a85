//! Interactive line-based chat
//!
//! Each line is sent as one turn and the reply is streamed to stdout. Lines
//! starting with `/` are local commands. Ctrl+C interrupts the reply in
//! progress; at the prompt it ends the session.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::cli::model_list::print_models;
use crate::cli::say::render_event;
use crate::core::context::AppContext;
use crate::core::error::ChatError;
use crate::core::message::ChatMode;
use crate::core::session::ChatSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Mode(Option<ChatMode>),
    Model(Option<String>),
    Models,
    Clear,
    Help,
    Quit,
}

/// Parse a slash command. `None` means the line is a message.
pub fn parse_chat_command(line: &str) -> Option<Result<ChatCommand, String>> {
    let rest = line.trim().strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let arg = (!arg.is_empty()).then_some(arg);

    let command = match name.to_lowercase().as_str() {
        "mode" => match arg {
            None => Ok(ChatCommand::Mode(None)),
            Some(value) => value.parse().map(|mode| ChatCommand::Mode(Some(mode))),
        },
        "model" => Ok(ChatCommand::Model(arg.map(str::to_string))),
        "models" => Ok(ChatCommand::Models),
        "clear" => Ok(ChatCommand::Clear),
        "help" | "?" => Ok(ChatCommand::Help),
        "quit" | "exit" | "q" => Ok(ChatCommand::Quit),
        other => Err(format!("Unknown command: /{other}. Type /help for a list.")),
    };
    Some(command)
}

const HELP: &str = "\
Commands:
  /mode [smart|comfort|praise]   Show or change the reply mode
  /model [id]                    Show or change the model
  /models                        List the provider's models
  /clear                         Forget the conversation history
  /quit                          Leave the chat
Ctrl+C interrupts a reply; at the prompt it quits.";

pub async fn run_chat(context: &AppContext) -> Result<(), Box<dyn Error>> {
    let mut session = ChatSession::new(context.build_orchestrator()?);
    let mut mode = context.mode();

    println!("🌿 Solace · {} mode · /help for commands", mode.display_name());
    match session.orchestrator().provider() {
        None => eprintln!("⚠️ No provider selected; pass -p to get replies."),
        Some(provider) if provider.selected_model().is_none() => {
            eprintln!("⚠️ No model selected; use /models and /model <id>.")
        }
        Some(_) => {}
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("› ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_chat_command(&line) {
            Some(Ok(ChatCommand::Quit)) => break,
            Some(Ok(command)) => run_command(&mut session, &mut mode, command).await,
            Some(Err(message)) => eprintln!("{message}"),
            None => send_turn(&mut session, &line, mode).await?,
        }
    }
    Ok(())
}

async fn send_turn(session: &mut ChatSession, text: &str, mode: ChatMode) -> Result<(), Box<dyn Error>> {
    let interrupt = CancellationToken::new();
    let watcher = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        })
    };

    let result = session
        .send_until(text, mode, &interrupt, |event, _| render_event(event))
        .await;
    watcher.abort();

    if interrupt.is_cancelled() {
        println!();
        eprintln!("⏹ Interrupted.");
    }
    match result {
        Ok(()) => {}
        Err(err) if err.is_silent() => {}
        Err(err) => eprintln!("{}", err.user_message()),
    }
    if let Some(err) = session.orchestrator_mut().take_notification() {
        eprintln!("{}", err.user_message());
    }
    Ok(())
}

async fn run_command(session: &mut ChatSession, mode: &mut ChatMode, command: ChatCommand) {
    let orchestrator = session.orchestrator_mut();
    match command {
        ChatCommand::Mode(None) => println!("Mode: {} ({})", mode.display_name(), mode.as_str()),
        ChatCommand::Mode(Some(next)) => {
            *mode = next;
            println!("✅ Mode set to {} ({})", next.display_name(), next.as_str());
        }
        ChatCommand::Model(None) => match orchestrator.provider().and_then(|p| p.selected_model()) {
            Some(model) => println!("Model: {model}"),
            None => println!("No model selected."),
        },
        ChatCommand::Model(Some(model)) => match orchestrator.switch_model(&model) {
            Ok(()) => println!("✅ Model set to {model}"),
            Err(err) => eprintln!("{}", err.user_message()),
        },
        ChatCommand::Models => {
            let Some(provider) = orchestrator.provider().cloned() else {
                eprintln!("{}", ChatError::configuration("no provider configured").user_message());
                return;
            };
            match provider.list_models().await {
                Ok(models) => print_models(&models),
                Err(err) => eprintln!("{}", err.user_message()),
            }
        }
        ChatCommand::Clear => match orchestrator.clear_history() {
            Ok(()) => println!("✅ History cleared"),
            Err(err) => eprintln!("{}", err.user_message()),
        },
        ChatCommand::Help => println!("{HELP}"),
        ChatCommand::Quit => {}
    }
}
