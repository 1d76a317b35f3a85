//! Single-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::core::context::AppContext;
use crate::core::orchestrator::TurnEvent;
use crate::core::session::ChatSession;

pub async fn run_say(context: &AppContext, text: &str) -> Result<(), Box<dyn Error>> {
    if text.trim().is_empty() {
        return Err("Usage: solace say <message>".into());
    }

    let mut session = ChatSession::new(context.build_orchestrator()?);
    session
        .send(text, context.mode(), |event, _| render_event(event))
        .await?;

    if let Some(err) = session.orchestrator_mut().take_notification() {
        return Err(err.user_message().into());
    }
    Ok(())
}

/// Print one turn event as it arrives. Shared with the interactive chat.
pub(crate) fn render_event(event: &TurnEvent) {
    match event {
        TurnEvent::Classified(assessment) => {
            eprintln!(
                "💭 {} · {}",
                assessment.primary_emotion().label_zh(),
                assessment.needs().label_zh()
            );
        }
        TurnEvent::Chunk(delta) => {
            print!("{delta}");
            let _ = io::stdout().flush();
        }
        TurnEvent::Done => println!(),
        TurnEvent::Metadata(_) | TurnEvent::Failed(_) => {}
    }
}
