//! Model listing functionality
//!
//! This module handles listing available models from the selected provider.

use std::error::Error;

use crate::api::models::ModelSummary;
use crate::core::context::AppContext;
use crate::core::providers::ProviderHandle;

pub async fn list_models(context: &AppContext) -> Result<(), Box<dyn Error>> {
    let provider = require_provider(context)?;

    println!("🤖 Available Models for {}", provider.kind().display_name());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if let Some(model) = provider.selected_model() {
        println!("🎯 Selected model: {model}");
        println!();
    }

    let models = provider.list_models().await.map_err(|err| err.user_message())?;
    print_models(&models);
    Ok(())
}

/// The provider chosen by flags or config, or an explanatory error.
pub(crate) fn require_provider(context: &AppContext) -> Result<ProviderHandle, Box<dyn Error>> {
    context.build_provider()?.ok_or_else(|| {
        "❌ No provider selected\n\nPlease either:\n1. Pass -p openai|anthropic|openai-compatible, or\n2. Set default_provider in the config file"
            .into()
    })
}

pub(crate) fn print_models(models: &[ModelSummary]) {
    if models.is_empty() {
        println!("No models found for this provider.");
        return;
    }

    println!("Found {} models (sorted newest first):", models.len());
    println!();
    for model in models {
        println!("  • {}", model.id);
        if let Some(display_name) = &model.display_name {
            if !display_name.is_empty() && display_name != &model.id {
                println!("    Name: {display_name}");
            }
        }
        if let Some(owned_by) = &model.owned_by {
            if !owned_by.is_empty() && owned_by != "system" {
                println!("    Owner: {owned_by}");
            }
        }
        if let Some(created) = &model.created {
            println!("    Created: {created}");
        }
        println!();
    }
}
