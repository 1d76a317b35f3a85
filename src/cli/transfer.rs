//! Export and import of local state as JSON files

use std::error::Error;
use std::fs;
use std::path::Path;

use crate::core::config::path_display;
use crate::core::context::AppContext;
use crate::core::transfer::{export_json, import_json};

pub fn run_export(context: &AppContext, file: &Path) -> Result<(), Box<dyn Error>> {
    let orchestrator = context.build_orchestrator()?;
    let json = export_json(&orchestrator, context.mode())?;

    if file.as_os_str() == "-" {
        println!("{json}");
        return Ok(());
    }
    fs::write(file, json)?;
    println!(
        "✅ Exported {} messages to {}",
        orchestrator.history().len(),
        path_display(file)
    );
    Ok(())
}

/// Replaces history and diversity records, then remembers the imported
/// user id, default mode and quote settings in the config file.
pub fn run_import(context: &mut AppContext, file: &Path) -> Result<(), Box<dyn Error>> {
    let json = fs::read_to_string(file)?;
    let mut orchestrator = context.build_orchestrator()?;
    let bundle = import_json(&mut orchestrator, &json)?;

    let config = context.config_mut();
    config.user_id = Some(bundle.user_id.clone());
    config.default_mode = Some(bundle.settings.default_mode);
    config.quote.base = Some(bundle.settings.quote.base);
    config.quote.scale = Some(bundle.settings.quote.scale);
    config.quote.cap = Some(bundle.settings.quote.cap);
    context.save_config()?;

    println!(
        "✅ Imported {} messages for {} (format {})",
        bundle.chat_history.len(),
        bundle.user_id,
        bundle.version
    );
    Ok(())
}
