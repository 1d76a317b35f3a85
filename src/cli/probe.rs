//! Connection test and standalone emotion analysis

use std::error::Error;

use crate::cli::model_list::require_provider;
use crate::core::classifier::EmotionClassifier;
use crate::core::context::AppContext;
use crate::core::emotion::{recommend_mode, EmotionAssessment};

pub async fn run_test(context: &AppContext) -> Result<(), Box<dyn Error>> {
    let mut provider = require_provider(context)?;
    let name = provider.kind().display_name();
    let base_url = provider.session().base_url.clone();

    let report = provider.test_connection().await;
    if report.success {
        println!("✅ {name} is reachable at {base_url} ({} ms)", report.latency_ms);
        Ok(())
    } else {
        let reason = report.error.unwrap_or_else(|| "unknown error".to_string());
        Err(format!("❌ {name} at {base_url} failed after {} ms: {reason}", report.latency_ms).into())
    }
}

pub async fn run_analyze(context: &AppContext, text: &str) -> Result<(), Box<dyn Error>> {
    if text.trim().is_empty() {
        return Err("Usage: solace analyze <message>".into());
    }

    let classifier = match context.build_provider()? {
        Some(provider) => EmotionClassifier::with_provider(provider),
        None => EmotionClassifier::heuristic(),
    };
    let strategy = if classifier.uses_model() { "model" } else { "keywords" };
    let assessment = classifier.analyze(text).await;
    print_assessment(&assessment, strategy);
    Ok(())
}

fn print_assessment(assessment: &EmotionAssessment, strategy: &str) {
    let emotion = assessment.primary_emotion();
    let needs = assessment.needs();
    println!("💭 Emotion analysis ({strategy})");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Emotion:     {} ({})", emotion.label_zh(), emotion.as_str());
    println!(
        "  Intensity:   {:.2} ({})",
        assessment.intensity(),
        assessment.intensity_band().label_zh()
    );
    println!("  Needs:       {} ({})", needs.label_zh(), needs.as_str());
    println!("  Confidence:  {:.2}", assessment.confidence());
    if !assessment.keywords().is_empty() {
        let keywords: Vec<&str> = assessment.keywords().iter().map(String::as_str).collect();
        println!("  Keywords:    {}", keywords.join("、"));
    }
    let mode = recommend_mode(assessment);
    println!("  Reply mode:  {} ({})", mode.display_name(), mode.as_str());
}
