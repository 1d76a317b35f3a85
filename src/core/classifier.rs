//! Emotion classification of user messages.
//!
//! With a provider configured the message is classified by the model through
//! a constrained JSON prompt. Anything that goes wrong on that path, from
//! transport errors to unusable JSON, falls back to the keyword heuristic, so
//! [`EmotionClassifier::analyze`] always produces an assessment.

use std::fmt::Write as _;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::ChatMessage;
use crate::core::emotion::{heuristic_assessment, Emotion, EmotionAssessment, Need};
use crate::core::providers::{MessageRequest, ProviderHandle};

const CLASSIFIER_TEMPERATURE: f32 = 0.1;
const CLASSIFIER_MAX_TOKENS: u32 = 300;
const REASONING_TAGS: &[&str] = &["think", "thinking", "reasoning"];

#[derive(Debug, Clone, Default)]
pub struct EmotionClassifier {
    provider: Option<ProviderHandle>,
}

impl EmotionClassifier {
    /// Classifier that only uses the keyword heuristic.
    pub fn heuristic() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: ProviderHandle) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    pub fn set_provider(&mut self, provider: Option<ProviderHandle>) {
        self.provider = provider;
    }

    pub fn uses_model(&self) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|provider| provider.selected_model().is_some())
    }

    pub async fn analyze(&self, text: &str) -> EmotionAssessment {
        let Some(provider) = self.provider.as_ref().filter(|p| p.selected_model().is_some())
        else {
            return heuristic_assessment(text);
        };

        let request = MessageRequest::new(
            Some(classification_prompt()),
            vec![ChatMessage::new("user", text)],
        )
        .with_temperature(CLASSIFIER_TEMPERATURE)
        .with_max_tokens(CLASSIFIER_MAX_TOKENS);

        match provider.send_message(&request).await {
            Ok(response) => match parse_assessment(&response.content) {
                Some(assessment) => {
                    debug!(
                        emotion = assessment.primary_emotion().as_str(),
                        intensity = assessment.intensity(),
                        "model classification"
                    );
                    assessment
                }
                None => {
                    warn!("classifier reply was not usable JSON; using keyword heuristic");
                    heuristic_assessment(text)
                }
            },
            Err(err) => {
                warn!(error = %err, "classifier request failed; using keyword heuristic");
                heuristic_assessment(text)
            }
        }
    }
}

/// System prompt listing the closed vocabularies.
pub fn classification_prompt() -> String {
    let emotions = Emotion::ALL
        .iter()
        .map(|emotion| emotion.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let needs = Need::ALL
        .iter()
        .map(|need| need.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = String::from(
        "你是一个情绪分析器。分析用户消息中的情绪，只输出一个 JSON 对象，不要输出其他内容。\n",
    );
    let _ = writeln!(prompt, "primaryEmotion 必须是以下之一：{emotions}");
    let _ = writeln!(prompt, "needs 必须是以下之一：{needs}");
    prompt.push_str(
        "intensity 和 confidence 是 0 到 1 之间的小数，keywords 是触发判断的原文词语数组。\n\
         格式：{\"primaryEmotion\":\"sad\",\"intensity\":0.7,\"needs\":\"comfort\",\"confidence\":0.8,\"keywords\":[\"难过\"]}",
    );
    prompt
}

#[derive(Deserialize)]
struct ModelAssessment {
    #[serde(alias = "primaryEmotion", alias = "emotion")]
    primary_emotion: String,
    #[serde(default)]
    intensity: Option<f32>,
    #[serde(default, alias = "need")]
    needs: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Turn a model reply into an assessment, or `None` when it cannot be used.
///
/// Unknown emotions reject the reply; an unknown need becomes `mixed`.
pub fn parse_assessment(reply: &str) -> Option<EmotionAssessment> {
    let json = extract_json_object(reply)?;
    let raw: ModelAssessment = serde_json::from_str(&json).ok()?;

    let emotion = Emotion::from_token(&raw.primary_emotion)?;
    let needs = raw
        .needs
        .as_deref()
        .and_then(Need::from_token)
        .unwrap_or(Need::Mixed);
    let keywords = raw
        .keywords
        .into_iter()
        .map(|keyword| keyword.trim().to_string())
        .filter(|keyword| !keyword.is_empty());

    Some(EmotionAssessment::new(
        emotion,
        raw.intensity.unwrap_or(0.5),
        needs,
        raw.confidence.unwrap_or(0.5),
        keywords,
    ))
}

/// Strip reasoning blocks and code fences, then take the outermost `{...}`.
pub fn extract_json_object(reply: &str) -> Option<String> {
    let mut cleaned = reply.to_string();
    for tag in REASONING_TAGS {
        cleaned = strip_tagged_blocks(&cleaned, tag);
    }
    let cleaned: String = cleaned
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    (end > start).then(|| cleaned[start..=end].to_string())
}

/// Remove every `<tag>...</tag>` block. An unclosed block runs to the end.
fn strip_tagged_blocks(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let lower = text.to_ascii_lowercase();

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(offset) = lower[cursor..].find(&open) {
        let start = cursor + offset;
        result.push_str(&text[cursor..start]);
        match lower[start..].find(&close) {
            Some(close_offset) => cursor = start + close_offset + close.len(),
            None => return result,
        }
    }
    result.push_str(&text[cursor..]);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::error::ChatError;
    use crate::core::providers::testing::{handle_for, ScriptedAdapter};

    #[test]
    fn extracts_json_after_reasoning_and_fences() {
        let reply = "<think>用户说难过 {not this}</think>\n```json\n{\"primaryEmotion\":\"sad\"}\n```";
        assert_eq!(
            extract_json_object(reply).as_deref(),
            Some("{\"primaryEmotion\":\"sad\"}")
        );
    }

    #[test]
    fn unclosed_reasoning_block_hides_the_rest() {
        assert_eq!(extract_json_object("<Thinking> {\"a\":1}"), None);
    }

    #[test]
    fn parses_chinese_tokens_and_clamps_numbers() {
        let reply = r#"分析结果：{"primaryEmotion":"难过","intensity":1.7,"needs":"安慰","confidence":-2,"keywords":["难过"," "]}"#;
        let assessment = parse_assessment(reply).expect("assessment");
        assert_eq!(assessment.primary_emotion(), Emotion::Sad);
        assert_eq!(assessment.needs(), Need::Comfort);
        assert_eq!(assessment.intensity(), 1.0);
        assert_eq!(assessment.confidence(), 0.0);
        assert_eq!(assessment.keywords().len(), 1);
    }

    #[test]
    fn accepts_snake_case_keys_and_unknown_need() {
        let reply = r#"{"primary_emotion":"Proud","intensity":0.8,"needs":"applause"}"#;
        let assessment = parse_assessment(reply).expect("assessment");
        assert_eq!(assessment.primary_emotion(), Emotion::Proud);
        assert_eq!(assessment.needs(), Need::Mixed);
    }

    #[test]
    fn unknown_emotion_rejects_reply() {
        assert!(parse_assessment(r#"{"primaryEmotion":"melancholic"}"#).is_none());
        assert!(parse_assessment("no json here").is_none());
    }

    #[test]
    fn prompt_lists_both_vocabularies() {
        let prompt = classification_prompt();
        for emotion in Emotion::ALL {
            assert!(prompt.contains(emotion.as_str()));
        }
        for need in Need::ALL {
            assert!(prompt.contains(need.as_str()));
        }
    }

    #[tokio::test]
    async fn without_provider_uses_heuristic() {
        let assessment = EmotionClassifier::heuristic().analyze("我今天很难过").await;
        assert_eq!(assessment.primary_emotion(), Emotion::Sad);
        assert_eq!(assessment.needs(), Need::Comfort);
    }

    #[tokio::test]
    async fn model_reply_is_used_when_valid() {
        let adapter = Arc::new(ScriptedAdapter::replying(Ok(
            r#"{"primaryEmotion":"grateful","intensity":0.4,"needs":"validation","confidence":0.9}"#
                .to_string(),
        )));
        let classifier = EmotionClassifier::with_provider(handle_for(adapter.clone()));
        let assessment = classifier.analyze("谢谢你").await;
        assert_eq!(assessment.primary_emotion(), Emotion::Grateful);

        let requests = adapter.recorded();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.is_some());
        assert_eq!(requests[0].messages[0].content, "谢谢你");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_heuristic() {
        let adapter = Arc::new(ScriptedAdapter::replying(Err(ChatError::network(
            Some(500),
            "boom",
        ))));
        let classifier = EmotionClassifier::with_provider(handle_for(adapter));
        let assessment = classifier.analyze("我今天很难过").await;
        assert_eq!(assessment.primary_emotion(), Emotion::Sad);
        assert_eq!(assessment.confidence(), 0.6);
    }
}
