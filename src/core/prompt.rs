//! Prompt assembly for one turn.

use std::fmt::Write as _;

use crate::core::diversity::DiversityTracker;
use crate::core::emotion::EmotionAssessment;
use crate::core::message::{ChatMode, ConversationTurn};
use crate::core::quotes::{format_quote, QuoteCategory, QuotePolicy, QuoteStore};
use crate::utils::random::RandomSource;
use crate::utils::text::truncate_chars;

pub const DEFAULT_USER_ID: &str = "default_user";
pub const HISTORY_CONTEXT_TURNS: usize = 6;
pub const HISTORY_SNIPPET_CHARS: usize = 50;

const BASE_PERSONA: &str = "你是「Solace」，一位温暖、真诚、善于倾听的聊天伙伴。\
你尊重用户的感受，不评判、不说教，用自然口语和用户交流。";

const SMART_BLOCK: &str = "【当前模式：智能】\n\
根据用户的状态灵活回应：低落时先共情再陪伴，开心时真诚地分享喜悦，\
迷茫时帮助理清思路，必要时给出一两条具体可行的小建议。";

const PRAISE_BLOCK: &str = "【当前模式：夸夸】\n\
从用户的话里找出具体的闪光点并真诚地夸奖，夸得具体、有细节，\
避免空洞的套话，让用户感受到被看见和被认可。";

const COMFORT_BLOCK: &str = "【当前模式：安慰】\n\
先接住用户的情绪，表达理解和陪伴；不要急着讲道理或给建议，\
不要否定用户的感受，语气温柔、节奏放慢。";

const CLOSING_CONSTRAINT: &str = "【输出要求】\n\
只用纯文本回复，不使用 Markdown、列表符号或标题；\
回复控制在 200 字以内，像朋友聊天一样自然。";

/// Builds the system prompt and the user message for a turn.
///
/// Borrows the diversity tracker for hints and the quote store for
/// injection; quote draws go through `random`.
pub struct PromptAssembler<'a> {
    diversity: &'a DiversityTracker,
    quotes: &'a mut QuoteStore,
    policy: QuotePolicy,
    random: &'a mut dyn RandomSource,
}

impl<'a> PromptAssembler<'a> {
    pub fn new(
        diversity: &'a DiversityTracker,
        quotes: &'a mut QuoteStore,
        policy: QuotePolicy,
        random: &'a mut dyn RandomSource,
    ) -> Self {
        Self {
            diversity,
            quotes,
            policy,
            random,
        }
    }

    pub fn build_system_prompt(
        &self,
        mode: ChatMode,
        assessment: Option<&EmotionAssessment>,
        user_id: Option<&str>,
    ) -> String {
        let mut sections = vec![BASE_PERSONA.to_string(), mode_block(mode).to_string()];

        if let Some(assessment) = assessment {
            sections.push(emotion_block(assessment));
        }

        let hints = self
            .diversity
            .get_diversity_instructions(user_id.unwrap_or(DEFAULT_USER_ID));
        if !hints.is_empty() {
            sections.push(hints);
        }

        sections.push(CLOSING_CONSTRAINT.to_string());
        sections.join("\n\n")
    }

    /// Condensed recent history, the message itself, and maybe a quote.
    pub fn build_user_message(
        &mut self,
        text: &str,
        history: &[ConversationTurn],
        assessment: Option<&EmotionAssessment>,
        user_id: Option<&str>,
        mode: Option<ChatMode>,
    ) -> String {
        let mut message = String::new();

        let recent: Vec<&ConversationTurn> = history
            .iter()
            .filter(|turn| !turn.is_error && !turn.content.trim().is_empty())
            .collect();
        let recent = &recent[recent.len().saturating_sub(HISTORY_CONTEXT_TURNS)..];
        if !recent.is_empty() {
            message.push_str("【最近对话】\n");
            for turn in recent {
                let _ = writeln!(
                    message,
                    "{}：{}",
                    turn.role.speaker_label(),
                    truncate_chars(&turn.content, HISTORY_SNIPPET_CHARS)
                );
            }
            message.push_str("\n【当前消息】\n");
        }
        message.push_str(text.trim());

        let mode = mode.unwrap_or_default();
        let intensity = assessment.map(EmotionAssessment::intensity).unwrap_or(0.0);
        let probability = self.policy.probability(intensity) as f64;
        if self.random.next_unit() < probability {
            let category = QuoteCategory::select(assessment, mode);
            let user_id = user_id.unwrap_or(DEFAULT_USER_ID);
            if let Some(quote) = self.quotes.pick(category, user_id, &mut *self.random) {
                let _ = write!(
                    message,
                    "\n\n（回复时可以自然地化用这句话，不必生硬引用：{}）",
                    format_quote(quote)
                );
            }
        }

        message
    }
}

fn mode_block(mode: ChatMode) -> &'static str {
    match mode {
        ChatMode::Smart => SMART_BLOCK,
        ChatMode::Praise => PRAISE_BLOCK,
        ChatMode::Comfort => COMFORT_BLOCK,
    }
}

fn emotion_block(assessment: &EmotionAssessment) -> String {
    let mut block = String::from("【情绪感知】\n");
    let _ = write!(
        block,
        "用户当前的主要情绪是「{}」，强度{}，更需要「{}」。",
        assessment.primary_emotion().label_zh(),
        assessment.intensity_band().label_zh(),
        assessment.needs().label_zh(),
    );
    if !assessment.keywords().is_empty() {
        let keywords: Vec<&str> = assessment.keywords().iter().map(String::as_str).collect();
        let _ = write!(block, "\n触发词：{}", keywords.join("、"));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emotion::{Emotion, Need};
    use crate::core::message::TurnRole;
    use crate::utils::random::ScriptedRandom;

    fn sad(intensity: f32) -> EmotionAssessment {
        EmotionAssessment::new(
            Emotion::Sad,
            intensity,
            Need::Comfort,
            0.8,
            vec!["难过".to_string()],
        )
    }

    #[test]
    fn system_prompt_orders_persona_mode_emotion_and_constraint() {
        let diversity = DiversityTracker::new();
        let mut quotes = QuoteStore::new();
        let mut random = ScriptedRandom::new(vec![0.99]);
        let assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);

        let prompt = assembler.build_system_prompt(ChatMode::Comfort, Some(&sad(0.7)), None);
        let persona = prompt.find("Solace").expect("persona");
        let mode = prompt.find("当前模式：安慰").expect("mode");
        let emotion = prompt.find("「难过」，强度明显").expect("emotion");
        let closing = prompt.find("【输出要求】").expect("closing");
        assert!(persona < mode && mode < emotion && emotion < closing);
        assert!(prompt.contains("触发词：难过"));
        assert!(!prompt.contains("【表达多样性】"));
    }

    #[test]
    fn system_prompt_includes_diversity_hints_for_the_user() {
        let mut diversity = DiversityTracker::new();
        diversity.analyze_and_store("抱抱你，其实你已经很努力了。", "u1");
        let mut quotes = QuoteStore::new();
        let mut random = ScriptedRandom::new(vec![0.99]);
        let assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);

        assert!(assembler
            .build_system_prompt(ChatMode::Smart, None, Some("u1"))
            .contains("【表达多样性】"));
        assert!(!assembler
            .build_system_prompt(ChatMode::Smart, None, Some("u2"))
            .contains("【表达多样性】"));
    }

    #[test]
    fn user_message_condenses_last_six_turns() {
        let history: Vec<ConversationTurn> = (0..8)
            .map(|i| {
                let role = if i % 2 == 0 { TurnRole::User } else { TurnRole::Assistant };
                ConversationTurn::new(format!("t{i}"), role, format!("第{i}句{}", "长".repeat(60)))
            })
            .collect();
        let diversity = DiversityTracker::new();
        let mut quotes = QuoteStore::new();
        let mut random = ScriptedRandom::new(vec![0.99]);
        let mut assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);

        let message = assembler.build_user_message("现在呢", &history, None, None, None);
        assert!(!message.contains("第0句"));
        assert!(!message.contains("第1句"));
        assert!(message.contains("用户：第2句"));
        assert!(message.contains("助手：第7句"));
        assert!(message.ends_with("【当前消息】\n现在呢"));
        let longest = message
            .lines()
            .filter(|line| line.contains('句'))
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        // Speaker label, full-width colon, 50 chars and the ellipsis.
        assert_eq!(longest, 2 + 1 + HISTORY_SNIPPET_CHARS + 1);
    }

    #[test]
    fn failed_replies_are_left_out_of_the_context() {
        let mut failed = ConversationTurn::new("t1", TurnRole::Assistant, "⚠️ 请求超时，请稍后再试");
        failed.is_error = true;
        let history = vec![ConversationTurn::new("t0", TurnRole::User, "在吗"), failed];
        let diversity = DiversityTracker::new();
        let mut quotes = QuoteStore::new();
        let mut random = ScriptedRandom::new(vec![0.99]);
        let mut assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);

        let message = assembler.build_user_message("还在吗", &history, None, None, None);
        assert!(message.contains("用户：在吗"));
        assert!(!message.contains("请求超时"));
        assert!(!message.contains("助手："));
    }

    #[test]
    fn empty_history_sends_text_alone() {
        let diversity = DiversityTracker::new();
        let mut quotes = QuoteStore::new();
        let mut random = ScriptedRandom::new(vec![0.99]);
        let mut assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);
        assert_eq!(
            assembler.build_user_message("  你好 ", &[], None, None, Some(ChatMode::Praise)),
            "你好"
        );
    }

    #[test]
    fn quote_follows_need_when_draw_is_below_probability() {
        let diversity = DiversityTracker::new();
        let mut quotes = QuoteStore::new();
        // 0.3 < 0.15 + 0.7 * 0.35; second draw picks the first candidate.
        let mut random = ScriptedRandom::new(vec![0.3, 0.0]);
        let mut assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);

        let message =
            assembler.build_user_message("我好难过", &[], Some(&sad(0.7)), Some("u1"), None);
        let comfort_quote = QuoteStore::by_category(QuoteCategory::Comfort)
            .next()
            .expect("quote");
        assert!(message.contains(comfort_quote.text));
        assert_eq!(quotes.recent_for("u1"), vec![comfort_quote.id]);
    }

    #[test]
    fn without_assessment_probability_uses_zero_intensity() {
        let diversity = DiversityTracker::new();
        let mut quotes = QuoteStore::new();
        // 0.2 is above the base probability of 0.15.
        let mut random = ScriptedRandom::new(vec![0.2]);
        let mut assembler =
            PromptAssembler::new(&diversity, &mut quotes, QuotePolicy::default(), &mut random);
        let message =
            assembler.build_user_message("随便聊聊", &[], None, None, Some(ChatMode::Praise));
        assert_eq!(message, "随便聊聊");
    }
}
