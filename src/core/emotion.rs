//! Emotion vocabulary and the keyword heuristic.
//!
//! Emotions and needs are closed enums. Both English and Chinese tokens are
//! accepted through explicit lookup tables so that classifier output in either
//! language lands on the same internal value.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::message::ChatMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Happy,
    Excited,
    Grateful,
    Proud,
    Hopeful,
    Loved,
    Calm,
    Neutral,
    Confused,
    Tired,
    Sad,
    Lonely,
    Anxious,
    Stressed,
    Scared,
    Angry,
    Frustrated,
    Disappointed,
    Hurt,
    Guilty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valence {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Need {
    Comfort,
    Praise,
    Guidance,
    Listening,
    Validation,
    Care,
    Mixed,
}

const EMOTION_TOKENS: &[(Emotion, &str, &[&str])] = &[
    (Emotion::Happy, "开心", &["happy", "joy", "开心", "高兴", "快乐", "喜悦"]),
    (Emotion::Excited, "兴奋", &["excited", "兴奋", "激动"]),
    (Emotion::Grateful, "感激", &["grateful", "thankful", "感激", "感恩", "感谢"]),
    (Emotion::Proud, "自豪", &["proud", "自豪", "骄傲", "成就感"]),
    (Emotion::Hopeful, "期待", &["hopeful", "期待", "希望", "憧憬"]),
    (Emotion::Loved, "被爱", &["loved", "被爱", "幸福", "温暖"]),
    (Emotion::Calm, "平静", &["calm", "peaceful", "平静", "放松", "安心"]),
    (Emotion::Neutral, "平常", &["neutral", "平常", "中性", "一般"]),
    (Emotion::Confused, "迷茫", &["confused", "lost", "迷茫", "困惑", "纠结"]),
    (Emotion::Tired, "疲惫", &["tired", "exhausted", "疲惫", "累", "疲倦"]),
    (Emotion::Sad, "难过", &["sad", "sadness", "难过", "伤心", "悲伤", "沮丧"]),
    (Emotion::Lonely, "孤独", &["lonely", "孤独", "寂寞", "孤单"]),
    (Emotion::Anxious, "焦虑", &["anxious", "worried", "焦虑", "担心", "不安", "紧张"]),
    (Emotion::Stressed, "压力大", &["stressed", "压力", "压力大", "崩溃"]),
    (Emotion::Scared, "害怕", &["scared", "afraid", "fear", "害怕", "恐惧"]),
    (Emotion::Angry, "生气", &["angry", "anger", "生气", "愤怒", "恼火"]),
    (Emotion::Frustrated, "挫败", &["frustrated", "挫败", "烦躁", "郁闷"]),
    (Emotion::Disappointed, "失望", &["disappointed", "失望", "遗憾"]),
    (Emotion::Hurt, "受伤", &["hurt", "受伤", "委屈", "心痛"]),
    (Emotion::Guilty, "内疚", &["guilty", "内疚", "愧疚", "自责"]),
];

const NEED_TOKENS: &[(Need, &str, &[&str])] = &[
    (Need::Comfort, "安慰", &["comfort", "安慰", "抚慰"]),
    (Need::Praise, "夸奖", &["praise", "夸奖", "赞美", "表扬", "认可"]),
    (Need::Guidance, "建议", &["guidance", "advice", "建议", "指导", "引导"]),
    (Need::Listening, "倾听", &["listening", "listen", "倾听", "聆听"]),
    (Need::Validation, "肯定", &["validation", "肯定", "理解", "共情"]),
    (Need::Care, "关心", &["care", "关心", "关怀", "陪伴"]),
    (Need::Mixed, "综合", &["mixed", "综合", "混合", "其他"]),
];

impl Emotion {
    pub const ALL: [Emotion; 20] = [
        Emotion::Happy,
        Emotion::Excited,
        Emotion::Grateful,
        Emotion::Proud,
        Emotion::Hopeful,
        Emotion::Loved,
        Emotion::Calm,
        Emotion::Neutral,
        Emotion::Confused,
        Emotion::Tired,
        Emotion::Sad,
        Emotion::Lonely,
        Emotion::Anxious,
        Emotion::Stressed,
        Emotion::Scared,
        Emotion::Angry,
        Emotion::Frustrated,
        Emotion::Disappointed,
        Emotion::Hurt,
        Emotion::Guilty,
    ];

    /// Look up an emotion from an English or Chinese token.
    pub fn from_token(token: &str) -> Option<Self> {
        let needle = token.trim().to_lowercase();
        EMOTION_TOKENS
            .iter()
            .find(|(_, _, tokens)| tokens.contains(&needle.as_str()))
            .map(|(emotion, _, _)| *emotion)
    }

    pub fn as_str(self) -> &'static str {
        EMOTION_TOKENS
            .iter()
            .find(|(emotion, _, _)| *emotion == self)
            .and_then(|(_, _, tokens)| tokens.first().copied())
            .unwrap_or("neutral")
    }

    pub fn label_zh(self) -> &'static str {
        EMOTION_TOKENS
            .iter()
            .find(|(emotion, _, _)| *emotion == self)
            .map(|(_, label, _)| *label)
            .unwrap_or("平常")
    }

    pub fn valence(self) -> Valence {
        match self {
            Emotion::Happy
            | Emotion::Excited
            | Emotion::Grateful
            | Emotion::Proud
            | Emotion::Hopeful
            | Emotion::Loved
            | Emotion::Calm => Valence::Positive,
            Emotion::Neutral | Emotion::Confused => Valence::Neutral,
            _ => Valence::Negative,
        }
    }
}

impl Need {
    pub const ALL: [Need; 7] = [
        Need::Comfort,
        Need::Praise,
        Need::Guidance,
        Need::Listening,
        Need::Validation,
        Need::Care,
        Need::Mixed,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        let needle = token.trim().to_lowercase();
        NEED_TOKENS
            .iter()
            .find(|(_, _, tokens)| tokens.contains(&needle.as_str()))
            .map(|(need, _, _)| *need)
    }

    pub fn as_str(self) -> &'static str {
        NEED_TOKENS
            .iter()
            .find(|(need, _, _)| *need == self)
            .and_then(|(_, _, tokens)| tokens.first().copied())
            .unwrap_or("mixed")
    }

    pub fn label_zh(self) -> &'static str {
        NEED_TOKENS
            .iter()
            .find(|(need, _, _)| *need == self)
            .map(|(_, label, _)| *label)
            .unwrap_or("综合")
    }
}

/// Structured result of classifying one user message.
///
/// Fields are private so that `intensity` and `confidence` can only be set
/// through [`EmotionAssessment::new`], which clamps them into `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawAssessment")]
pub struct EmotionAssessment {
    primary_emotion: Emotion,
    intensity: f32,
    needs: Need,
    confidence: f32,
    keywords: BTreeSet<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    primary_emotion: Emotion,
    intensity: f32,
    needs: Need,
    confidence: f32,
    #[serde(default)]
    keywords: BTreeSet<String>,
}

impl From<RawAssessment> for EmotionAssessment {
    fn from(raw: RawAssessment) -> Self {
        EmotionAssessment::new(
            raw.primary_emotion,
            raw.intensity,
            raw.needs,
            raw.confidence,
            raw.keywords,
        )
    }
}

pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl EmotionAssessment {
    pub fn new(
        primary_emotion: Emotion,
        intensity: f32,
        needs: Need,
        confidence: f32,
        keywords: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            primary_emotion,
            intensity: clamp_unit(intensity),
            needs,
            confidence: clamp_unit(confidence),
            keywords: keywords.into_iter().collect(),
        }
    }

    /// Result used when nothing in the text gives a signal.
    pub fn neutral() -> Self {
        Self::new(Emotion::Neutral, 0.5, Need::Mixed, 0.3, Vec::new())
    }

    pub fn primary_emotion(&self) -> Emotion {
        self.primary_emotion
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn needs(&self) -> Need {
        self.needs
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn intensity_band(&self) -> IntensityBand {
        IntensityBand::from_intensity(self.intensity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityBand {
    Mild,
    Moderate,
    Clear,
    Intense,
}

impl IntensityBand {
    pub fn from_intensity(intensity: f32) -> Self {
        if intensity < 0.4 {
            IntensityBand::Mild
        } else if intensity <= 0.6 {
            IntensityBand::Moderate
        } else if intensity <= 0.8 {
            IntensityBand::Clear
        } else {
            IntensityBand::Intense
        }
    }

    pub fn label_zh(self) -> &'static str {
        match self {
            IntensityBand::Mild => "轻微",
            IntensityBand::Moderate => "中等",
            IntensityBand::Clear => "明显",
            IntensityBand::Intense => "强烈",
        }
    }
}

struct KeywordRule {
    keywords: &'static [&'static str],
    emotion: Emotion,
    needs: Need,
    intensity: f32,
}

/// Ordered: the first rule with any matching keyword wins.
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["想死", "活不下去", "崩溃", "绝望", "hopeless"],
        emotion: Emotion::Stressed,
        needs: Need::Comfort,
        intensity: 0.9,
    },
    KeywordRule {
        keywords: &["难过", "伤心", "悲伤", "想哭", "哭了", "sad", "upset"],
        emotion: Emotion::Sad,
        needs: Need::Comfort,
        intensity: 0.7,
    },
    KeywordRule {
        keywords: &["孤独", "寂寞", "孤单", "没人陪", "lonely"],
        emotion: Emotion::Lonely,
        needs: Need::Care,
        intensity: 0.7,
    },
    KeywordRule {
        keywords: &["焦虑", "担心", "紧张", "不安", "anxious", "worried", "nervous"],
        emotion: Emotion::Anxious,
        needs: Need::Comfort,
        intensity: 0.65,
    },
    KeywordRule {
        keywords: &["压力", "好烦", "受不了", "stressed", "overwhelmed"],
        emotion: Emotion::Stressed,
        needs: Need::Comfort,
        intensity: 0.7,
    },
    KeywordRule {
        keywords: &["害怕", "恐惧", "好怕", "scared", "afraid"],
        emotion: Emotion::Scared,
        needs: Need::Comfort,
        intensity: 0.7,
    },
    KeywordRule {
        keywords: &["生气", "愤怒", "气死", "讨厌", "angry", "furious"],
        emotion: Emotion::Angry,
        needs: Need::Listening,
        intensity: 0.75,
    },
    KeywordRule {
        keywords: &["委屈", "受伤", "心痛", "hurt"],
        emotion: Emotion::Hurt,
        needs: Need::Validation,
        intensity: 0.7,
    },
    KeywordRule {
        keywords: &["失望", "遗憾", "disappointed"],
        emotion: Emotion::Disappointed,
        needs: Need::Comfort,
        intensity: 0.6,
    },
    KeywordRule {
        keywords: &["内疚", "自责", "愧疚", "guilty"],
        emotion: Emotion::Guilty,
        needs: Need::Validation,
        intensity: 0.6,
    },
    KeywordRule {
        keywords: &["好累", "疲惫", "累了", "累死", "tired", "exhausted"],
        emotion: Emotion::Tired,
        needs: Need::Care,
        intensity: 0.6,
    },
    KeywordRule {
        keywords: &["迷茫", "困惑", "不知道该", "怎么办", "confused", "lost"],
        emotion: Emotion::Confused,
        needs: Need::Guidance,
        intensity: 0.55,
    },
    KeywordRule {
        keywords: &["成功", "做到了", "完成了", "拿到了", "通过了", "升职", "proud", "i did it"],
        emotion: Emotion::Proud,
        needs: Need::Praise,
        intensity: 0.75,
    },
    KeywordRule {
        keywords: &["兴奋", "激动", "太棒了", "excited", "awesome"],
        emotion: Emotion::Excited,
        needs: Need::Praise,
        intensity: 0.8,
    },
    KeywordRule {
        keywords: &["开心", "高兴", "快乐", "哈哈", "happy", "glad"],
        emotion: Emotion::Happy,
        needs: Need::Praise,
        intensity: 0.65,
    },
    KeywordRule {
        keywords: &["谢谢", "感谢", "感恩", "thank"],
        emotion: Emotion::Grateful,
        needs: Need::Validation,
        intensity: 0.5,
    },
    KeywordRule {
        keywords: &["期待", "希望", "hope", "looking forward"],
        emotion: Emotion::Hopeful,
        needs: Need::Listening,
        intensity: 0.5,
    },
];

const HEURISTIC_MATCH_CONFIDENCE: f32 = 0.6;

/// Keyword-substring classification. Deterministic and total.
pub fn heuristic_assessment(text: &str) -> EmotionAssessment {
    let haystack = text.to_lowercase();

    for rule in KEYWORD_RULES {
        let matched: Vec<String> = rule
            .keywords
            .iter()
            .filter(|keyword| haystack.contains(*keyword))
            .map(|keyword| keyword.to_string())
            .collect();
        if !matched.is_empty() {
            return EmotionAssessment::new(
                rule.emotion,
                rule.intensity,
                rule.needs,
                HEURISTIC_MATCH_CONFIDENCE,
                matched,
            );
        }
    }

    EmotionAssessment::neutral()
}

/// Pick the response persona for an assessment.
///
/// Needs take priority; otherwise valence and intensity decide.
pub fn recommend_mode(assessment: &EmotionAssessment) -> ChatMode {
    match assessment.needs() {
        Need::Comfort => return ChatMode::Comfort,
        Need::Praise => return ChatMode::Praise,
        Need::Care => return ChatMode::Smart,
        _ => {}
    }

    match assessment.primary_emotion().valence() {
        Valence::Negative if assessment.intensity() > 0.6 => ChatMode::Comfort,
        Valence::Positive if assessment.intensity() > 0.5 => ChatMode::Praise,
        _ => ChatMode::Smart,
    }
}
