use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::emotion::EmotionAssessment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }

    pub fn is_user(self) -> bool {
        self == TurnRole::User
    }

    pub fn is_assistant(self) -> bool {
        self == TurnRole::Assistant
    }

    /// Label used when history is condensed into a prompt.
    pub fn speaker_label(self) -> &'static str {
        match self {
            TurnRole::User => "用户",
            TurnRole::Assistant => "助手",
            TurnRole::System => "系统",
        }
    }
}

impl TryFrom<&str> for TurnRole {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            "system" => Ok(TurnRole::System),
            _ => Err(format!("invalid turn role: {value}")),
        }
    }
}

impl TryFrom<String> for TurnRole {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<TurnRole> for String {
    fn from(value: TurnRole) -> Self {
        value.as_str().to_string()
    }
}

/// Response persona governing prompt construction.
///
/// `Smart` is the adaptive mode: the emotion classifier runs first and may
/// redirect the turn to `Comfort` or `Praise`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChatMode {
    #[default]
    Smart,
    Praise,
    Comfort,
}

/// Accepted spellings for each mode, English and Chinese.
const MODE_ALIASES: &[(ChatMode, &[&str])] = &[
    (ChatMode::Smart, &["smart", "auto", "智能", "自动"]),
    (ChatMode::Praise, &["praise", "kuakua", "夸夸", "夸奖", "赞美"]),
    (ChatMode::Comfort, &["comfort", "安慰", "抚慰"]),
];

impl ChatMode {
    pub const ALL: [ChatMode; 3] = [ChatMode::Smart, ChatMode::Praise, ChatMode::Comfort];

    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::Smart => "smart",
            ChatMode::Praise => "praise",
            ChatMode::Comfort => "comfort",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ChatMode::Smart => "智能",
            ChatMode::Praise => "夸夸",
            ChatMode::Comfort => "安慰",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let needle = value.trim().to_lowercase();
        MODE_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|alias| *alias == needle))
            .map(|(mode, _)| *mode)
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChatMode::parse(s).ok_or_else(|| format!("unknown chat mode: {s}"))
    }
}

impl TryFrom<String> for ChatMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChatMode> for String {
    fn from(value: ChatMode) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ChatMode>,
    #[serde(default)]
    pub is_streaming: bool,
    /// The reply failed and `content` holds the error text.
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion_assessment: Option<EmotionAssessment>,
}

impl ConversationTurn {
    pub fn new(id: impl Into<String>, role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            mode: None,
            is_streaming: false,
            is_error: false,
            emotion_assessment: None,
        }
    }

    pub fn user(id: impl Into<String>, content: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::new(id, TurnRole::User, content)
        }
    }

    /// Empty assistant turn that receives streamed content.
    pub fn assistant_placeholder(id: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            mode: Some(mode),
            is_streaming: true,
            ..Self::new(id, TurnRole::Assistant, String::new())
        }
    }

    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, TurnRole::System, content)
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }
}
