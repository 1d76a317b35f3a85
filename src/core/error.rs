//! Error taxonomy shared by the provider layer and the turn orchestrator.
//!
//! Every failure is carried as a value. Which variants are allowed to reach
//! the network layer, and which ones are merely logged, is decided by the
//! orchestrator; see [`ChatError::is_silent`] and
//! [`ChatError::is_recoverable`].

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    /// Missing base URL, credential, or model selection.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-2xx response or transport failure. `status` is `None` when the
    /// request never produced an HTTP response.
    #[error("network error{}: {body}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Network { status: Option<u16>, body: String },

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A stream line that could not be decoded. Logged and skipped.
    #[error("could not parse stream line: {0}")]
    ProtocolParse(String),

    /// The vendor reported an error in the middle of a stream.
    #[error("stream aborted by provider: {0}")]
    StreamAbort(String),

    /// A turn is already in flight.
    #[error("another message is still being answered")]
    ConcurrencyRejected,

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("import rejected: {0}")]
    Import(String),
}

impl ChatError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ChatError::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn network(status: Option<u16>, body: impl Into<String>) -> Self {
        ChatError::Network {
            status,
            body: body.into(),
        }
    }

    /// Rejections that are dropped without telling the user.
    pub fn is_silent(&self) -> bool {
        matches!(self, ChatError::ConcurrencyRejected)
    }

    /// Errors that do not end the current stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::ProtocolParse(_))
    }

    /// Text written into a failed assistant turn.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Configuration(detail) => {
                format!("⚠️ 还没有可用的模型服务：{detail}")
            }
            ChatError::Network {
                status: Some(status),
                body,
            } => format!("⚠️ 服务返回错误（{status}）：{}", first_line(body)),
            ChatError::Network { status: None, body } => {
                format!("⚠️ 网络连接失败：{}", first_line(body))
            }
            ChatError::Timeout(after) => {
                format!("⚠️ 请求超时（{} 秒），请稍后再试", after.as_secs())
            }
            ChatError::StreamAbort(detail) => {
                format!("⚠️ 回复中断：{}", first_line(detail))
            }
            other => format!("⚠️ {other}"),
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}
