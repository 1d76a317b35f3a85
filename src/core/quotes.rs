//! Categorized aphorisms for optional injection into user prompts.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::emotion::{EmotionAssessment, Need};
use crate::core::message::ChatMode;
use crate::core::storage::{load_or_default, save_best_effort, KeyValueStore, QUOTE_USAGE_KEY};
use crate::utils::random::RandomSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteCategory {
    Comfort,
    Praise,
    Mixed,
}

impl QuoteCategory {
    pub fn for_need(need: Need) -> Self {
        match need {
            Need::Comfort | Need::Care | Need::Listening => QuoteCategory::Comfort,
            Need::Praise | Need::Validation => QuoteCategory::Praise,
            Need::Guidance | Need::Mixed => QuoteCategory::Mixed,
        }
    }

    pub fn for_mode(mode: ChatMode) -> Self {
        match mode {
            ChatMode::Comfort => QuoteCategory::Comfort,
            ChatMode::Praise => QuoteCategory::Praise,
            ChatMode::Smart => QuoteCategory::Mixed,
        }
    }

    /// Category for a turn: the assessed need when known, else the mode.
    pub fn select(assessment: Option<&EmotionAssessment>, mode: ChatMode) -> Self {
        assessment
            .map(|assessment| Self::for_need(assessment.needs()))
            .unwrap_or_else(|| Self::for_mode(mode))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub id: &'static str,
    pub category: QuoteCategory,
    pub text: &'static str,
    pub author: &'static str,
}

const QUOTES: &[Quote] = &[
    Quote {
        id: "c-tagore",
        category: QuoteCategory::Comfort,
        text: "世界以痛吻我，要我报之以歌。",
        author: "泰戈尔",
    },
    Quote {
        id: "c-macbeth",
        category: QuoteCategory::Comfort,
        text: "黑夜无论怎样悠长，白昼总会到来。",
        author: "莎士比亚",
    },
    Quote {
        id: "c-luyou",
        category: QuoteCategory::Comfort,
        text: "山重水复疑无路，柳暗花明又一村。",
        author: "陆游",
    },
    Quote {
        id: "c-maupassant",
        category: QuoteCategory::Comfort,
        text: "生活不可能像你想象得那么好，但也不会像你想象得那么糟。",
        author: "莫泊桑",
    },
    Quote {
        id: "c-sushi",
        category: QuoteCategory::Comfort,
        text: "回首向来萧瑟处，归去，也无风雨也无晴。",
        author: "苏轼",
    },
    Quote {
        id: "c-pushkin",
        category: QuoteCategory::Comfort,
        text: "假如生活欺骗了你，不要悲伤，不要心急。",
        author: "普希金",
    },
    Quote {
        id: "p-libai-talent",
        category: QuoteCategory::Praise,
        text: "天生我材必有用。",
        author: "李白",
    },
    Quote {
        id: "p-libai-wind",
        category: QuoteCategory::Praise,
        text: "长风破浪会有时，直挂云帆济沧海。",
        author: "李白",
    },
    Quote {
        id: "p-plum",
        category: QuoteCategory::Praise,
        text: "宝剑锋从磨砺出，梅花香自苦寒来。",
        author: "《警世贤文》",
    },
    Quote {
        id: "p-xunzi",
        category: QuoteCategory::Praise,
        text: "不积跬步，无以至千里。",
        author: "荀子",
    },
    Quote {
        id: "p-dufu",
        category: QuoteCategory::Praise,
        text: "会当凌绝顶，一览众山小。",
        author: "杜甫",
    },
    Quote {
        id: "m-laozi-step",
        category: QuoteCategory::Mixed,
        text: "千里之行，始于足下。",
        author: "老子",
    },
    Quote {
        id: "m-sushi-traveler",
        category: QuoteCategory::Mixed,
        text: "人生如逆旅，我亦是行人。",
        author: "苏轼",
    },
    Quote {
        id: "m-quyuan",
        category: QuoteCategory::Mixed,
        text: "路漫漫其修远兮，吾将上下而求索。",
        author: "屈原",
    },
    Quote {
        id: "m-laozi-content",
        category: QuoteCategory::Mixed,
        text: "知足者富。",
        author: "老子",
    },
    Quote {
        id: "m-sushi-rain",
        category: QuoteCategory::Mixed,
        text: "竹杖芒鞋轻胜马，谁怕？一蓑烟雨任平生。",
        author: "苏轼",
    },
];

/// Recently used quote ids remembered per user.
const USAGE_HISTORY_LIMIT: usize = 8;

/// Inclusion probability `min(base + intensity * scale, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotePolicy {
    pub base: f32,
    pub scale: f32,
    pub cap: f32,
}

impl Default for QuotePolicy {
    fn default() -> Self {
        Self {
            base: 0.15,
            scale: 0.35,
            cap: 0.5,
        }
    }
}

impl QuotePolicy {
    pub fn probability(&self, intensity: f32) -> f32 {
        (self.base + intensity.clamp(0.0, 1.0) * self.scale)
            .min(self.cap)
            .max(0.0)
    }
}

#[derive(Default)]
pub struct QuoteStore {
    usage: HashMap<String, VecDeque<String>>,
    store: Option<crate::core::storage::SharedStore>,
}

impl std::fmt::Debug for QuoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteStore")
            .field("usage", &self.usage)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: crate::core::storage::SharedStore) -> Self {
        let usage = load_or_default(store.as_ref(), QUOTE_USAGE_KEY);
        Self {
            usage,
            store: Some(store),
        }
    }

    pub fn all() -> &'static [Quote] {
        QUOTES
    }

    pub fn by_category(category: QuoteCategory) -> impl Iterator<Item = &'static Quote> {
        QUOTES.iter().filter(move |quote| quote.category == category)
    }

    pub fn recent_for(&self, user_id: &str) -> Vec<&str> {
        self.usage
            .get(user_id)
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Pick a quote the user has not seen recently and record its use.
    ///
    /// Falls back to the whole category once every quote has been used.
    pub fn pick(
        &mut self,
        category: QuoteCategory,
        user_id: &str,
        random: &mut dyn RandomSource,
    ) -> Option<&'static Quote> {
        let recent = self.usage.get(user_id);
        let fresh: Vec<&'static Quote> = Self::by_category(category)
            .filter(|quote| recent.is_none_or(|ids| !ids.iter().any(|id| id == quote.id)))
            .collect();
        let candidates: Vec<&'static Quote> = if fresh.is_empty() {
            Self::by_category(category).collect()
        } else {
            fresh
        };
        if candidates.is_empty() {
            return None;
        }

        let quote = candidates[random.next_index(candidates.len())];
        self.record_use(user_id, quote.id);
        Some(quote)
    }

    fn record_use(&mut self, user_id: &str, quote_id: &str) {
        let history = self.usage.entry(user_id.to_string()).or_default();
        history.retain(|id| id != quote_id);
        history.push_back(quote_id.to_string());
        while history.len() > USAGE_HISTORY_LIMIT {
            history.pop_front();
        }
        if let Some(store) = &self.store {
            save_best_effort(store.as_ref(), QUOTE_USAGE_KEY, &self.usage);
        }
    }
}

pub fn format_quote(quote: &Quote) -> String {
    format!("「{}」——{}", quote.text, quote.author)
}
