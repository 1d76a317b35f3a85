//! Repetition tracking for assistant replies.
//!
//! Each completed reply is reduced to a [`PatternFingerprint`]. New drafts are
//! scored against the last few fingerprints of the same user, and the recent
//! fingerprints are turned into "avoid this" hints for the next system prompt.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::storage::{
    load_or_default, save_best_effort, SharedStore, DIVERSITY_HISTORY_KEY,
};
use crate::utils::text::{normalized_similarity, split_sentences};

pub const PER_USER_LIMIT: usize = 15;
pub const GLOBAL_LIMIT: usize = 1000;
/// Only this many recent records take part in similarity scoring.
pub const COMPARISON_WINDOW: usize = 5;

const OPENING_CHARS: usize = 20;
const OPENING_WEIGHT: f32 = 0.5;
const FILLER_WEIGHT: f32 = 0.3;
const STRUCTURE_WEIGHT: f32 = 0.2;

/// Filler and hedge words worth tracking.
const FILLER_WORDS: &[&str] = &[
    "其实", "真的", "非常", "特别", "可能", "也许", "感觉", "就是", "然后", "一下", "确实",
    "当然", "毕竟", "一定", "哦", "呢", "吧", "呀", "嗯", "啦", "really", "just",
    "actually", "maybe", "honestly", "definitely",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternFingerprint {
    pub opening: String,
    pub has_question: bool,
    pub has_exclamation: bool,
    pub filler_words: BTreeSet<String>,
    pub sentence_count: usize,
    pub char_length: usize,
}

impl PatternFingerprint {
    pub fn extract(text: &str) -> Self {
        let trimmed = text.trim();
        let sentences = split_sentences(trimmed);
        let opening = sentences
            .first()
            .map(|sentence| sentence.chars().take(OPENING_CHARS).collect())
            .unwrap_or_default();
        let lowered = trimmed.to_lowercase();
        let filler_words = FILLER_WORDS
            .iter()
            .filter(|word| lowered.contains(*word))
            .map(|word| word.to_string())
            .collect();

        Self {
            opening,
            has_question: trimmed.contains(['？', '?']),
            has_exclamation: trimmed.contains(['！', '!']),
            filler_words,
            sentence_count: sentences.len(),
            char_length: trimmed.chars().count(),
        }
    }

    /// Weighted similarity in `[0, 1]`; identical fingerprints score 1.
    pub fn similarity(&self, other: &PatternFingerprint) -> f32 {
        if self == other {
            return 1.0;
        }
        let opening = normalized_similarity(&self.opening, &other.opening);
        let filler = jaccard(&self.filler_words, &other.filler_words);
        let structure = {
            let question = f32::from(u8::from(self.has_question == other.has_question));
            let exclamation = f32::from(u8::from(self.has_exclamation == other.has_exclamation));
            (question + exclamation) / 2.0
        };
        let score = OPENING_WEIGHT * opening + FILLER_WEIGHT * filler + STRUCTURE_WEIGHT * structure;
        score.clamp(0.0, 1.0)
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiversityRecord {
    pub pattern_fingerprint: PatternFingerprint,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Default)]
pub struct DiversityTracker {
    records: VecDeque<DiversityRecord>,
    store: Option<SharedStore>,
}

impl std::fmt::Debug for DiversityTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiversityTracker")
            .field("records", &self.records.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl DiversityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: SharedStore) -> Self {
        let records: Vec<DiversityRecord> = load_or_default(store.as_ref(), DIVERSITY_HISTORY_KEY);
        let mut tracker = Self {
            records: VecDeque::new(),
            store: Some(store),
        };
        for record in records {
            tracker.insert(record);
        }
        tracker
    }

    pub fn records(&self) -> impl Iterator<Item = &DiversityRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn analyze_and_store(&mut self, response_text: &str, user_id: &str) {
        if response_text.trim().is_empty() {
            return;
        }
        self.insert(DiversityRecord {
            pattern_fingerprint: PatternFingerprint::extract(response_text),
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
        });
        self.persist();
    }

    /// Replace every record, applying the caps. Used by import.
    pub fn replace_all(&mut self, records: Vec<DiversityRecord>) {
        self.records.clear();
        for record in records {
            self.insert(record);
        }
        self.persist();
    }

    fn insert(&mut self, record: DiversityRecord) {
        let user_id = record.user_id.clone();
        self.records.push_back(record);

        let user_count = self.records.iter().filter(|r| r.user_id == user_id).count();
        if user_count > PER_USER_LIMIT {
            if let Some(oldest) = self.records.iter().position(|r| r.user_id == user_id) {
                self.records.remove(oldest);
            }
        }
        while self.records.len() > GLOBAL_LIMIT {
            self.records.pop_front();
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            let records: Vec<&DiversityRecord> = self.records.iter().collect();
            save_best_effort(store.as_ref(), DIVERSITY_HISTORY_KEY, &records);
        }
    }

    /// Most recent first.
    fn recent_for<'a>(
        &'a self,
        user_id: &'a str,
        limit: usize,
    ) -> impl Iterator<Item = &'a DiversityRecord> + 'a {
        self.records
            .iter()
            .rev()
            .filter(move |record| record.user_id == user_id)
            .take(limit)
    }

    /// Highest similarity between the draft and the user's recent replies.
    pub fn check_similarity(&self, draft_text: &str, user_id: &str) -> f32 {
        let draft = PatternFingerprint::extract(draft_text);
        self.recent_for(user_id, COMPARISON_WINDOW)
            .map(|record| draft.similarity(&record.pattern_fingerprint))
            .fold(0.0_f32, f32::max)
    }

    /// Prompt hints listing recent openings and overused filler words.
    pub fn get_diversity_instructions(&self, user_id: &str) -> String {
        let recent: Vec<&DiversityRecord> = self.recent_for(user_id, COMPARISON_WINDOW).collect();
        if recent.is_empty() {
            return String::new();
        }

        let mut openings: Vec<&str> = Vec::new();
        for record in &recent {
            let opening = record.pattern_fingerprint.opening.as_str();
            if !opening.is_empty() && !openings.contains(&opening) {
                openings.push(opening);
            }
        }

        let mut overused: Vec<&str> = FILLER_WORDS
            .iter()
            .copied()
            .filter(|word| {
                recent
                    .iter()
                    .filter(|record| record.pattern_fingerprint.filler_words.contains(*word))
                    .count()
                    >= 2
            })
            .collect();
        overused.truncate(6);

        let mut lines = Vec::new();
        if !openings.is_empty() {
            let quoted: Vec<String> = openings.iter().map(|o| format!("「{o}」")).collect();
            lines.push(format!("- 不要使用与这些相似的开头：{}", quoted.join("、")));
        }
        if !overused.is_empty() {
            lines.push(format!("- 少用这些口头禅：{}", overused.join("、")));
        }
        if recent.len() >= 3 && recent.iter().all(|r| r.pattern_fingerprint.has_question) {
            lines.push("- 最近几次回复都带了问句，这次换一种收尾方式".to_string());
        }
        if recent.len() >= 3 && recent.iter().all(|r| r.pattern_fingerprint.has_exclamation) {
            lines.push("- 最近几次回复感叹号偏多，这次语气平稳一些".to_string());
        }

        if lines.is_empty() {
            return String::new();
        }
        format!("【表达多样性】\n{}", lines.join("\n"))
    }
}
