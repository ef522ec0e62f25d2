//! Durable user settings. Loaded leniently: a missing or corrupt file means
//! defaults, never a startup failure.

use std::collections::{
    HashMap,
    HashSet,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    core::{
        DeckId,
        SourceMode,
        TemplateKey,
    },
    persistence,
};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionSettings {
    pub source_mode: SourceMode,
    /// Review page size for top-of-queue queries.
    pub review_page_limit: usize,
    /// Review page size when sampling the queue for RANDOM_QUEUE.
    pub queue_sample_limit: usize,
    /// Below this many queue cards, RANDOM_QUEUE degrades to a full-deck roam.
    pub random_queue_threshold: usize,
    /// Target size of the random cache.
    pub random_cache_size: usize,
    /// Cap on note ids gathered for a full-deck roam.
    pub roam_sample_limit: usize,
    /// Delay before the single post-grade re-check, milliseconds.
    pub recheck_delay_ms: u64,
    /// Template allow-list, persisted as `"modelId:ord"` tokens. Legacy
    /// bare-ordinal tokens are wildcard keys.
    pub template_filter: Vec<String>,
    /// Deck name → id references, kept so a renamed deck can still be found.
    pub deck_refs: HashMap<String, DeckId>,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        CompanionSettings {
            source_mode: SourceMode::Review,
            review_page_limit: 20,
            queue_sample_limit: 50,
            random_queue_threshold: 10,
            random_cache_size: 15,
            roam_sample_limit: 200,
            recheck_delay_ms: 1500,
            template_filter: Vec::new(),
            deck_refs: HashMap::new(),
        }
    }
}

impl CompanionSettings {
    pub fn load() -> Self {
        persistence::load_json_or_default(SETTINGS_FILE)
    }

    pub fn save(&self) {
        if let Err(err) = persistence::save_json(self, SETTINGS_FILE) {
            log::warn!("failed to save settings: {err}");
        }
    }

    /// Parsed allow-list; unparsable tokens are dropped.
    pub fn template_filter(&self) -> HashSet<TemplateKey> {
        self.template_filter
            .iter()
            .filter_map(|token| TemplateKey::parse_token(token))
            .collect()
    }

    pub fn set_template_filter(&mut self, keys: &HashSet<TemplateKey>) {
        let mut tokens: Vec<String> = keys.iter().map(TemplateKey::to_token).collect();
        tokens.sort();
        self.template_filter = tokens;
    }

    pub fn remember_deck(&mut self, name: &str, deck_id: DeckId) {
        self.deck_refs.insert(name.to_string(), deck_id);
    }
}
