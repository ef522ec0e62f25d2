use std::sync::{
    Arc,
    Mutex,
};

use serde::{
    Deserialize,
    Serialize,
};

pub type DeckId = i64;
pub type NoteId = i64;
pub type ModelId = i64;

/// Sentinel for "no deck / no note / unresolved model".
pub const NONE_ID: i64 = -1;

/// Sentinel ordinal meaning "no card" in a persisted selection.
pub const NO_CARD_ORD: i32 = -1;

/// Milliseconds since the Unix epoch; the clock behind card start times.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Where the next card comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceMode {
    /// Provider's live priority order, top of queue first.
    #[default]
    Review,
    /// Shuffled sample of the review queue, degrading to a full-deck roam
    /// when the queue runs thin.
    RandomQueue,
    /// Full-deck random sample, ignoring the review queue.
    RandomRoam,
}

/// Grading signal submitted for a reviewed card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ease {
    Again,
    Hard,
    Good,
    Easy,
}

impl Ease {
    pub fn value(self) -> u8 {
        match self {
            Ease::Again => 1,
            Ease::Hard => 2,
            Ease::Good => 3,
            Ease::Easy => 4,
        }
    }

    pub fn from_value(value: u8) -> Option<Ease> {
        match value {
            1 => Some(Ease::Again),
            2 => Some(Ease::Hard),
            3 => Some(Ease::Good),
            4 => Some(Ease::Easy),
            _ => None,
        }
    }
}

/// A `(model, template ordinal)` pair used as an allow-list element.
///
/// A negative `model_id` is the wildcard: it matches any model with the same
/// ordinal. Older persisted filters stored bare ordinals, which parse into
/// wildcard keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub model_id: ModelId,
    pub ord: u16,
}

impl TemplateKey {
    pub fn new(model_id: ModelId, ord: u16) -> Self {
        TemplateKey { model_id, ord }
    }

    pub fn wildcard(ord: u16) -> Self {
        TemplateKey { model_id: NONE_ID, ord }
    }

    pub fn is_wildcard(&self) -> bool {
        self.model_id < 0
    }

    /// Whether this allow-list entry admits `candidate`.
    pub fn matches(&self, candidate: TemplateKey) -> bool {
        self.ord == candidate.ord && (self.is_wildcard() || self.model_id == candidate.model_id)
    }

    /// Persisted form, `"modelId:ord"`.
    pub fn to_token(&self) -> String {
        format!("{}:{}", self.model_id, self.ord)
    }

    /// Parses `"modelId:ord"`; a bare `"ord"` token is the legacy wildcard
    /// form. Returns `None` for anything unparsable.
    pub fn parse_token(token: &str) -> Option<TemplateKey> {
        match token.split_once(':') {
            Some((model, ord)) => {
                let model_id: ModelId = model.trim().parse().ok()?;
                let ord: u16 = ord.trim().parse().ok()?;
                Some(TemplateKey { model_id, ord })
            }
            None => {
                let ord: u16 = token.trim().parse().ok()?;
                Some(TemplateKey::wildcard(ord))
            }
        }
    }
}

/// One selectable template of a deck, for filter configuration UIs.
#[derive(Debug, Clone)]
pub struct TemplateOption {
    pub model_id: ModelId,
    pub ord: u16,
    pub template_name: Option<String>,
    pub model_name: String,
}

impl TemplateOption {
    pub fn key(&self) -> TemplateKey {
        TemplateKey::new(self.model_id, self.ord)
    }

    pub fn display_name(&self) -> String {
        // The provider does not expose per-template names, so default to an
        // English ordinal.
        let name_part = match &self.template_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Template {}", self.ord + 1),
        };
        if self.model_name.is_empty() {
            name_part
        } else {
            format!("{} • {}", self.model_name, name_part)
        }
    }
}

/// A displayable card. Equality is identity equality: two cards are the same
/// card iff they share `(note_id, template_ord)`; deck and model are context.
#[derive(Debug, Clone, Default)]
pub struct Card {
    pub deck_id: DeckId,
    pub note_id: NoteId,
    pub template_ord: u16,
    pub model_id: ModelId,
    pub question: String,
    pub answer: String,
    pub plain_question: String,
    pub plain_answer: String,
    pub button_count: u8,
    pub media_files: Vec<String>,
    pub next_intervals: Vec<String>,
    /// When this card became the current selection, millis since epoch.
    pub start_time: i64,
    attachments: Arc<Mutex<Vec<String>>>,
}

impl Card {
    /// A bare card with its identity set and the selection clock started;
    /// content and context fields are filled in by the caller.
    pub fn new(deck_id: DeckId, note_id: NoteId, template_ord: u16) -> Card {
        Card {
            deck_id,
            note_id,
            template_ord,
            model_id: NONE_ID,
            start_time: now_millis(),
            ..Card::default()
        }
    }

    pub fn identity(&self) -> (NoteId, u16) {
        (self.note_id, self.template_ord)
    }

    /// Rich text when present, plain fallback otherwise.
    pub fn display_question(&self) -> &str {
        super::text::display_text(&self.question, &self.plain_question)
    }

    pub fn display_answer(&self) -> &str {
        super::text::display_text(&self.answer, &self.plain_answer)
    }

    /// Appends an auxiliary media reference. Append-only and safe to call
    /// from any thread; clones of the card share the list.
    pub fn add_attachment(&self, reference: String) {
        if let Ok(mut attachments) = self.attachments.lock() {
            attachments.push(reference);
        }
    }

    pub fn attachments(&self) -> Vec<String> {
        self.attachments.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl PartialEq for Card {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Card {}

/// Durable single-slot snapshot of what is currently on screen. Field names
/// match the persisted JSON written by earlier releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSelection {
    pub deck_id: DeckId,
    pub note_id: NoteId,
    pub card_ord: i32,
    pub start_time: i64,
}

impl StoredSelection {
    /// Deck selected, no card on screen.
    pub fn empty(deck_id: DeckId) -> Self {
        StoredSelection { deck_id, note_id: NONE_ID, card_ord: NO_CARD_ORD, start_time: 0 }
    }

    pub fn for_card(deck_id: DeckId, card: &Card) -> Self {
        StoredSelection {
            deck_id,
            note_id: card.note_id,
            card_ord: card.template_ord as i32,
            start_time: card.start_time,
        }
    }

    pub fn has_card(&self) -> bool {
        self.card_ord >= 0
    }

    /// Time this selection has been on screen, clamped at zero in case the
    /// clock jumped backwards since it was stored.
    pub fn elapsed_millis(&self, now: i64) -> i64 {
        (now - self.start_time).max(0)
    }

    pub fn identity(&self) -> Option<(NoteId, u16)> {
        if self.has_card() {
            Some((self.note_id, self.card_ord as u16))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_equality_is_identity_only() {
        let a = Card { deck_id: 1, note_id: 7, template_ord: 0, question: "q".into(), ..Card::default() };
        let b = Card { deck_id: 2, note_id: 7, template_ord: 0, question: "other".into(), ..Card::default() };
        let c = Card { deck_id: 1, note_id: 7, template_ord: 1, ..Card::default() };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn attachments_are_shared_across_clones() {
        let card = Card::default();
        let clone = card.clone();
        card.add_attachment("sound.mp3".to_string());
        assert_eq!(clone.attachments(), vec!["sound.mp3".to_string()]);
    }

    #[test]
    fn template_key_tokens_round_trip() {
        let key = TemplateKey::new(1607392319495, 2);
        assert_eq!(TemplateKey::parse_token(&key.to_token()), Some(key));
        // Legacy bare-ordinal token parses as a wildcard.
        assert_eq!(TemplateKey::parse_token("3"), Some(TemplateKey::wildcard(3)));
        assert_eq!(TemplateKey::parse_token("x:y"), None);
        assert_eq!(TemplateKey::parse_token(""), None);
    }

    #[test]
    fn wildcard_matches_any_model_with_same_ord() {
        let wildcard = TemplateKey::wildcard(1);
        assert!(wildcard.matches(TemplateKey::new(42, 1)));
        assert!(!wildcard.matches(TemplateKey::new(42, 0)));
        let exact = TemplateKey::new(42, 1);
        assert!(exact.matches(TemplateKey::new(42, 1)));
        assert!(!exact.matches(TemplateKey::new(43, 1)));
    }

    #[test]
    fn stored_selection_sentinel_has_no_identity() {
        let empty = StoredSelection::empty(5);
        assert!(!empty.has_card());
        assert_eq!(empty.identity(), None);
    }

    #[test]
    fn stored_selection_elapsed_is_never_negative() {
        let selection = StoredSelection { deck_id: 1, note_id: 2, card_ord: 0, start_time: 1_000 };
        assert_eq!(selection.elapsed_millis(1_500), 500);
        assert_eq!(selection.elapsed_millis(500), 0);
    }
}
