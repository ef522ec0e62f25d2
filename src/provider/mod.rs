//! Typed query/update operations against the external flashcard provider.
//! Pure adapter layer: no selection policy lives here.

use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

use crate::core::{
    CompanionError,
    DeckId,
    Ease,
    ModelId,
    NoteId,
};

pub mod http;

pub use http::HttpGateway;

/// One row of the provider's review queue, in the provider's priority order.
/// Carries scheduling metadata but not question/answer text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    pub note_id: NoteId,
    pub card_ord: u16,
    #[serde(default)]
    pub button_count: u8,
    #[serde(default)]
    pub media_files: Vec<String>,
    #[serde(default)]
    pub next_intervals: Vec<String>,
    /// Present only when the provider exposes the deck column.
    #[serde(default)]
    pub deck_id: Option<DeckId>,
}

/// The four text fields of a card, fetched separately from queue metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardContent {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub question_plain: String,
    #[serde(default)]
    pub answer_plain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub template_count: usize,
}

pub trait ProviderGateway {
    /// Whether the provider has granted us read/write access. Callers must
    /// check this before issuing queries.
    fn permission_granted(&self) -> bool;

    fn list_decks(&self) -> Result<HashMap<DeckId, String>, CompanionError>;

    fn deck_name(&self, deck_id: DeckId) -> Result<Option<String>, CompanionError>;

    /// The review queue in provider priority order, optionally filtered by
    /// deck. `None` deck means all decks.
    fn fetch_review_page(
        &self,
        deck_id: Option<DeckId>,
        limit: usize,
    ) -> Result<Vec<ReviewEntry>, CompanionError>;

    /// `None` when the note/template no longer resolves (queue moved on).
    fn fetch_card_content(
        &self,
        note_id: NoteId,
        card_ord: u16,
    ) -> Result<Option<CardContent>, CompanionError>;

    fn resolve_model_id(&self, note_id: NoteId) -> Result<Option<ModelId>, CompanionError>;

    fn model_info(&self, model_id: ModelId) -> Result<Option<ModelInfo>, CompanionError>;

    /// Number of templates a model generates cards from; 0 if unresolved.
    fn model_template_count(&self, model_id: ModelId) -> Result<usize, CompanionError> {
        Ok(self.model_info(model_id)?.map(|info| info.template_count).unwrap_or(0))
    }

    /// Best-effort note ids belonging to a deck, capped at `cap`. Individual
    /// lookup strategies may be unsupported by the provider; each contributes
    /// what it can.
    fn list_note_ids_in_deck(
        &self,
        deck_id: DeckId,
        cap: usize,
    ) -> Result<Vec<NoteId>, CompanionError>;

    /// Submits a grade. Never fails hard: a rejected review (the card is no
    /// longer at the top of its queue) is reported as `false`.
    fn submit_review(&self, note_id: NoteId, card_ord: u16, ease: Ease, elapsed_millis: i64)
        -> bool;
}

/// Finds a deck by name: exact case-insensitive match against the provider's
/// deck list, falling back to a previously remembered name → id reference in
/// case the deck was renamed (the reference must still resolve).
pub fn resolve_deck_id(
    provider: &dyn ProviderGateway,
    deck_refs: &HashMap<String, DeckId>,
    name: &str,
) -> Option<DeckId> {
    if let Ok(decks) = provider.list_decks() {
        for (id, deck_name) in &decks {
            if deck_name.eq_ignore_ascii_case(name) {
                return Some(*id);
            }
        }
    }
    let remembered = *deck_refs.get(name)?;
    match provider.deck_name(remembered) {
        Ok(Some(_)) => Some(remembered),
        _ => None,
    }
}
