//! HTTP gateway speaking the provider's JSON envelope protocol: a single
//! POST endpoint taking `{"action": .., "version": 6, "params": ..}` and
//! answering `{"result": .., "error": ..}`.

use std::collections::HashMap;

use log::{
    debug,
    warn,
};
use reqwest::blocking::Client;
use serde::{
    Deserialize,
    Serialize,
};

use super::{
    CardContent,
    ModelInfo,
    ProviderGateway,
    ReviewEntry,
};
use crate::core::{
    CompanionError,
    DeckId,
    Ease,
    ModelId,
    NoteId,
};

const PROTOCOL_VERSION: u32 = 6;
const DEFAULT_ENDPOINT: &str = "http://localhost:8765/";

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    result: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>, CompanionError> {
        match self.error {
            Some(message) => Err(CompanionError::Provider(message)),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PermissionResult {
    permission: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeckCardRow {
    note_id: NoteId,
    #[serde(default)]
    deck_id: Option<DeckId>,
}

pub struct HttpGateway {
    client: Client,
    endpoint: String,
}

impl HttpGateway {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        HttpGateway { client: Client::new(), endpoint: endpoint.into() }
    }

    fn request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Option<T>, CompanionError> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
        body.insert("version".to_string(), serde_json::Value::Number(PROTOCOL_VERSION.into()));
        if let Some(params) = params {
            body.insert("params".to_string(), params);
        }

        let response: ApiResponse<T> =
            self.client.post(&self.endpoint).json(&body).send()?.json()?;
        response.into_result()
    }

    /// Connectivity probe; the version action carries no payload worth
    /// keeping beyond "the provider answered".
    pub fn provider_version(&self) -> Result<u32, CompanionError> {
        Ok(self.request::<u32>("version", None)?.unwrap_or_default())
    }

    // The three note-listing strategies. Each returns what it can; a
    // rejected query shape is a strategy failure, not a gateway failure.

    fn notes_from_review_queue(&self, deck_id: DeckId, cap: usize) -> Vec<NoteId> {
        match self.fetch_review_page(Some(deck_id), cap) {
            Ok(entries) => entries.into_iter().map(|e| e.note_id).collect(),
            Err(err) => {
                warn!("review queue note lookup unsupported: {err}");
                Vec::new()
            }
        }
    }

    fn notes_from_card_table(&self, deck_id: DeckId, cap: usize) -> Vec<NoteId> {
        let params = serde_json::json!({ "deckId": deck_id });
        let rows: Vec<DeckCardRow> = match self.request("cardsInDeck", Some(params)) {
            Ok(rows) => rows.unwrap_or_default(),
            Err(err) => {
                warn!("card table deck filter unsupported: {err}");
                return Vec::new();
            }
        };
        rows.into_iter()
            .filter(|row| row.deck_id.map_or(true, |did| did == deck_id))
            .map(|row| row.note_id)
            .take(cap)
            .collect()
    }

    fn notes_from_deck_search(&self, deck_id: DeckId, cap: usize) -> Vec<NoteId> {
        let deck_name = match self.deck_name(deck_id) {
            Ok(Some(name)) if !name.is_empty() => name,
            _ => return Vec::new(),
        };
        let query = format!("deck:\"{}\"", deck_name.replace('"', "\\\""));
        let note_ids: Vec<NoteId> =
            match self.request("findNotes", Some(serde_json::json!({ "query": query }))) {
                Ok(ids) => ids.unwrap_or_default(),
                Err(err) => {
                    warn!("deck-scoped note search unsupported: {err}");
                    return Vec::new();
                }
            };

        // The search index can lag the card table, so cross-check that each
        // note still has a card in the target deck.
        let mut result = Vec::new();
        for note_id in note_ids {
            if result.len() >= cap {
                break;
            }
            let params = serde_json::json!({ "noteId": note_id });
            let rows: Vec<DeckCardRow> = match self.request("cardsOfNote", Some(params)) {
                Ok(rows) => rows.unwrap_or_default(),
                Err(err) => {
                    warn!("card lookup failed for note {note_id}: {err}");
                    continue;
                }
            };
            if rows.iter().any(|row| row.deck_id == Some(deck_id)) {
                result.push(note_id);
            }
        }
        result
    }
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderGateway for HttpGateway {
    fn permission_granted(&self) -> bool {
        match self.request::<PermissionResult>("requestPermission", None) {
            Ok(Some(result)) => result.permission == "granted",
            Ok(None) => false,
            Err(err) => {
                warn!("permission check failed: {err}");
                false
            }
        }
    }

    fn list_decks(&self) -> Result<HashMap<DeckId, String>, CompanionError> {
        let by_name: HashMap<String, DeckId> =
            self.request("deckNamesAndIds", None)?.unwrap_or_default();
        Ok(by_name.into_iter().map(|(name, id)| (id, name)).collect())
    }

    fn deck_name(&self, deck_id: DeckId) -> Result<Option<String>, CompanionError> {
        self.request("deckName", Some(serde_json::json!({ "deckId": deck_id })))
    }

    fn fetch_review_page(
        &self,
        deck_id: Option<DeckId>,
        limit: usize,
    ) -> Result<Vec<ReviewEntry>, CompanionError> {
        let params = match deck_id {
            Some(did) => serde_json::json!({ "limit": limit, "deckId": did }),
            None => serde_json::json!({ "limit": limit }),
        };
        match self.request::<Vec<ReviewEntry>>("scheduledCards", Some(params)) {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            // Deck-filtered query shape rejected: fall back to the unfiltered
            // queue and filter by the deck column ourselves.
            Err(CompanionError::Provider(message)) if deck_id.is_some() => {
                warn!("deck-filtered queue query rejected ({message}); filtering manually");
                let params = serde_json::json!({ "limit": limit });
                let entries: Vec<ReviewEntry> =
                    self.request("scheduledCards", Some(params))?.unwrap_or_default();
                Ok(entries
                    .into_iter()
                    .filter(|entry| entry.deck_id.map_or(true, |did| Some(did) == deck_id))
                    .collect())
            }
            Err(err) => Err(err),
        }
    }

    fn fetch_card_content(
        &self,
        note_id: NoteId,
        card_ord: u16,
    ) -> Result<Option<CardContent>, CompanionError> {
        let params = serde_json::json!({ "noteId": note_id, "cardOrd": card_ord });
        self.request("cardContent", Some(params))
    }

    fn resolve_model_id(&self, note_id: NoteId) -> Result<Option<ModelId>, CompanionError> {
        self.request("noteModelId", Some(serde_json::json!({ "noteId": note_id })))
    }

    fn model_info(&self, model_id: ModelId) -> Result<Option<ModelInfo>, CompanionError> {
        self.request("modelInfo", Some(serde_json::json!({ "modelId": model_id })))
    }

    fn list_note_ids_in_deck(
        &self,
        deck_id: DeckId,
        cap: usize,
    ) -> Result<Vec<NoteId>, CompanionError> {
        let cap = cap.max(1);
        let mut note_ids: Vec<NoteId> = Vec::new();
        let mut pulled = [0usize; 3];

        let strategies: [&dyn Fn(DeckId, usize) -> Vec<NoteId>; 3] = [
            &|deck, cap| self.notes_from_review_queue(deck, cap),
            &|deck, cap| self.notes_from_card_table(deck, cap),
            &|deck, cap| self.notes_from_deck_search(deck, cap),
        ];
        for (index, strategy) in strategies.iter().enumerate() {
            if note_ids.len() >= cap {
                break;
            }
            let before = note_ids.len();
            for note_id in strategy(deck_id, cap) {
                if note_ids.len() >= cap {
                    break;
                }
                if !note_ids.contains(&note_id) {
                    note_ids.push(note_id);
                }
            }
            pulled[index] = note_ids.len() - before;
        }

        debug!(
            "list_note_ids_in_deck: deck={} total={} queue={} cards={} search={}",
            deck_id,
            note_ids.len(),
            pulled[0],
            pulled[1],
            pulled[2]
        );
        Ok(note_ids)
    }

    fn submit_review(
        &self,
        note_id: NoteId,
        card_ord: u16,
        ease: Ease,
        elapsed_millis: i64,
    ) -> bool {
        let params = serde_json::json!({
            "noteId": note_id,
            "cardOrd": card_ord,
            "ease": ease.value(),
            "timeTaken": elapsed_millis,
        });
        match self.request::<bool>("answerCard", Some(params)) {
            Ok(accepted) => accepted.unwrap_or(false),
            Err(err) => {
                warn!("failed to submit review, card may have changed: {err}");
                false
            }
        }
    }
}
