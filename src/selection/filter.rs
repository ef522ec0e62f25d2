//! Deck+template allow-list filtering, with fail-open degradation: a stored
//! filter that would blank a deck entirely is disabled for that call rather
//! than returning nothing.

use std::collections::HashSet;

use log::warn;

use crate::{
    core::{
        DeckId,
        ModelId,
        TemplateKey,
        TemplateOption,
    },
    provider::ProviderGateway,
};

/// Queue rows scanned when enumerating a deck's templates.
const TEMPLATE_SCAN_LIMIT: usize = 100;

/// An empty allow-list passes everything (filter disabled).
pub fn passes(allow_list: &HashSet<TemplateKey>, candidate: TemplateKey) -> bool {
    allow_list.is_empty() || allow_list.iter().any(|key| key.matches(candidate))
}

/// The allow-list to actually apply for a deck. If the stored list has no
/// overlap with the deck's available templates (stale filter from another
/// deck, or the deck's templates cannot be enumerated), filtering is
/// disabled for this call instead of silently blanking the deck.
pub fn effective_allow_list(
    provider: &dyn ProviderGateway,
    deck_id: DeckId,
    stored: &HashSet<TemplateKey>,
) -> HashSet<TemplateKey> {
    if stored.is_empty() {
        return HashSet::new();
    }
    let deck_options = template_options_for_deck(provider, deck_id);
    if deck_options.is_empty() {
        warn!("no templates enumerable for deck {deck_id}; disabling template filter");
        return HashSet::new();
    }
    let overlaps = stored
        .iter()
        .any(|key| deck_options.iter().any(|option| key.matches(option.key())));
    if !overlaps {
        warn!("template filter has no overlap with deck {deck_id}; disabling for this call");
        return HashSet::new();
    }
    stored.clone()
}

/// Enumerates a deck's selectable templates from the models seen in its
/// review queue. Scoping to the queue avoids picking up templates from other
/// decks when the provider ignores deck parameters.
pub fn template_options_for_deck(
    provider: &dyn ProviderGateway,
    deck_id: DeckId,
) -> Vec<TemplateOption> {
    let mut result = Vec::new();
    if deck_id < 0 || !provider.permission_granted() {
        return result;
    }

    let entries = match provider.fetch_review_page(Some(deck_id), TEMPLATE_SCAN_LIMIT) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("template enumeration failed for deck {deck_id}: {err}");
            return result;
        }
    };

    let mut model_ids: Vec<ModelId> = Vec::new();
    for entry in &entries {
        if let Ok(Some(model_id)) = provider.resolve_model_id(entry.note_id) {
            if !model_ids.contains(&model_id) {
                model_ids.push(model_id);
            }
        }
    }

    let mut seen: HashSet<TemplateKey> = HashSet::new();
    for model_id in model_ids {
        let info = match provider.model_info(model_id) {
            Ok(Some(info)) => info,
            _ => continue,
        };
        for ord in 0..info.template_count as u16 {
            let key = TemplateKey::new(model_id, ord);
            if seen.insert(key) {
                result.push(TemplateOption {
                    model_id,
                    ord,
                    template_name: None,
                    model_name: info.name.clone(),
                });
            }
        }
    }
    result
}
