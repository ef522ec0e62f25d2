//! Decides which card to show next for a deck and source mode, and keeps the
//! random cache populated for the non-review modes.

use std::collections::{
    HashMap,
    HashSet,
};

use log::{
    debug,
    warn,
};
use rand::seq::SliceRandom;

use super::{
    cache::RandomCache,
    filter,
};
use crate::{
    core::{
        Card,
        DeckId,
        ModelId,
        SourceMode,
        StoredSelection,
        TemplateKey,
        NONE_ID,
    },
    persistence::StateStore,
    provider::{
        ProviderGateway,
        ReviewEntry,
    },
    settings::CompanionSettings,
};

/// Roam batch size when the cache asks for a single extension candidate.
const EXTEND_BATCH: usize = 5;

pub struct Selector<'a> {
    pub provider: &'a dyn ProviderGateway,
    pub store: &'a dyn StateStore,
    pub settings: &'a CompanionSettings,
}

impl Selector<'_> {
    /// Produces the next card for `deck_id` under `mode`, updating the cache
    /// (non-review modes) and the stored selection. `None` means no card is
    /// available, which is an expected outcome, not an error.
    pub fn select_for_deck(
        &self,
        cache: &mut RandomCache,
        deck_id: DeckId,
        mode: SourceMode,
    ) -> Option<Card> {
        if !self.provider.permission_granted() {
            warn!("provider permission not granted; no cards available");
            return None;
        }

        let card = match mode {
            // REVIEW tracks the provider's live priority order exactly on
            // every call, so it bypasses the cache.
            SourceMode::Review => self.select_from_queue(deck_id),
            SourceMode::RandomQueue => {
                let allow = self.allow_list(deck_id);
                let mut cards =
                    self.queue_cards(deck_id, self.settings.queue_sample_limit, &allow);
                let observed = cards.len();
                let mut rng = rand::rng();
                if observed < self.settings.random_queue_threshold {
                    debug!(
                        "queue sample {} below threshold {}; roaming whole deck",
                        observed, self.settings.random_queue_threshold
                    );
                    let roamed = self.roam_cards(deck_id, self.settings.random_cache_size, false);
                    cache.rebuild(
                        roamed,
                        self.settings.random_cache_size,
                        mode,
                        true,
                        observed,
                        &mut rng,
                    );
                } else {
                    // Skip the card already on screen so a refresh does not
                    // repeat it; with a single candidate there is nothing
                    // else to show. REVIEW never skips, it would oscillate
                    // between the two top cards.
                    if let Some(identity) = self.store.get().and_then(|s| s.identity()) {
                        if cards.len() > 1 {
                            cards.retain(|card| card.identity() != identity);
                        }
                    }
                    cache.rebuild(
                        cards,
                        self.settings.random_cache_size,
                        mode,
                        false,
                        observed,
                        &mut rng,
                    );
                }
                cache.current().cloned()
            }
            SourceMode::RandomRoam => {
                let roamed = self.roam_cards(deck_id, self.settings.random_cache_size, false);
                let observed = roamed.len();
                let mut rng = rand::rng();
                cache.rebuild(
                    roamed,
                    self.settings.random_cache_size,
                    mode,
                    false,
                    observed,
                    &mut rng,
                );
                cache.current().cloned()
            }
        };

        match &card {
            Some(card) => self.store.put(&StoredSelection::for_card(deck_id, card)),
            None => self.store.put(&StoredSelection::empty(deck_id)),
        }
        card
    }

    /// Moves the cache cursor, re-selecting from scratch when the cache is
    /// cold, and records the new current card as the stored selection.
    pub fn advance_cache(
        &self,
        cache: &mut RandomCache,
        deck_id: DeckId,
        delta: i32,
    ) -> Option<Card> {
        if cache.is_empty() {
            return self.select_for_deck(cache, deck_id, self.settings.source_mode);
        }
        let extension = if delta > 0 && cache.at_last() {
            self.fetch_one_more(deck_id, cache)
        } else {
            None
        };
        let card = cache.advance(delta, move || extension).cloned();
        match &card {
            Some(card) => self.store.put(&StoredSelection::for_card(deck_id, card)),
            None => self.store.put(&StoredSelection::empty(deck_id)),
        }
        card
    }

    /// The provider's current top-of-queue card for a deck, without touching
    /// the cache or the stored selection.
    pub fn peek_top(&self, deck_id: DeckId) -> Option<Card> {
        if !self.provider.permission_granted() {
            return None;
        }
        self.select_from_queue(deck_id)
    }

    /// Top of the provider's live queue for a deck, in provider order.
    fn select_from_queue(&self, deck_id: DeckId) -> Option<Card> {
        let allow = self.allow_list(deck_id);
        self.queue_cards(deck_id, self.settings.review_page_limit, &allow).into_iter().next()
    }

    /// Fetches a review page, applies the template filter, and enriches the
    /// survivors with their content. Provider order is preserved; a candidate
    /// whose content no longer resolves is skipped (the queue moved on).
    fn queue_cards(
        &self,
        deck_id: DeckId,
        limit: usize,
        allow: &HashSet<TemplateKey>,
    ) -> Vec<Card> {
        let entries = match self.provider.fetch_review_page(Some(deck_id), limit) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("review page fetch failed for deck {deck_id}: {err}");
                return Vec::new();
            }
        };

        let mut cards = Vec::new();
        for entry in entries {
            let model_id = match self.provider.resolve_model_id(entry.note_id) {
                Ok(Some(model_id)) => model_id,
                _ => NONE_ID,
            };
            if !filter::passes(allow, TemplateKey::new(model_id, entry.card_ord)) {
                continue;
            }
            match self.provider.fetch_card_content(entry.note_id, entry.card_ord) {
                Ok(Some(content)) => {
                    cards.push(build_card(deck_id, model_id, &entry, content));
                }
                Ok(None) => {
                    debug!(
                        "content gone for note {} ord {}; skipping",
                        entry.note_id, entry.card_ord
                    );
                }
                Err(err) => {
                    warn!("content fetch failed for note {}: {err}", entry.note_id);
                }
            }
        }
        cards
    }

    /// Full-deck random sample: gather candidate note ids, shuffle, then walk
    /// notes resolving models and template ordinals until `target_count`
    /// cards are built. If the template filter empties the result, retry once
    /// with filtering disabled rather than presenting a blank deck.
    fn roam_cards(&self, deck_id: DeckId, target_count: usize, ignore_filter: bool) -> Vec<Card> {
        let mut result = Vec::new();
        if deck_id < 0 {
            return result;
        }
        let mut note_ids = match self
            .provider
            .list_note_ids_in_deck(deck_id, self.settings.roam_sample_limit)
        {
            Ok(note_ids) => note_ids,
            Err(err) => {
                warn!("note listing failed for deck {deck_id}: {err}");
                return result;
            }
        };
        if note_ids.is_empty() {
            return result;
        }

        let mut rng = rand::rng();
        note_ids.shuffle(&mut rng);
        let allow =
            if ignore_filter { HashSet::new() } else { self.allow_list(deck_id) };
        let mut template_counts: HashMap<ModelId, usize> = HashMap::new();

        for note_id in &note_ids {
            if result.len() >= target_count {
                break;
            }
            let model_id = match self.provider.resolve_model_id(*note_id) {
                Ok(Some(model_id)) => model_id,
                _ => continue,
            };
            let num_templates = match template_counts.get(&model_id) {
                Some(count) => *count,
                None => {
                    let count =
                        self.provider.model_template_count(model_id).unwrap_or_default();
                    template_counts.insert(model_id, count);
                    count
                }
            };
            if num_templates == 0 {
                continue;
            }

            let mut ords: Vec<u16> = (0..num_templates as u16)
                .filter(|ord| filter::passes(&allow, TemplateKey::new(model_id, *ord)))
                .collect();
            if ords.is_empty() {
                continue;
            }
            ords.shuffle(&mut rng);

            for ord in ords {
                if result.len() >= target_count {
                    break;
                }
                match self.provider.fetch_card_content(*note_id, ord) {
                    Ok(Some(content)) => {
                        let entry = ReviewEntry {
                            note_id: *note_id,
                            card_ord: ord,
                            button_count: 0,
                            media_files: Vec::new(),
                            next_intervals: Vec::new(),
                            deck_id: Some(deck_id),
                        };
                        result.push(build_card(deck_id, model_id, &entry, content));
                    }
                    Ok(None) => {
                        debug!("no card for note {note_id} ord {ord}; skipping");
                    }
                    Err(err) => {
                        warn!("content fetch failed for note {note_id} ord {ord}: {err}");
                    }
                }
            }
        }

        debug!(
            "roam built {} cards for deck {deck_id} (ignore_filter={ignore_filter})",
            result.len()
        );
        if result.is_empty() && !ignore_filter && !self.settings.template_filter().is_empty() {
            warn!("no roam cards matched template filter; retrying unfiltered");
            return self.roam_cards(deck_id, target_count, true);
        }
        result
    }

    /// One extension candidate for the cache's forward boundary. `None` when
    /// every candidate is already cached, so the cursor stays put instead of
    /// the window growing a duplicate.
    pub fn fetch_one_more(&self, deck_id: DeckId, cache: &RandomCache) -> Option<Card> {
        let candidates = if cache.source_mode() == SourceMode::RandomQueue
            && !cache.roam_fallback_active()
        {
            let allow = self.allow_list(deck_id);
            let mut cards = self.queue_cards(deck_id, self.settings.queue_sample_limit, &allow);
            let mut rng = rand::rng();
            cards.shuffle(&mut rng);
            cards
        } else {
            self.roam_cards(deck_id, EXTEND_BATCH, false)
        };
        candidates.into_iter().find(|card| !cache.contains(card))
    }

    fn allow_list(&self, deck_id: DeckId) -> HashSet<TemplateKey> {
        filter::effective_allow_list(self.provider, deck_id, &self.settings.template_filter())
    }
}

fn build_card(
    deck_id: DeckId,
    model_id: ModelId,
    entry: &ReviewEntry,
    content: crate::provider::CardContent,
) -> Card {
    let mut card = Card::new(deck_id, entry.note_id, entry.card_ord);
    card.model_id = model_id;
    card.question = content.question;
    card.answer = content.answer;
    card.plain_question = content.question_plain;
    card.plain_answer = content.answer_plain;
    card.button_count = entry.button_count;
    card.media_files = entry.media_files.clone();
    card.next_intervals = entry.next_intervals.clone();
    card
}
