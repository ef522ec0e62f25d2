//! End-to-end selection and grading behavior against an in-memory provider.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

use super::{
    responder::RespondOutcome,
    session::CompanionSession,
};
use crate::{
    core::{
        CompanionError,
        DeckId,
        Ease,
        ModelId,
        NoteId,
        SourceMode,
        StoredSelection,
    },
    persistence::{
        MemoryStateStore,
        StateStore,
    },
    provider::{
        CardContent,
        ModelInfo,
        ProviderGateway,
        ReviewEntry,
    },
    settings::CompanionSettings,
};

const DECK: DeckId = 1;

#[derive(Default)]
struct FakeInner {
    permission: bool,
    decks: HashMap<DeckId, String>,
    queue: Vec<ReviewEntry>,
    note_models: HashMap<NoteId, ModelId>,
    models: HashMap<ModelId, ModelInfo>,
    contents: HashMap<(NoteId, u16), CardContent>,
    deck_notes: HashMap<DeckId, Vec<NoteId>>,
    submit_ok: bool,
    advance_queue_on_submit: bool,
    fail_review_page: bool,
    submitted: Vec<(NoteId, u16, u8, i64)>,
}

#[derive(Clone)]
struct FakeProvider {
    inner: Arc<Mutex<FakeInner>>,
}

impl FakeProvider {
    fn new() -> Self {
        let provider = FakeProvider { inner: Arc::new(Mutex::new(FakeInner::default())) };
        {
            let mut inner = provider.lock();
            inner.permission = true;
            inner.submit_ok = true;
            inner.decks.insert(DECK, "Japanese".to_string());
        }
        provider
    }

    fn lock(&self) -> MutexGuard<'_, FakeInner> {
        self.inner.lock().unwrap()
    }

    fn add_model(&self, model_id: ModelId, name: &str, template_count: usize) {
        self.lock()
            .models
            .insert(model_id, ModelInfo { name: name.to_string(), template_count });
    }

    /// Registers a note with content for every template of its model and
    /// makes it discoverable through the deck's note listing.
    fn add_deck_note(&self, deck_id: DeckId, note_id: NoteId, model_id: ModelId) {
        let mut inner = self.lock();
        inner.note_models.insert(note_id, model_id);
        inner.deck_notes.entry(deck_id).or_default().push(note_id);
        let template_count =
            inner.models.get(&model_id).map(|info| info.template_count).unwrap_or(1);
        for ord in 0..template_count as u16 {
            inner.contents.insert((note_id, ord), content_for(note_id, ord));
        }
    }

    /// Appends a card to the back of the review queue.
    fn add_queue_card(&self, deck_id: DeckId, note_id: NoteId, ord: u16, model_id: ModelId) {
        self.add_deck_note(deck_id, note_id, model_id);
        let mut inner = self.lock();
        inner.queue.push(ReviewEntry {
            note_id,
            card_ord: ord,
            button_count: 4,
            media_files: Vec::new(),
            next_intervals: Vec::new(),
            deck_id: Some(deck_id),
        });
        inner.contents.insert((note_id, ord), content_for(note_id, ord));
    }

    fn remove_queue_card(&self, note_id: NoteId, ord: u16) {
        self.lock().queue.retain(|e| !(e.note_id == note_id && e.card_ord == ord));
    }

    fn submissions(&self) -> Vec<(NoteId, u16, u8, i64)> {
        self.lock().submitted.clone()
    }
}

fn content_for(note_id: NoteId, ord: u16) -> CardContent {
    CardContent {
        question: format!("<b>Q{note_id}.{ord}</b>"),
        answer: format!("A{note_id}.{ord}"),
        question_plain: format!("Q{note_id}.{ord}"),
        answer_plain: format!("A{note_id}.{ord}"),
    }
}

impl ProviderGateway for FakeProvider {
    fn permission_granted(&self) -> bool {
        self.lock().permission
    }

    fn list_decks(&self) -> Result<HashMap<DeckId, String>, CompanionError> {
        Ok(self.lock().decks.clone())
    }

    fn deck_name(&self, deck_id: DeckId) -> Result<Option<String>, CompanionError> {
        Ok(self.lock().decks.get(&deck_id).cloned())
    }

    fn fetch_review_page(
        &self,
        deck_id: Option<DeckId>,
        limit: usize,
    ) -> Result<Vec<ReviewEntry>, CompanionError> {
        let inner = self.lock();
        if inner.fail_review_page {
            return Err(CompanionError::Provider("queue unavailable".to_string()));
        }
        Ok(inner
            .queue
            .iter()
            .filter(|entry| deck_id.is_none() || entry.deck_id == deck_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn fetch_card_content(
        &self,
        note_id: NoteId,
        card_ord: u16,
    ) -> Result<Option<CardContent>, CompanionError> {
        Ok(self.lock().contents.get(&(note_id, card_ord)).cloned())
    }

    fn resolve_model_id(&self, note_id: NoteId) -> Result<Option<ModelId>, CompanionError> {
        Ok(self.lock().note_models.get(&note_id).copied())
    }

    fn model_info(&self, model_id: ModelId) -> Result<Option<ModelInfo>, CompanionError> {
        Ok(self.lock().models.get(&model_id).cloned())
    }

    fn list_note_ids_in_deck(
        &self,
        deck_id: DeckId,
        cap: usize,
    ) -> Result<Vec<NoteId>, CompanionError> {
        let inner = self.lock();
        let mut note_ids = inner.deck_notes.get(&deck_id).cloned().unwrap_or_default();
        note_ids.truncate(cap);
        Ok(note_ids)
    }

    fn submit_review(
        &self,
        note_id: NoteId,
        card_ord: u16,
        ease: Ease,
        elapsed_millis: i64,
    ) -> bool {
        let mut inner = self.lock();
        inner.submitted.push((note_id, card_ord, ease.value(), elapsed_millis));
        if !inner.submit_ok {
            return false;
        }
        if inner.advance_queue_on_submit {
            inner.queue.retain(|e| !(e.note_id == note_id && e.card_ord == card_ord));
        }
        true
    }
}

fn test_settings() -> CompanionSettings {
    CompanionSettings {
        recheck_delay_ms: 0,
        random_cache_size: 5,
        ..CompanionSettings::default()
    }
}

fn session_with(
    provider: &FakeProvider,
    settings: CompanionSettings,
) -> CompanionSession<FakeProvider, MemoryStateStore> {
    CompanionSession::new(provider.clone(), MemoryStateStore::new(), settings)
}

#[test]
fn review_returns_provider_top_of_queue() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.add_queue_card(DECK, 2, 0, 5);
    let session = session_with(&provider, test_settings());

    let card = session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    assert_eq!(card.identity(), (1, 0));
    assert_eq!(card.display_question(), "<b>Q1.0</b>");

    let stored = session.stored_selection().expect("stored selection");
    assert_eq!(stored.identity(), Some((1, 0)));
    assert_eq!(stored.deck_id, DECK);
}

#[test]
fn review_selection_is_idempotent() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.add_queue_card(DECK, 2, 0, 5);
    let session = session_with(&provider, test_settings());

    let first = session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    let second = session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    assert_eq!(first.identity(), second.identity());
}

#[test]
fn template_filter_excludes_nonmatching_models() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    provider.add_model(9, "Grammar", 1);
    provider.add_queue_card(DECK, 2, 0, 9);
    provider.add_queue_card(DECK, 1, 0, 5);

    let mut settings = test_settings();
    settings.template_filter = vec!["5:0".to_string()];
    let session = session_with(&provider, settings);

    let card = session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    assert_eq!(card.identity(), (1, 0));
    assert_eq!(card.model_id, 5);
}

#[test]
fn overlapping_filter_may_exclude_every_queue_card() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 2);
    provider.add_model(9, "Grammar", 1);
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.add_queue_card(DECK, 2, 0, 9);

    // "5:1" is a real template of this deck, so the filter stays active even
    // though no queued card matches it.
    let mut settings = test_settings();
    settings.template_filter = vec!["5:1".to_string()];
    let session = session_with(&provider, settings);

    assert!(session.select_for_deck(DECK, SourceMode::Review).is_none());
    let stored = session.stored_selection().expect("sentinel stored");
    assert!(!stored.has_card());
    assert_eq!(stored.deck_id, DECK);
}

#[test]
fn filter_without_deck_overlap_fails_open() {
    let provider = FakeProvider::new();
    provider.add_model(9, "Grammar", 1);
    provider.add_queue_card(DECK, 2, 0, 9);

    // The stored filter references a model this deck never uses; applying it
    // would blank the deck, so it is disabled for the call.
    let mut settings = test_settings();
    settings.template_filter = vec!["777:0".to_string()];
    let session = session_with(&provider, settings);

    let card = session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    assert_eq!(card.identity(), (2, 0));
}

#[test]
fn thin_queue_degrades_to_full_deck_roam() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    for note_id in 1..=3 {
        provider.add_queue_card(DECK, note_id, 0, 5);
    }
    for note_id in 4..=8 {
        provider.add_deck_note(DECK, note_id, 5);
    }
    let session = session_with(&provider, test_settings());

    let card = session.select_for_deck(DECK, SourceMode::RandomQueue);
    assert!(card.is_some());
    let (len, roam_fallback) = session.cache_stats();
    assert!(roam_fallback);
    assert_eq!(len, 5);
}

#[test]
fn ample_queue_samples_without_fallback() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    for note_id in 1..=12 {
        provider.add_queue_card(DECK, note_id, 0, 5);
    }
    let session = session_with(&provider, test_settings());

    let card = session.select_for_deck(DECK, SourceMode::RandomQueue);
    assert!(card.is_some());
    let (len, roam_fallback) = session.cache_stats();
    assert!(!roam_fallback);
    assert_eq!(len, 5);
}

#[test]
fn random_queue_refresh_skips_the_card_on_screen() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    for note_id in 1..=12 {
        provider.add_queue_card(DECK, note_id, 0, 5);
    }
    let session = session_with(&provider, test_settings());

    let first = session.select_for_deck(DECK, SourceMode::RandomQueue).expect("a card");
    let second = session.select_for_deck(DECK, SourceMode::RandomQueue).expect("a card");
    assert_ne!(first.identity(), second.identity());
}

#[test]
fn random_queue_with_a_single_candidate_repeats_it() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    provider.add_queue_card(DECK, 1, 0, 5);
    let mut settings = test_settings();
    settings.random_queue_threshold = 1;
    let session = session_with(&provider, settings);

    let first = session.select_for_deck(DECK, SourceMode::RandomQueue).expect("a card");
    let second = session.select_for_deck(DECK, SourceMode::RandomQueue).expect("a card");
    assert_eq!(first.identity(), second.identity());
}

#[test]
fn roam_mode_builds_a_bounded_cache() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    for note_id in 1..=10 {
        provider.add_deck_note(DECK, note_id, 5);
    }
    let session = session_with(&provider, test_settings());

    let card = session.select_for_deck(DECK, SourceMode::RandomRoam);
    assert!(card.is_some());
    let (len, roam_fallback) = session.cache_stats();
    assert_eq!(len, 5);
    assert!(!roam_fallback);
}

#[test]
fn stale_filter_fails_open_in_roam_mode() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    provider.add_queue_card(DECK, 1, 0, 5);
    for note_id in 2..=6 {
        provider.add_deck_note(DECK, note_id, 5);
    }
    // The stored filter references a model this deck never uses.
    let mut settings = test_settings();
    settings.template_filter = vec!["777:0".to_string()];
    let session = session_with(&provider, settings);

    assert!(session.select_for_deck(DECK, SourceMode::RandomRoam).is_some());
    assert_eq!(session.cache_stats().0, 5);
}

#[test]
fn roam_retries_unfiltered_when_the_filter_matches_nothing_fetchable() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 2);
    provider.add_queue_card(DECK, 1, 0, 5);
    {
        let mut inner = provider.lock();
        // No note has a fetchable card for the second template.
        inner.contents.remove(&(1, 1));
        for note_id in 2..=4 {
            inner.note_models.insert(note_id, 5);
            inner.deck_notes.entry(DECK).or_default().push(note_id);
            inner.contents.insert((note_id, 0), content_for(note_id, 0));
        }
    }
    // "5:1" is a real template of the deck, so the filter stays active, but
    // it admits nothing the provider can deliver.
    let mut settings = test_settings();
    settings.template_filter = vec!["5:1".to_string()];
    let session = session_with(&provider, settings);

    let card = session.select_for_deck(DECK, SourceMode::RandomRoam).expect("a card");
    assert_eq!(card.template_ord, 0);
    assert!(session.cache_stats().0 > 0);
}

#[test]
fn advancing_past_the_end_extends_from_the_provider() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    for note_id in 1..=3 {
        provider.add_deck_note(DECK, note_id, 5);
    }
    let mut settings = test_settings();
    settings.random_cache_size = 2;
    let session = session_with(&provider, settings);

    session.select_for_deck(DECK, SourceMode::RandomRoam).expect("a card");
    assert_eq!(session.cache_stats().0, 2);

    session.advance_random_cache(1).expect("second card");
    let extended = session.advance_random_cache(1).expect("extended card");
    assert_eq!(session.cache_stats().0, 3);
    // The extension pulls the one note the window did not already hold.
    assert!((1..=3).contains(&extended.note_id));
}

#[test]
fn advancing_at_the_end_without_new_candidates_keeps_position() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    provider.add_deck_note(DECK, 1, 5);
    provider.add_deck_note(DECK, 2, 5);
    let mut settings = test_settings();
    settings.random_cache_size = 2;
    let session = session_with(&provider, settings);

    session.select_for_deck(DECK, SourceMode::RandomRoam).expect("a card");
    let last = session.advance_random_cache(1).expect("second card");
    // The whole deck is already in the window; "next" must not append a
    // duplicate.
    let stuck = session.advance_random_cache(1).expect("still a card");
    assert_eq!(stuck.identity(), last.identity());
    assert_eq!(session.cache_stats().0, 2);
}

#[test]
fn grading_advances_to_the_next_card() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.add_queue_card(DECK, 2, 0, 5);
    provider.lock().advance_queue_on_submit = true;
    let session = session_with(&provider, test_settings());

    session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    let outcome = session.respond(Ease::Good);

    match outcome {
        RespondOutcome::Graded(Some(next)) => assert_eq!(next.identity(), (2, 0)),
        other => panic!("expected Graded, got {other:?}"),
    }
    let submitted = provider.submissions();
    assert_eq!(submitted.len(), 1);
    assert_eq!((submitted[0].0, submitted[0].1, submitted[0].2), (1, 0, 3));
    assert!(submitted[0].3 >= 0);
    assert!(!session.awaiting_confirm());
}

#[test]
fn grading_a_superseded_card_stores_the_new_top_instead() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.add_queue_card(DECK, 2, 0, 5);
    let session = session_with(&provider, test_settings());

    session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    // The queue moves on behind our back (reviewed on another device).
    provider.remove_queue_card(1, 0);

    let outcome = session.respond(Ease::Good);
    match &outcome {
        RespondOutcome::CardChanged(Some(top)) => assert_eq!(top.identity(), (2, 0)),
        other => panic!("expected CardChanged, got {other:?}"),
    }
    assert!(outcome.needs_confirmation());
    assert!(provider.submissions().is_empty());
    assert_eq!(session.stored_selection().and_then(|s| s.identity()), Some((2, 0)));
    assert!(session.awaiting_confirm());
}

#[test]
fn rejected_submission_refreshes_the_selection() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.lock().submit_ok = false;
    let session = session_with(&provider, test_settings());

    session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    let outcome = session.respond(Ease::Good);

    match outcome {
        RespondOutcome::RefreshedAfterFailure(Some(card)) => {
            assert_eq!(card.identity(), (1, 0));
        }
        other => panic!("expected RefreshedAfterFailure, got {other:?}"),
    }
    assert_eq!(provider.submissions().len(), 1);
    assert_eq!(session.stored_selection().and_then(|s| s.identity()), Some((1, 0)));
}

#[test]
fn rejected_submission_with_a_drained_queue_stores_the_sentinel() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    let session = session_with(&provider, test_settings());

    session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    {
        let mut inner = provider.lock();
        inner.submit_ok = false;
        inner.queue.clear();
    }

    let outcome = session.respond(Ease::Good);
    assert_eq!(outcome, RespondOutcome::RefreshedAfterFailure(None));
    let stored = session.stored_selection().expect("sentinel stored");
    assert!(!stored.has_card());
}

#[test]
fn unchanged_queue_after_grading_asks_for_confirmation() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    let session = session_with(&provider, test_settings());

    session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    // Submission accepted but the provider's queue still reports the same
    // card after the re-check.
    let outcome = session.respond(Ease::Good);

    match &outcome {
        RespondOutcome::Unchanged(Some(card)) => assert_eq!(card.identity(), (1, 0)),
        other => panic!("expected Unchanged, got {other:?}"),
    }
    assert!(outcome.needs_confirmation());
    assert!(session.awaiting_confirm());
    assert_eq!(provider.submissions().len(), 1);
}

#[test]
fn sentinel_selection_reselects_instead_of_grading() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    let store = MemoryStateStore::new();
    store.put(&StoredSelection::empty(DECK));
    let session = CompanionSession::new(provider.clone(), store, test_settings());

    let outcome = session.respond(Ease::Good);
    match outcome {
        RespondOutcome::Reselected(Some(card)) => assert_eq!(card.identity(), (1, 0)),
        other => panic!("expected Reselected, got {other:?}"),
    }
    assert!(provider.submissions().is_empty());
}

#[test]
fn grading_without_any_stored_selection_is_ignored() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    let session = session_with(&provider, test_settings());

    assert_eq!(session.respond(Ease::Good), RespondOutcome::NoSelection);
    assert!(provider.submissions().is_empty());
}

#[test]
fn random_mode_buttons_navigate_instead_of_grading() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 1);
    for note_id in 1..=12 {
        provider.add_queue_card(DECK, note_id, 0, 5);
    }
    let mut settings = test_settings();
    settings.source_mode = SourceMode::RandomQueue;
    let session = session_with(&provider, settings);

    session.select_for_deck(DECK, SourceMode::RandomQueue).expect("a card");
    let forward = session.respond(Ease::Easy);
    assert!(matches!(forward, RespondOutcome::Navigated(Some(_))));
    let back = session.respond(Ease::Again);
    assert!(matches!(back, RespondOutcome::Navigated(Some(_))));
    assert!(provider.submissions().is_empty());
}

#[test]
fn provider_errors_degrade_to_no_card() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.lock().fail_review_page = true;
    let session = session_with(&provider, test_settings());

    assert!(session.select_for_deck(DECK, SourceMode::Review).is_none());
    let stored = session.stored_selection().expect("sentinel stored");
    assert!(!stored.has_card());
}

#[test]
fn missing_permission_yields_no_card_and_no_state_write() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.lock().permission = false;
    let session = session_with(&provider, test_settings());

    assert!(session.select_for_deck(DECK, SourceMode::Review).is_none());
    assert!(session.stored_selection().is_none());
}

#[test]
fn deck_resolution_matches_names_and_remembered_references() {
    let provider = FakeProvider::new();
    let mut settings = test_settings();
    settings.remember_deck("Nihongo", DECK);
    settings.remember_deck("Gone", 99);
    let session = session_with(&provider, settings);

    // Case-insensitive match against the live deck list.
    assert_eq!(session.resolve_deck_id("japanese"), Some(DECK));
    // Renamed deck found through the remembered reference.
    assert_eq!(session.resolve_deck_id("Nihongo"), Some(DECK));
    // A remembered reference that no longer resolves is not trusted.
    assert_eq!(session.resolve_deck_id("Gone"), None);
    assert_eq!(session.resolve_deck_id("Missing"), None);
}

#[test]
fn template_options_enumerate_the_queues_models() {
    let provider = FakeProvider::new();
    provider.add_model(5, "Vocab", 2);
    provider.add_model(9, "Grammar", 1);
    provider.add_queue_card(DECK, 1, 0, 5);
    provider.add_queue_card(DECK, 2, 0, 9);
    let session = session_with(&provider, test_settings());

    let options = session.template_options_for_deck(DECK);
    assert_eq!(options.len(), 3);
    assert_eq!(options[0].display_name(), "Vocab • Template 1");
    assert_eq!(options[1].display_name(), "Vocab • Template 2");
    assert_eq!(options[2].display_name(), "Grammar • Template 1");
}

#[test]
fn refresh_reuses_the_stored_deck() {
    let provider = FakeProvider::new();
    provider.add_queue_card(DECK, 1, 0, 5);
    let session = session_with(&provider, test_settings());

    session.select_for_deck(DECK, SourceMode::Review).expect("a card");
    let refreshed = session.refresh().expect("refreshed card");
    assert_eq!(refreshed.identity(), (1, 0));
}
