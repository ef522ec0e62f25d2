//! The session context binding one provider, one state store and one set of
//! settings together with the process-wide mutable state (random cache,
//! pending-confirmation marker). The mutex here is the single mutual
//! exclusion domain for all selection and response operations: overlapping
//! triggers serialize, they never interleave.

use std::sync::Mutex;

use log::warn;

use super::{
    cache::RandomCache,
    filter,
    responder::{
        RespondOutcome,
        ReviewResponder,
    },
    selector::Selector,
};
use crate::{
    core::{
        Card,
        DeckId,
        Ease,
        SourceMode,
        StoredSelection,
        TemplateOption,
    },
    persistence::StateStore,
    provider::{
        self,
        ProviderGateway,
    },
    settings::CompanionSettings,
};

struct SessionState {
    cache: RandomCache,
    awaiting_confirm: bool,
}

pub struct CompanionSession<P: ProviderGateway, S: StateStore> {
    provider: P,
    store: S,
    settings: CompanionSettings,
    state: Mutex<SessionState>,
}

impl<P: ProviderGateway, S: StateStore> CompanionSession<P, S> {
    pub fn new(provider: P, store: S, settings: CompanionSettings) -> Self {
        CompanionSession {
            provider,
            store,
            settings,
            state: Mutex::new(SessionState {
                cache: RandomCache::new(),
                awaiting_confirm: false,
            }),
        }
    }

    pub fn settings(&self) -> &CompanionSettings {
        &self.settings
    }

    /// Swaps settings and drops the cache, which was built under the old
    /// ones.
    pub fn set_settings(&mut self, settings: CompanionSettings) {
        self.settings = settings;
        if let Ok(mut state) = self.state.lock() {
            state.cache.clear();
        }
    }

    fn selector(&self) -> Selector<'_> {
        Selector { provider: &self.provider, store: &self.store, settings: &self.settings }
    }

    /// Next card for a deck under an explicit mode. `None` is "no card
    /// available", an ordinary outcome.
    pub fn select_for_deck(&self, deck_id: DeckId, mode: SourceMode) -> Option<Card> {
        let mut state = self.lock_state()?;
        self.selector().select_for_deck(&mut state.cache, deck_id, mode)
    }

    /// Re-selects for the stored deck under the configured mode; what a
    /// periodic refresh trigger calls.
    pub fn refresh(&self) -> Option<Card> {
        let stored = self.store.get()?;
        self.select_for_deck(stored.deck_id, self.settings.source_mode)
    }

    /// Steps the random cache cursor backwards or forwards.
    pub fn advance_random_cache(&self, delta: i32) -> Option<Card> {
        let stored = self.store.get()?;
        let mut state = self.lock_state()?;
        self.selector().advance_cache(&mut state.cache, stored.deck_id, delta)
    }

    /// Applies a grading action to the current selection.
    pub fn respond(&self, ease: Ease) -> RespondOutcome {
        let Some(mut state) = self.lock_state() else {
            return RespondOutcome::NoSelection;
        };
        let SessionState { cache, awaiting_confirm } = &mut *state;
        let responder = ReviewResponder { selector: self.selector() };
        responder.respond(cache, awaiting_confirm, ease)
    }

    pub fn template_options_for_deck(&self, deck_id: DeckId) -> Vec<TemplateOption> {
        filter::template_options_for_deck(&self.provider, deck_id)
    }

    pub fn resolve_deck_id(&self, name: &str) -> Option<DeckId> {
        provider::resolve_deck_id(&self.provider, &self.settings.deck_refs, name)
    }

    pub fn stored_selection(&self) -> Option<StoredSelection> {
        self.store.get()
    }

    /// Whether the last response left a "confirm again" prompt pending.
    pub fn awaiting_confirm(&self) -> bool {
        self.state.lock().map(|state| state.awaiting_confirm).unwrap_or(false)
    }

    /// Diagnostic view of the cache: (length, roam fallback active).
    pub fn cache_stats(&self) -> (usize, bool) {
        self.state
            .lock()
            .map(|state| (state.cache.len(), state.cache.roam_fallback_active()))
            .unwrap_or((0, false))
    }

    fn lock_state(&self) -> Option<std::sync::MutexGuard<'_, SessionState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!("session state poisoned: {err}");
                None
            }
        }
    }
}
