//! Applies a graded response to the currently displayed card, handling the
//! races where the provider's queue has moved on underneath us. Nothing here
//! is fatal: every bad outcome degrades to "re-select and ask the user to
//! confirm again".

use std::{
    thread,
    time::Duration,
};

use log::{
    info,
    warn,
};

use super::{
    cache::RandomCache,
    selector::Selector,
};
use crate::core::{
    Card,
    Ease,
    NoteId,
    SourceMode,
};

/// What a grading action produced. `None` cards mean "deck is done", an
/// expected state for a rendering collaborator to show.
#[derive(Debug, Clone, PartialEq)]
pub enum RespondOutcome {
    /// No stored selection exists at all; nothing to grade or navigate.
    NoSelection,
    /// The stored selection was the no-card sentinel; a fresh selection was
    /// made instead of grading.
    Reselected(Option<Card>),
    /// Non-review mode: the action was routed to cache navigation.
    Navigated(Option<Card>),
    /// The provider's top of queue no longer matches what was on screen. The
    /// new top is now stored; the user should confirm against it.
    CardChanged(Option<Card>),
    /// The provider rejected the submission; state was refreshed to a
    /// fallback card (or the sentinel).
    RefreshedAfterFailure(Option<Card>),
    /// Review submitted and the next card selected.
    Graded(Option<Card>),
    /// Review submitted but the provider still reports the same card after
    /// the bounded re-check; the user should confirm again.
    Unchanged(Option<Card>),
}

impl RespondOutcome {
    /// Whether the action ended in a state that needs the user to tap again.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, RespondOutcome::CardChanged(_) | RespondOutcome::Unchanged(_))
    }

    pub fn card(&self) -> Option<&Card> {
        match self {
            RespondOutcome::NoSelection => None,
            RespondOutcome::Reselected(card)
            | RespondOutcome::Navigated(card)
            | RespondOutcome::CardChanged(card)
            | RespondOutcome::RefreshedAfterFailure(card)
            | RespondOutcome::Graded(card)
            | RespondOutcome::Unchanged(card) => card.as_ref(),
        }
    }
}

pub struct ReviewResponder<'a> {
    pub selector: Selector<'a>,
}

impl ReviewResponder<'_> {
    pub fn respond(
        &self,
        cache: &mut RandomCache,
        awaiting_confirm: &mut bool,
        ease: Ease,
    ) -> RespondOutcome {
        let Some(stored) = self.selector.store.get() else {
            warn!("no stored selection; ignoring grade");
            return RespondOutcome::NoSelection;
        };
        let mode = self.selector.settings.source_mode;

        if !stored.has_card() {
            *awaiting_confirm = false;
            let card = self.selector.select_for_deck(cache, stored.deck_id, mode);
            return RespondOutcome::Reselected(card);
        }

        // In the random modes the grade buttons are repurposed as navigation:
        // "again" steps back, everything else steps forward. No review is
        // submitted.
        if mode != SourceMode::Review {
            let delta = if ease == Ease::Again { -1 } else { 1 };
            let card = self.selector.advance_cache(cache, stored.deck_id, delta);
            return RespondOutcome::Navigated(card);
        }

        let identity = match stored.identity() {
            Some(identity) => identity,
            None => return RespondOutcome::NoSelection,
        };

        // Never grade a card the provider's queue no longer considers
        // current. Sync with the true top first; on mismatch, store it and
        // ask the user to confirm against the new card.
        if let Some(top) = self.selector.peek_top(stored.deck_id) {
            if top.identity() != identity {
                warn!(
                    "top of queue changed (was {:?}, now {:?}); confirm again",
                    identity,
                    top.identity()
                );
                self.selector
                    .store
                    .put(&crate::core::StoredSelection::for_card(stored.deck_id, &top));
                *awaiting_confirm = true;
                return RespondOutcome::CardChanged(Some(top));
            }
        }

        let elapsed = stored.elapsed_millis(crate::core::now_millis());
        let submitted =
            self.selector.provider.submit_review(stored.note_id, identity.1, ease, elapsed);
        if !submitted {
            warn!("review submission rejected; refreshing selection");
            let card = self.selector.select_for_deck(cache, stored.deck_id, SourceMode::Review);
            *awaiting_confirm = false;
            return RespondOutcome::RefreshedAfterFailure(card);
        }

        *awaiting_confirm = false;
        let next = self.selector.select_for_deck(cache, stored.deck_id, SourceMode::Review);
        if next.as_ref().map(Card::identity) != Some(identity) {
            return RespondOutcome::Graded(next);
        }

        // The provider accepted the grade but has not advanced its queue yet
        // (it is eventually consistent). Exactly one bounded re-check; if a
        // newer operation supersedes this one while we wait, its state wins.
        self.recheck_after_delay(cache, stored.deck_id, identity, next, awaiting_confirm)
    }

    fn recheck_after_delay(
        &self,
        cache: &mut RandomCache,
        deck_id: crate::core::DeckId,
        identity: (NoteId, u16),
        next: Option<Card>,
        awaiting_confirm: &mut bool,
    ) -> RespondOutcome {
        let delay = self.selector.settings.recheck_delay_ms;
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay));
        }

        // Logical-clock guard: if the stored selection no longer carries the
        // identity captured at schedule time, a newer operation already moved
        // things along and this re-check's result is discarded.
        let latest = self.selector.store.get();
        if latest.as_ref().and_then(|s| s.identity()) != Some(identity) {
            info!("delayed re-check superseded; discarding");
            return RespondOutcome::Graded(next);
        }

        let again = self.selector.select_for_deck(cache, deck_id, SourceMode::Review);
        if again.as_ref().map(Card::identity) != Some(identity) {
            return RespondOutcome::Graded(again);
        }
        warn!("queue unchanged after grading; confirm again");
        *awaiting_confirm = true;
        RespondOutcome::Unchanged(again)
    }
}
