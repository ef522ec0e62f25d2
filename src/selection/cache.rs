//! Bounded in-memory window of candidate cards with a cursor, so that
//! prev/next navigation does not re-scan the deck on every keypress.
//!
//! Process-lifetime state: never persisted, rebuilt from the provider on any
//! cache miss. Losing it only costs a refetch.

use rand::{
    seq::SliceRandom,
    Rng,
};

use crate::core::{
    Card,
    SourceMode,
};

pub struct RandomCache {
    cards: Vec<Card>,
    /// `None` iff `cards` is empty; otherwise always within bounds.
    cursor: Option<usize>,
    source_mode: SourceMode,
    roam_fallback_active: bool,
    last_observed_queue_size: usize,
}

impl RandomCache {
    pub fn new() -> Self {
        RandomCache {
            cards: Vec::new(),
            cursor: None,
            source_mode: SourceMode::RandomQueue,
            roam_fallback_active: false,
            last_observed_queue_size: 0,
        }
    }

    /// Replaces the whole window with a uniform sample of `source` of at most
    /// `target_size` entries and resets the cursor to the front.
    pub fn rebuild<R: Rng>(
        &mut self,
        mut source: Vec<Card>,
        target_size: usize,
        source_mode: SourceMode,
        roam_fallback_active: bool,
        observed_queue_size: usize,
        rng: &mut R,
    ) {
        source.shuffle(rng);
        source.truncate(target_size);
        self.cursor = if source.is_empty() { None } else { Some(0) };
        self.cards = source;
        self.source_mode = source_mode;
        self.roam_fallback_active = roam_fallback_active;
        self.last_observed_queue_size = observed_queue_size;
    }

    pub fn clear(&mut self) {
        self.cards.clear();
        self.cursor = None;
        self.roam_fallback_active = false;
        self.last_observed_queue_size = 0;
    }

    pub fn current(&self) -> Option<&Card> {
        self.cursor.and_then(|index| self.cards.get(index))
    }

    /// Moves the cursor by `delta`, clamped at the low boundary. At the high
    /// boundary moving forward, `extend` is asked for one more candidate to
    /// append so "next" stays productive; if it yields nothing the cursor
    /// stays put.
    pub fn advance<F>(&mut self, delta: i32, extend: F) -> Option<&Card>
    where
        F: FnOnce() -> Option<Card>,
    {
        let cursor = self.cursor?;
        if delta < 0 {
            self.cursor = Some(cursor.saturating_sub(delta.unsigned_abs() as usize));
        } else if delta > 0 {
            let target = cursor + delta as usize;
            if target < self.cards.len() {
                self.cursor = Some(target);
            } else if let Some(card) = extend() {
                self.cards.push(card);
                self.cursor = Some(self.cards.len() - 1);
            }
        }
        self.current()
    }

    pub fn at_first(&self) -> bool {
        self.cursor == Some(0)
    }

    pub fn at_last(&self) -> bool {
        match self.cursor {
            Some(index) => index + 1 == self.cards.len(),
            None => true,
        }
    }

    pub fn contains(&self, card: &Card) -> bool {
        self.cards.iter().any(|c| c.identity() == card.identity())
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source_mode
    }

    /// True when this window was built by degrading a queue sample into a
    /// full-deck roam.
    pub fn roam_fallback_active(&self) -> bool {
        self.roam_fallback_active
    }

    pub fn last_observed_queue_size(&self) -> usize {
        self.last_observed_queue_size
    }
}

impl Default for RandomCache {
    fn default() -> Self {
        Self::new()
    }
}
