//! One-card-at-a-time companion surface over an external spaced-repetition
//! provider: picks the card to show for a deck (live queue order or a bounded
//! random window), remembers what is on screen across restarts, and applies
//! grading actions while tolerating the provider's queue moving underneath.

pub mod core;
pub mod persistence;
pub mod provider;
pub mod selection;
pub mod settings;

pub use crate::{
    core::{
        Card,
        CompanionError,
        DeckId,
        Ease,
        ModelId,
        NoteId,
        SourceMode,
        StoredSelection,
        TemplateKey,
        TemplateOption,
    },
    persistence::{
        JsonStateStore,
        MemoryStateStore,
        StateStore,
    },
    provider::{
        HttpGateway,
        ProviderGateway,
    },
    selection::{
        CompanionSession,
        RandomCache,
        RespondOutcome,
    },
    settings::CompanionSettings,
};
