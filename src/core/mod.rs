pub mod errors;
pub mod models;
pub mod text;

pub use errors::CompanionError;
pub use models::{
    now_millis,
    Card,
    DeckId,
    Ease,
    ModelId,
    NoteId,
    SourceMode,
    StoredSelection,
    TemplateKey,
    TemplateOption,
    NONE_ID,
    NO_CARD_ORD,
};
