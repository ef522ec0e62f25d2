pub mod cache;
pub mod filter;
pub mod responder;
pub mod selector;
pub mod session;

#[cfg(test)]
mod selection_tests;

pub use cache::RandomCache;
pub use responder::{
    RespondOutcome,
    ReviewResponder,
};
pub use selector::Selector;
pub use session::CompanionSession;
