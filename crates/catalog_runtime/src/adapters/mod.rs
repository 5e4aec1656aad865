pub mod callback;
pub mod content_store;
