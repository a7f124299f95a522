pub mod api;
pub mod events;
pub mod models;

/// Number of chat messages replayed in a room snapshot.
pub const MAX_CHAT_HISTORY: u32 = 100;
