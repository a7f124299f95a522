//! Service objects over the database: the room directory, the canvas object
//! store, the chat/roll log and the asset catalog, plus on-disk asset storage.
//! Each is constructed once with its injected `Database` and `Clock` and
//! shared by reference.

pub mod assets;
pub mod canvas;
pub mod chat;
pub mod clock;
mod convert;
pub mod rooms;
pub mod storage;

pub use assets::{AssetCatalog, NewAsset};
pub use canvas::CanvasStore;
pub use chat::ChatLog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use rooms::RoomDirectory;
pub use storage::AssetStorage;
