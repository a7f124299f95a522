use std::sync::Arc;

use tabletop_store::{AssetCatalog, AssetStorage, RoomDirectory};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub rooms: RoomDirectory,
    pub assets: AssetCatalog,
    pub storage: AssetStorage,
    pub max_upload_bytes: usize,
}
