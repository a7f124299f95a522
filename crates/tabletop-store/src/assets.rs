use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use tabletop_db::Database;
use tabletop_db::models::AssetRow;
use tabletop_types::models::Asset;

use crate::clock::Clock;
use crate::convert::{asset_from_row, format_time};

/// An uploaded file that has already been written to storage.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub id: Uuid,
    pub room_id: Uuid,
    pub uploaded_by: Uuid,
    pub filename: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

#[derive(Clone)]
pub struct AssetCatalog {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl AssetCatalog {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn record(&self, asset: NewAsset) -> Result<Asset> {
        let row = AssetRow {
            id: asset.id.to_string(),
            room_id: asset.room_id.to_string(),
            filename: asset.filename,
            storage_path: asset.storage_path,
            mime_type: asset.mime_type,
            size_bytes: i64::try_from(asset.size_bytes)?,
            uploaded_by: asset.uploaded_by.to_string(),
            created_at: format_time(self.clock.now()),
        };
        self.db
            .call(move |db| {
                db.insert_asset(&row)?;
                asset_from_row(row)
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Asset>> {
        self.db
            .call(move |db| db.get_asset(&id.to_string())?.map(asset_from_row).transpose())
            .await
    }
}
