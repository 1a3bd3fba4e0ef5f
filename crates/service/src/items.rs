use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{fs, sync::RwLock};
use uuid::Uuid;

use crate::errors::{ServiceFailure, ServiceResult};

/// One catalog row, the unit the purchasing pipeline consumes.
/// - item_code: stable identifier from the stock export
/// - risk_level: `Low|Medium|High|N/A`
/// - wks_to_oos: weeks until out-of-stock at current demand
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemRecord {
    pub id: Uuid,
    pub item_code: String,
    pub item_name: String,
    pub risk_level: String,
    pub current_stock: Option<f64>,
    pub wks_to_oos: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Create input: no id/created_at, those are generated server-side.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemInput {
    pub item_code: String,
    pub item_name: String,
    #[serde(default = "default_risk_level")]
    pub risk_level: String,
    #[serde(default)]
    pub current_stock: Option<f64>,
    #[serde(default)]
    pub wks_to_oos: Option<f64>,
}

fn default_risk_level() -> String {
    "N/A".to_string()
}

/// File storage: the item catalog persisted as one JSON file.
/// Shape validation happens at the HTTP boundary; this store only enforces
/// domain invariants (unique item_code).
#[derive(Clone)]
pub struct ItemStore {
    inner: Arc<RwLock<HashMap<Uuid, ItemRecord>>>,
    file_path: PathBuf,
}

impl ItemStore {
    /// Initialize the store; creates an empty file when none exists.
    pub async fn new<P: Into<PathBuf>>(path: P) -> ServiceResult<Arc<Self>> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.ok();
        }
        let map: HashMap<Uuid, ItemRecord> = match fs::read(&file_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => {
                let empty: HashMap<Uuid, ItemRecord> = HashMap::new();
                fs::write(&file_path, serde_json::to_vec(&empty).map_err(ServiceFailure::internal)?)
                    .await
                    .map_err(ServiceFailure::internal)?;
                empty
            }
        };
        Ok(Arc::new(Self { inner: Arc::new(RwLock::new(map)), file_path }))
    }

    async fn save(&self) -> ServiceResult<()> {
        let map = self.inner.read().await;
        let data = serde_json::to_vec(&*map).map_err(ServiceFailure::internal)?;
        fs::write(&self.file_path, data).await.map_err(ServiceFailure::internal)?;
        Ok(())
    }

    pub async fn list(&self) -> Vec<ItemRecord> {
        let map = self.inner.read().await;
        let mut items: Vec<ItemRecord> = map.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.item_code.cmp(&b.item_code)));
        items
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<ItemRecord> {
        let map = self.inner.read().await;
        map.get(&id).cloned().ok_or_else(|| ServiceFailure::not_found("item"))
    }

    /// Create a new item. Duplicate item_code is an expected domain failure.
    pub async fn create(&self, input: ItemInput) -> ServiceResult<ItemRecord> {
        let rec = ItemRecord {
            id: Uuid::new_v4(),
            item_code: input.item_code,
            item_name: input.item_name,
            risk_level: input.risk_level,
            current_stock: input.current_stock,
            wks_to_oos: input.wks_to_oos,
            created_at: Utc::now(),
        };
        let mut map = self.inner.write().await;
        if map.values().any(|r| r.item_code == rec.item_code) {
            return Err(ServiceFailure::Validation(format!(
                "item_code {} already exists",
                rec.item_code
            )));
        }
        map.insert(rec.id, rec.clone());
        drop(map);
        self.save().await?;
        Ok(rec)
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<bool> {
        let mut map = self.inner.write().await;
        let existed = map.remove(&id).is_some();
        drop(map);
        self.save().await?;
        Ok(existed)
    }
}
