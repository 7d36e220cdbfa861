//! The asset list as a view holds it between loads.
//!
//! Loads are ticketed so that a slow response for an older query never
//! overwrites a newer one. Deletes and disposals are applied to the list
//! before the server answers and undone if the call fails.

use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{ApiError, InventoryClient, RequestGeneration};
use crate::models::{Asset, AssetQuery, AssetStatus, Page};

use super::optimistic::OptimisticList;

#[derive(Default)]
struct ViewState {
    list: OptimisticList<Asset>,
    page: u32,
    size: u32,
    total_pages: u32,
}

pub struct AssetListView {
    inventory: InventoryClient,
    loads: RequestGeneration,
    state: Mutex<ViewState>,
}

impl AssetListView {
    pub fn new(inventory: InventoryClient) -> Self {
        Self {
            inventory,
            loads: RequestGeneration::new(),
            state: Mutex::new(ViewState::default()),
        }
    }

    /// Fetch a page and show it, unless a newer load started meanwhile.
    ///
    /// Returns the page that was applied, or `None` when it was superseded.
    pub async fn load(&self, query: &AssetQuery) -> Result<Option<Page<Asset>>, ApiError> {
        let ticket = self.loads.begin();
        let page = self.inventory.list_assets(query).await?;

        let mut state = self.state.lock().await;
        match self.loads.apply(ticket, page) {
            Some(page) => {
                state.replace(page.clone());
                Ok(Some(page))
            }
            None => {
                debug!(page = query.page.page, "Discarding superseded asset page");
                Ok(None)
            }
        }
    }

    /// Show a page obtained elsewhere (e.g. the offline cache)
    pub async fn show(&self, page: Page<Asset>) {
        self.loads.invalidate();
        self.state.lock().await.replace(page);
    }

    /// Drop any load still in flight
    pub fn close(&self) {
        self.loads.invalidate();
    }

    /// Current contents, including unconfirmed edits
    pub async fn page(&self) -> Page<Asset> {
        let state = self.state.lock().await;
        Page {
            content: state.list.items().to_vec(),
            total_elements: state.list.total(),
            total_pages: state.total_pages,
            page: state.page,
            size: state.size,
        }
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        let undo = self.state.lock().await.list.remove_optimistic(id);

        match self.inventory.delete_asset(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some(undo) = undo {
                    debug!(id, "Delete failed, restoring asset");
                    self.state.lock().await.list.rollback(undo);
                }
                Err(e)
            }
        }
    }

    /// Mark the asset retired right away; the server's copy replaces it on success
    pub async fn dispose(&self, id: i64, reason: Option<&str>) -> Result<Asset, ApiError> {
        let undo = {
            let mut state = self.state.lock().await;
            state.list.get(id).cloned().and_then(|mut asset| {
                asset.status = Some(AssetStatus::Retired);
                state.list.replace_optimistic(asset)
            })
        };

        match self.inventory.dispose_asset(id, reason).await {
            Ok(asset) => {
                // Nothing to undo once the server has answered
                let _ = self.state.lock().await.list.replace_optimistic(asset.clone());
                Ok(asset)
            }
            Err(e) => {
                if let Some(undo) = undo {
                    debug!(id, "Dispose failed, restoring asset");
                    self.state.lock().await.list.rollback(undo);
                }
                Err(e)
            }
        }
    }
}

impl ViewState {
    fn replace(&mut self, page: Page<Asset>) {
        self.page = page.page;
        self.size = page.size;
        self.total_pages = page.total_pages;
        self.list = OptimisticList::from_page(page);
    }
}
