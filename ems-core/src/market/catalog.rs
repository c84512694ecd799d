use crate::esi_client::EsiClientTrait;
use crate::pagination::fetch_all_pages;
use crate::scan::scan_error::ScanError;
use chrono::Utc;
use ems_domain::{RegionId, TypeId};
use ems_store::{CatalogBmcTrait, CatalogEntry};
use tracing::{debug, event, Level};

/// Tradable item ids of `region_id`. Served from the store when present, unless `refresh` is set.
/// A fresh download walks the listing up to `max_pages` (0 means all pages) and replaces the
/// stored entry.
pub async fn region_types(client: &dyn EsiClientTrait, catalog_bmc: &dyn CatalogBmcTrait, region_id: RegionId, max_pages: u32, refresh: bool) -> Result<Vec<TypeId>, ScanError> {
    if !refresh {
        if let Some(entry) = catalog_bmc.get_region_types(region_id).await.map_err(ScanError::Storage)? {
            debug!("Catalog cache hit for region {}: {} types", region_id, entry.types.len());
            return Ok(entry.types);
        }
    }

    let types = fetch_all_pages(max_pages, |page| client.list_market_types_page(region_id, page))
        .await
        .map_err(ScanError::Transport)?;
    event!(Level::DEBUG, "Downloaded catalog of region {}: {} types", region_id, types.len());

    catalog_bmc
        .save_region_types(&CatalogEntry {
            region_id,
            fetched_at: Utc::now(),
            types: types.clone(),
        })
        .await
        .map_err(ScanError::Storage)?;
    Ok(types)
}
