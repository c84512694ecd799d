pub mod universe_scanner;

use crate::deadline::Deadline;
use crate::entity_cache::EntityCache;
use crate::scan::scan_error::ScanError;
use crate::universe::universe_scanner::scan_nearby_systems;
use ems_domain::{NearbySetKey, NearbySetResult};
use ems_store::NearbySetBmcTrait;
use tracing::{debug, event, Level};

/// Serves the nearby-set for `key` from the store, or runs a fresh BFS.
///
/// Returns the set and whether the BFS was cut short by the deadline. Partial sets are not
/// stored, so the next scan with the same key will retry the full traversal.
pub async fn load_or_scan_nearby_set(
    nearby_set_bmc: &dyn NearbySetBmcTrait,
    entity_cache: &EntityCache,
    key: &NearbySetKey,
    refresh: bool,
    deadline: &Deadline,
) -> Result<(NearbySetResult, bool), ScanError> {
    if !refresh {
        if let Some(cached) = nearby_set_bmc.get(key).await.map_err(ScanError::Storage)? {
            debug!("Nearby-set cache hit for {:?}: {} systems", key, cached.systems.len());
            return Ok((cached, false));
        }
    }

    event!(Level::DEBUG, "Nearby-set cache miss for {:?} (refresh: {})", key, refresh);
    let outcome = scan_nearby_systems(entity_cache, key.start_system_id, key.max_jumps, key.min_security, deadline)
        .await
        .map_err(ScanError::Transport)?;

    if !outcome.partial {
        nearby_set_bmc.put(&outcome.nearby_set).await.map_err(ScanError::Storage)?;
    }
    Ok((outcome.nearby_set, outcome.partial))
}
