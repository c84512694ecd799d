use crate::deadline::Deadline;
use crate::entity_cache::EntityCache;
use anyhow::Result;
use chrono::Utc;
use ems_domain::{NearbySetResult, NearbySystem, RegionId, SystemId, SystemNode};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{event, Level};

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseScanOutcome {
    pub nearby_set: NearbySetResult,
    /// The deadline passed before the frontier was exhausted.
    pub partial: bool,
    /// Number of systems reached, including those dropped by the security filter.
    pub visited: usize,
}

/// A system fetched during traversal, with its region when it passes the security filter.
struct FetchedSystem {
    node: SystemNode,
    region_id: Option<RegionId>,
}

async fn fetch_system(entity_cache: &EntityCache, system_id: SystemId, min_security: f64) -> Result<FetchedSystem> {
    let node = entity_cache.get_system(system_id).await?;
    let region_id = if node.security_status >= min_security {
        entity_cache.region_of(&node).await?
    } else {
        None
    };
    Ok(FetchedSystem { node, region_id })
}

/// Breadth-first search over the stargate graph, starting at `start`.
///
/// Systems at depth `max_jumps` are included but not expanded. The first time a system is reached
/// fixes its jump count, which is therefore the shortest hop count. After traversal every visited
/// system below `min_security` is dropped from the result; dropped systems were still traversed.
/// If the deadline passes, traversal stops and the result holds only the systems fetched so far,
/// with `partial` set. No lookups are made after the deadline.
pub async fn scan_nearby_systems(entity_cache: &EntityCache, start: SystemId, max_jumps: u32, min_security: f64, deadline: &Deadline) -> Result<UniverseScanOutcome> {
    let mut jumps_by_system: HashMap<SystemId, u32> = HashMap::from([(start, 0)]);
    let mut visit_order: Vec<SystemId> = vec![start];
    let mut frontier: VecDeque<SystemId> = VecDeque::from([start]);
    let mut fetched: HashMap<SystemId, FetchedSystem> = HashMap::new();
    let mut partial = false;

    event!(Level::DEBUG, "Starting BFS from {} with max_jumps {}", start, max_jumps);

    fetched.insert(start, fetch_system(entity_cache, start, min_security).await?);

    'bfs: while let Some(system_id) = frontier.pop_front() {
        if deadline.is_expired() {
            partial = true;
            break;
        }
        let depth = jumps_by_system[&system_id];
        if depth >= max_jumps {
            continue;
        }

        if !fetched.contains_key(&system_id) {
            let system = fetch_system(entity_cache, system_id, min_security).await?;
            fetched.insert(system_id, system);
        }
        let stargate_ids = fetched.get(&system_id).map(|s| s.node.stargate_ids().to_vec()).unwrap_or_default();

        for stargate_id in stargate_ids {
            if deadline.is_expired() {
                partial = true;
                break 'bfs;
            }
            let gate = entity_cache.get_stargate(stargate_id).await?;
            let Some(destination) = gate.destination_system_id() else {
                continue;
            };
            if !jumps_by_system.contains_key(&destination) {
                jumps_by_system.insert(destination, depth + 1);
                visit_order.push(destination);
                frontier.push_back(destination);
            }
        }
    }

    let mut systems = BTreeMap::new();
    let mut region_to_systems: BTreeMap<_, BTreeSet<SystemId>> = BTreeMap::new();
    for system_id in visit_order.iter().copied() {
        let system = match fetched.remove(&system_id) {
            Some(system) => system,
            None if partial || deadline.is_expired() => {
                partial = true;
                continue;
            }
            None => fetch_system(entity_cache, system_id, min_security).await?,
        };
        let FetchedSystem { node, region_id } = system;
        if node.security_status < min_security {
            event!(Level::TRACE, "Dropping {} ({}): security {:.2} < {}", node.name, system_id, node.security_status, min_security);
            continue;
        }
        if let Some(region_id) = region_id {
            region_to_systems.entry(region_id).or_default().insert(system_id);
        }
        systems.insert(
            system_id,
            NearbySystem {
                name: Some(node.name),
                security: node.security_status,
                region_id,
                jumps: jumps_by_system[&system_id],
            },
        );
    }

    event!(
        Level::DEBUG,
        "BFS from {} done: visited {}, kept {}, regions {}, partial {}",
        start,
        visit_order.len(),
        systems.len(),
        region_to_systems.len(),
        partial
    );

    Ok(UniverseScanOutcome {
        nearby_set: NearbySetResult {
            start_system_id: start,
            max_jumps,
            min_security,
            generated_at: Utc::now(),
            systems,
            region_to_systems,
        },
        partial,
        visited: visit_order.len(),
    })
}
