use crate::esi_client::EsiClientTrait;
use crate::pagination::fetch_all_pages;
use anyhow::Result;
use ems_domain::{MarketOrder, OrderSide, RegionId, SystemId, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{event, Level};

/// The order an aggregation settled on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderQuote {
    pub price: f64,
    pub volume_remain: u64,
    pub system_id: SystemId,
}

/// Orders of `side` that carry a price and a system, as quotes.
fn quotes(orders: &[MarketOrder], side: OrderSide) -> impl Iterator<Item = OrderQuote> + '_ {
    orders.iter().filter(move |o| o.side() == Some(side)).filter_map(|o| match (o.price, o.system_id) {
        (Some(price), Some(system_id)) => Some(OrderQuote {
            price,
            volume_remain: o.volume_remain,
            system_id,
        }),
        _ => None,
    })
}

/// Cheapest sell order located in `system_id`. Ties keep the first order seen.
pub fn cheapest_sell_in_system(orders: &[MarketOrder], system_id: SystemId) -> Option<OrderQuote> {
    quotes(orders, OrderSide::Sell)
        .filter(|q| q.system_id == system_id)
        .fold(None, |best: Option<OrderQuote>, q| match best {
            Some(b) if b.price <= q.price => Some(b),
            _ => Some(q),
        })
}

/// Highest buy order located in any of `systems`. Ties keep the first order seen.
pub fn highest_bid(orders: &[MarketOrder], systems: &BTreeSet<SystemId>) -> Option<OrderQuote> {
    quotes(orders, OrderSide::Buy)
        .filter(|q| systems.contains(&q.system_id))
        .fold(None, |best: Option<OrderQuote>, q| match best {
            Some(b) if b.price >= q.price => Some(b),
            _ => Some(q),
        })
}

/// The sell floor of each system in `systems` (its cheapest sell order), and then the richest of
/// those floors. This is the destination where a new listing has the most room below the
/// competition, which is not the same as the globally cheapest or most expensive sell order.
pub fn richest_sell_floor(orders: &[MarketOrder], systems: &BTreeSet<SystemId>) -> Option<OrderQuote> {
    let mut floors: Vec<OrderQuote> = Vec::new();
    for q in quotes(orders, OrderSide::Sell).filter(|q| systems.contains(&q.system_id)) {
        match floors.iter_mut().find(|f| f.system_id == q.system_id) {
            Some(floor) if q.price < floor.price => *floor = q,
            Some(_) => {}
            None => floors.push(q),
        }
    }

    floors.into_iter().fold(None, |best: Option<OrderQuote>, f| match best {
        Some(b) if b.price >= f.price => Some(b),
        _ => Some(f),
    })
}

async fn region_orders(client: &dyn EsiClientTrait, region_id: RegionId, side: OrderSide, type_id: TypeId, max_pages: u32) -> Result<Vec<MarketOrder>> {
    fetch_all_pages(max_pages, |page| client.list_region_orders_page(region_id, side, type_id, page)).await
}

/// Cheapest ask for `type_id` in the home system, searching the home region's sell orders.
pub async fn cheapest_local_sell(client: &dyn EsiClientTrait, region_id: RegionId, home_system_id: SystemId, type_id: TypeId, max_pages: u32) -> Result<Option<OrderQuote>> {
    let orders = region_orders(client, region_id, OrderSide::Sell, type_id, max_pages).await?;
    Ok(cheapest_sell_in_system(&orders, home_system_id))
}

/// Best opposing order for `type_id` across every system of `region_to_systems`.
///
/// For `Buy` this is the highest bid anywhere. For `Sell` it is the richest per-system sell floor,
/// see [`richest_sell_floor`]. A system only ever belongs to one region, so floors never mix orders
/// of different regions.
pub async fn best_cross_system(
    client: &dyn EsiClientTrait,
    region_to_systems: &BTreeMap<RegionId, BTreeSet<SystemId>>,
    side: OrderSide,
    type_id: TypeId,
    max_pages: u32,
) -> Result<Option<OrderQuote>> {
    let mut orders = Vec::new();
    for region_id in region_to_systems.keys() {
        orders.extend(region_orders(client, *region_id, side, type_id, max_pages).await?);
    }
    let systems: BTreeSet<SystemId> = region_to_systems.values().flatten().copied().collect();

    let best = match side {
        OrderSide::Buy => highest_bid(&orders, &systems),
        OrderSide::Sell => richest_sell_floor(&orders, &systems),
    };
    event!(Level::TRACE, "Best {} order for type {} across {} regions: {:?}", side, type_id, region_to_systems.len(), best);
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_universe::InMemoryUniverse;
    use test_log::test;

    fn order(system_id: u64, side: OrderSide, price: Option<f64>, volume_remain: u64) -> MarketOrder {
        MarketOrder {
            order_id: None,
            type_id: Some(TypeId(34)),
            system_id: Some(SystemId(system_id)),
            location_id: None,
            price,
            volume_remain,
            is_buy_order: Some(side == OrderSide::Buy),
        }
    }

    fn systems(ids: &[u64]) -> BTreeSet<SystemId> {
        ids.iter().map(|id| SystemId(*id)).collect()
    }

    #[test]
    fn cheapest_sell_only_looks_at_the_home_system() {
        let orders = vec![
            order(2, OrderSide::Sell, Some(3.0), 10),
            order(1, OrderSide::Sell, Some(5.0), 20),
            order(1, OrderSide::Buy, Some(4.0), 30),
            order(1, OrderSide::Sell, None, 40),
            order(1, OrderSide::Sell, Some(4.5), 50),
        ];

        let best = cheapest_sell_in_system(&orders, SystemId(1));

        assert_eq!(
            best,
            Some(OrderQuote {
                price: 4.5,
                volume_remain: 50,
                system_id: SystemId(1)
            })
        );
        assert_eq!(cheapest_sell_in_system(&orders, SystemId(9)), None);
    }

    #[test]
    fn highest_bid_ignores_systems_outside_the_set() {
        let orders = vec![
            order(1, OrderSide::Buy, Some(7.0), 1),
            order(2, OrderSide::Buy, Some(9.0), 2),
            order(3, OrderSide::Buy, Some(12.0), 3),
            order(2, OrderSide::Buy, Some(9.0), 4),
        ];

        let best = highest_bid(&orders, &systems(&[1, 2]));

        // first of the two 9.0 bids wins
        assert_eq!(best.map(|q| (q.price, q.volume_remain)), Some((9.0, 2)));
    }

    #[test]
    fn list_benchmark_is_the_richest_per_system_floor() {
        // system 1 floor 10, system 2 floor 12, system 3 floor 11; global min would be 10, global max 20
        let orders = vec![
            order(1, OrderSide::Sell, Some(20.0), 1),
            order(1, OrderSide::Sell, Some(10.0), 2),
            order(2, OrderSide::Sell, Some(12.0), 3),
            order(2, OrderSide::Sell, Some(15.0), 4),
            order(3, OrderSide::Sell, Some(11.0), 5),
        ];

        let best = richest_sell_floor(&orders, &systems(&[1, 2, 3]));

        assert_eq!(
            best,
            Some(OrderQuote {
                price: 12.0,
                volume_remain: 3,
                system_id: SystemId(2)
            })
        );
    }

    #[test(tokio::test)]
    async fn cross_system_query_walks_every_region() -> Result<()> {
        let mut universe = InMemoryUniverse::new();
        universe.add_order(RegionId(10), 1, 34, OrderSide::Buy, 6.0, 100);
        universe.add_order(RegionId(20), 5, 34, OrderSide::Buy, 8.0, 200);
        universe.add_order(RegionId(20), 6, 34, OrderSide::Buy, 99.0, 300);
        universe.add_order(RegionId(20), 5, 35, OrderSide::Buy, 50.0, 400);
        let client = universe.into_client();

        let region_to_systems = BTreeMap::from([(RegionId(10), systems(&[1])), (RegionId(20), systems(&[5]))]);
        let best = best_cross_system(&client, &region_to_systems, OrderSide::Buy, TypeId(34), 0).await?;

        assert_eq!(best.map(|q| (q.price, q.system_id)), Some((8.0, SystemId(5))));
        assert_eq!(client.calls("list_region_orders_page"), 2);
        Ok(())
    }

    #[test(tokio::test)]
    async fn local_sell_query_respects_page_cap() -> Result<()> {
        let mut universe = InMemoryUniverse::new().with_page_size(1);
        universe.add_order(RegionId(10), 1, 34, OrderSide::Sell, 9.0, 1);
        universe.add_order(RegionId(10), 1, 34, OrderSide::Sell, 4.0, 2);
        let client = universe.into_client();

        let capped = cheapest_local_sell(&client, RegionId(10), SystemId(1), TypeId(34), 1).await?;
        let full = cheapest_local_sell(&client, RegionId(10), SystemId(1), TypeId(34), 0).await?;

        assert_eq!(capped.map(|q| q.price), Some(9.0));
        assert_eq!(full.map(|q| q.price), Some(4.0));
        Ok(())
    }
}
