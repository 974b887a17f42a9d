use rand::Rng as _;
use tkstress_core::{Catalog, Scenario, ScenarioError};

use crate::api::{ApiClient, HIGH_SPEED_PAIRS, NORMAL_PAIRS, OrderStatus, pick};

/// Weighted catalog for randomized stress runs. Weights mirror the
/// traffic mix observed on a live deployment: queries dominate,
/// order-mutating flows stay rare.
pub fn stress_catalog(api: &ApiClient) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register_weighted(high_speed(api.clone()), 25.0);
    catalog.register_weighted(normal(api.clone()), 25.0);
    catalog.register_weighted(food(api.clone()), 10.0);
    catalog.register_weighted(parallel(api.clone()), 10.0);
    catalog.register_weighted(pay(api.clone()), 5.0);
    catalog.register_weighted(cancel(api.clone()), 5.0);
    catalog.register_weighted(consign(api.clone()), 5.0);
    catalog.register_weighted(book(api.clone()), 10.0);
    catalog.register_weighted(rebook(api.clone()), 5.0);
    catalog
}

/// Ordered catalog for the periodic cycle runner, one realistic user
/// journey per lap: query, book, pay, consign, collect, rebook,
/// cancel. The parallel left-ticket query is deliberately absent; that
/// endpoint is not served consistently across deployments.
pub fn cycle_catalog(api: &ApiClient) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register(high_speed(api.clone()));
    catalog.register(normal(api.clone()));
    catalog.register(food(api.clone()));
    catalog.register(book(api.clone()));
    catalog.register(pay(api.clone()));
    catalog.register(consign(api.clone()));
    catalog.register(collect(api.clone()));
    catalog.register(rebook(api.clone()));
    catalog.register(cancel(api.clone()));
    catalog
}

/// 60/40 split between high-speed and conventional order services,
/// matching the fleet's traffic ratio.
fn prefer_high_speed() -> bool {
    rand::rng().random_range(0..100) < 60
}

fn high_speed(api: ApiClient) -> Scenario {
    Scenario::new("high_speed", move |session| {
        let api = api.clone();
        async move {
            let pair = pair_of(HIGH_SPEED_PAIRS);
            let date = api.config().travel_date.clone();
            let trips = api
                .query_high_speed_ticket(&session, pair, &date)
                .await
                .map_err(ScenarioError::from)?;
            if trips.is_empty() {
                tracing::warn!(from = pair.0, to = pair.1, "no high-speed trips found");
            } else {
                tracing::debug!(count = trips.len(), "high-speed trips found");
            }
            Ok(())
        }
    })
}

fn normal(api: ApiClient) -> Scenario {
    Scenario::new("normal", move |session| {
        let api = api.clone();
        async move {
            let pair = pair_of(NORMAL_PAIRS);
            let date = api.config().travel_date.clone();
            let trips = api
                .query_normal_ticket(&session, pair, &date)
                .await
                .map_err(ScenarioError::from)?;
            if trips.is_empty() {
                tracing::warn!(from = pair.0, to = pair.1, "no conventional trips found");
            }
            Ok(())
        }
    })
}

fn parallel(api: ApiClient) -> Scenario {
    Scenario::new("parallel", move |session| {
        let api = api.clone();
        async move {
            let pair = pair_of(HIGH_SPEED_PAIRS);
            let date = api.config().travel_date.clone();
            let trips = api
                .query_high_speed_ticket_parallel(&session, pair, &date)
                .await
                .map_err(ScenarioError::from)?;
            tracing::debug!(count = trips.len(), "parallel trip query done");
            Ok(())
        }
    })
}

fn food(api: ApiClient) -> Scenario {
    Scenario::new("food", move |session| {
        let api = api.clone();
        async move {
            let pair = pair_of(HIGH_SPEED_PAIRS);
            let date = api.config().travel_date.clone();
            let trips = api
                .query_high_speed_ticket(&session, pair, &date)
                .await
                .map_err(ScenarioError::from)?;
            let train = match pick(&trips) {
                Some(train) => train.clone(),
                None => {
                    tracing::warn!("no trips to query food for");
                    return Ok(());
                }
            };
            let foods = api
                .query_food(&session, pair, &train, &date)
                .await
                .map_err(ScenarioError::from)?;
            tracing::debug!(train = %train, count = foods.len(), "food query done");
            Ok(())
        }
    })
}

fn pay(api: ApiClient) -> Scenario {
    Scenario::new("pay", move |session| {
        let api = api.clone();
        async move {
            let orders = api
                .query_orders(&session, &[OrderStatus::NotPaid], false)
                .await
                .map_err(ScenarioError::from)?;
            let (order_id, trip_id) = match pick(&orders) {
                Some(pair) => pair.clone(),
                None => {
                    tracing::debug!("no unpaid orders to settle");
                    return Ok(());
                }
            };
            let paid = api
                .pay_order(&session, &order_id, &trip_id)
                .await
                .map_err(ScenarioError::from)?;
            if paid {
                tracing::info!(order = %order_id, "order paid");
            } else {
                tracing::warn!(order = %order_id, "payment had no effect");
            }
            Ok(())
        }
    })
}

fn cancel(api: ApiClient) -> Scenario {
    Scenario::new("cancel", move |session| {
        let api = api.clone();
        async move {
            let orders = api
                .query_orders(&session, &[OrderStatus::NotPaid, OrderStatus::Paid], false)
                .await
                .map_err(ScenarioError::from)?;
            let (order_id, _) = match pick(&orders) {
                Some(pair) => pair.clone(),
                None => {
                    tracing::debug!("no orders to cancel");
                    return Ok(());
                }
            };
            let cancelled = api
                .cancel_order(&session, &order_id)
                .await
                .map_err(ScenarioError::from)?;
            if cancelled {
                tracing::info!(order = %order_id, "order cancelled");
            }
            Ok(())
        }
    })
}

fn consign(api: ApiClient) -> Scenario {
    Scenario::new("consign", move |session| {
        let api = api.clone();
        async move {
            let targets = api
                .query_orders_all_info(&session, false)
                .await
                .map_err(ScenarioError::from)?;
            let target = match pick(&targets) {
                Some(target) => target.clone(),
                None => {
                    tracing::debug!("no orders to consign against");
                    return Ok(());
                }
            };
            let done = api
                .put_consign(&session, &target)
                .await
                .map_err(ScenarioError::from)?;
            if done {
                tracing::info!(order = %target.order_id, "consign recorded");
            }
            Ok(())
        }
    })
}

fn book(api: ApiClient) -> Scenario {
    Scenario::new("book", move |session| {
        let api = api.clone();
        async move {
            let high_speed = prefer_high_speed();
            let (start, end) = if high_speed {
                ("Shang Hai", "Su Zhou")
            } else {
                ("Shang Hai", "Nan Jing")
            };
            let date = api.config().travel_date.clone();

            let trips = if high_speed {
                api.query_high_speed_ticket(&session, (start, end), &date)
                    .await
            } else {
                api.query_normal_ticket(&session, (start, end), &date).await
            }
            .map_err(ScenarioError::from)?;
            if trips.is_empty() {
                tracing::warn!(from = start, to = end, "no trips to book");
                return Ok(());
            }

            api.query_assurances(&session)
                .await
                .map_err(ScenarioError::from)?;
            let booked = api
                .preserve(&session, start, end, &trips, high_speed, &date)
                .await
                .map_err(ScenarioError::from)?;
            if booked {
                tracing::info!(from = start, to = end, "ticket booked");
            } else {
                tracing::warn!(from = start, to = end, "booking was not accepted");
            }
            Ok(())
        }
    })
}

fn collect(api: ApiClient) -> Scenario {
    Scenario::new("collect", move |session| {
        let api = api.clone();
        async move {
            let orders = api
                .query_orders(&session, &[OrderStatus::Paid], false)
                .await
                .map_err(ScenarioError::from)?;
            let (order_id, _) = match pick(&orders) {
                Some(pair) => pair.clone(),
                None => {
                    tracing::debug!("no paid orders to collect");
                    return Ok(());
                }
            };
            let collected = api
                .collect_order(&session, &order_id)
                .await
                .map_err(ScenarioError::from)?;
            if collected {
                tracing::info!(order = %order_id, "ticket collected");
            }
            Ok(())
        }
    })
}

fn rebook(api: ApiClient) -> Scenario {
    Scenario::new("rebook", move |session| {
        let api = api.clone();
        async move {
            let orders = api
                .query_orders(&session, &[OrderStatus::NotPaid, OrderStatus::Paid], false)
                .await
                .map_err(ScenarioError::from)?;
            let (order_id, trip_id) = match pick(&orders) {
                Some(pair) => pair.clone(),
                None => {
                    tracing::debug!("no orders to rebook");
                    return Ok(());
                }
            };
            let date = api.config().travel_date.clone();
            api.cancel_order(&session, &order_id)
                .await
                .map_err(ScenarioError::from)?;
            api.rebook_ticket(&session, &order_id, &trip_id, &trip_id, &date)
                .await
                .map_err(ScenarioError::from)?;
            tracing::info!(order = %order_id, "order rebooked");
            Ok(())
        }
    })
}

fn pair_of(pairs: &'static [(&'static str, &'static str)]) -> (&'static str, &'static str) {
    let idx = rand::rng().random_range(0..pairs.len());
    pairs[idx]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::api::ApiConfig;

    fn api() -> ApiClient {
        ApiClient::new(ApiConfig::default())
    }

    #[test]
    fn stress_catalog_carries_the_production_mix() {
        let catalog = stress_catalog(&api());
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog.weight_of("high_speed"), Some(25.0));
        assert_eq!(catalog.weight_of("normal"), Some(25.0));
        assert_eq!(catalog.weight_of("food"), Some(10.0));
        assert_eq!(catalog.weight_of("parallel"), Some(10.0));
        assert_eq!(catalog.weight_of("pay"), Some(5.0));
        assert_eq!(catalog.weight_of("cancel"), Some(5.0));
        assert_eq!(catalog.weight_of("consign"), Some(5.0));
        assert_eq!(catalog.weight_of("book"), Some(10.0));
        assert_eq!(catalog.weight_of("rebook"), Some(5.0));
        assert_eq!(catalog.total_weight(), 100.0);
    }

    #[test]
    fn cycle_catalog_is_ordered_and_skips_the_parallel_query() {
        let catalog = cycle_catalog(&api());
        let names: Vec<&str> = catalog.scenarios().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "high_speed",
                "normal",
                "food",
                "book",
                "pay",
                "consign",
                "collect",
                "rebook",
                "cancel"
            ]
        );
        assert!(catalog.get("parallel").is_none());
    }
}
