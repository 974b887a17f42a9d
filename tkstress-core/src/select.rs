use std::sync::Arc;

use rand::Rng;

use crate::error::{Error, Result};
use crate::scenario::{Catalog, Scenario};

/// Picks one scenario from the catalog according to relative weights.
///
/// Draws a uniform `r` in `[0, total_weight)` and walks the entries in
/// registration order, returning the first whose cumulative weight is
/// strictly greater than `r`. Entries with weight <= 0 contribute
/// nothing and are never returned. If floating error leaves no match,
/// the last positive-weight entry is returned deterministically.
///
/// Fails with [`Error::EmptyCatalog`] when no entry has positive weight.
pub fn select<R: Rng + ?Sized>(catalog: &Catalog, rng: &mut R) -> Result<Arc<Scenario>> {
    let total = catalog.total_weight();
    if catalog.is_empty() || total <= 0.0 {
        return Err(Error::EmptyCatalog);
    }

    let r = rng.random_range(0.0..total);

    let mut cumulative = 0.0;
    let mut last_positive: Option<&Arc<Scenario>> = None;
    for entry in catalog.entries() {
        if entry.weight <= 0.0 {
            continue;
        }
        cumulative += entry.weight;
        last_positive = Some(&entry.scenario);
        if cumulative > r {
            return Ok(entry.scenario.clone());
        }
    }

    // Unreachable unless accumulated rounding left cumulative == total <= r.
    match last_positive {
        Some(scenario) => Ok(scenario.clone()),
        None => Err(Error::EmptyCatalog),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::collections::HashMap;

    fn noop(name: &str) -> Scenario {
        Scenario::new(name, |_session| async { Ok(()) })
    }

    fn catalog(weights: &[(&str, f64)]) -> Catalog {
        let mut c = Catalog::new();
        for (name, weight) in weights {
            c.register_weighted(noop(name), *weight);
        }
        c
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let c = Catalog::new();
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(select(&c, &mut rng), Err(Error::EmptyCatalog)));
    }

    #[test]
    fn all_nonpositive_weights_is_an_error() {
        let c = catalog(&[("a", 0.0), ("b", -1.0)]);
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(matches!(select(&c, &mut rng), Err(Error::EmptyCatalog)));
    }

    #[test]
    fn always_returns_a_member_on_positive_weights() {
        let c = catalog(&[("a", 1.0), ("b", 2.0), ("c", 0.5)]);
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let picked = select(&c, &mut rng).map(|s| s.name().to_string());
            let name = match picked {
                Ok(name) => name,
                Err(err) => panic!("select failed: {err}"),
            };
            assert!(["a", "b", "c"].contains(&name.as_str()));
        }
    }

    #[test]
    fn zero_weight_entries_are_never_selected() {
        let c = catalog(&[("dead", 0.0), ("live", 5.0)]);
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..500 {
            let picked = select(&c, &mut rng);
            assert_eq!(picked.map(|s| s.name().to_string()).ok().as_deref(), Some("live"));
        }
    }

    #[test]
    fn frequencies_converge_to_weight_shares() {
        let weights = [("high_speed", 25.0), ("normal", 25.0), ("food", 10.0), ("book", 40.0)];
        let c = catalog(&weights);
        let total: f64 = weights.iter().map(|(_, w)| w).sum();

        let mut rng = SmallRng::seed_from_u64(42);
        let draws = 10_000usize;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            let picked = match select(&c, &mut rng) {
                Ok(s) => s,
                Err(err) => panic!("select failed: {err}"),
            };
            *counts.entry(picked.name().to_string()).or_default() += 1;
        }

        for (name, weight) in weights {
            let expected = weight / total;
            let observed = counts.get(name).copied().unwrap_or(0) as f64 / draws as f64;
            // 5-point tolerance on shares >= 5%, generous for 10k draws.
            assert!(
                (observed - expected).abs() < 0.05,
                "{name}: observed {observed:.3}, expected {expected:.3}"
            );
        }
    }

    #[test]
    fn seventy_thirty_split_over_1000_draws() {
        let c = catalog(&[("a", 70.0), ("b", 30.0)]);
        let mut rng = SmallRng::seed_from_u64(2024);

        let mut a = 0u32;
        let mut b = 0u32;
        for _ in 0..1_000 {
            let picked = match select(&c, &mut rng) {
                Ok(s) => s,
                Err(err) => panic!("select failed: {err}"),
            };
            match picked.name() {
                "a" => a += 1,
                _ => b += 1,
            }
        }

        assert!((650..=750).contains(&a), "a selected {a} times");
        assert!((250..=350).contains(&b), "b selected {b} times");
    }
}
