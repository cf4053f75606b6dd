//! Offer ranking.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::catalog::PerformanceTier;
use crate::providers::MachineOffer;

/// Why an offer made the shortlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationTag {
    /// Highest compute per dollar.
    BestValue,
    /// Lowest hourly price.
    Cheapest,
    /// Highest compute score.
    Fastest,
    /// Ranked, no particular distinction.
    Alternative,
}

/// A ranked candidate machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedMachine {
    /// The offer.
    pub offer: MachineOffer,
    /// 0-based rank.
    pub rank: usize,
    /// Distinction.
    pub tag: RecommendationTag,
    /// Compute score per USD/hour.
    pub value_score: f64,
}

fn value_score(offer: &MachineOffer) -> f64 {
    if offer.price_per_hour > 0.0 {
        offer.compute_score * f64::from(offer.gpu_count) / offer.price_per_hour
    } else {
        0.0
    }
}

/// Rank available offers that match `tier`, best value first.
///
/// Ties break on lower price, then offer ID, so the order is deterministic.
#[must_use]
pub fn rank_offers(
    offers: &[MachineOffer],
    tier: &PerformanceTier,
    limit: usize,
) -> Vec<RecommendedMachine> {
    let mut candidates: Vec<(&MachineOffer, f64)> = offers
        .iter()
        .filter(|o| o.available && tier.matches(o))
        .map(|o| (o, value_score(o)))
        .collect();

    candidates.sort_by(|(a, va), (b, vb)| {
        vb.partial_cmp(va)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.price_per_hour
                    .partial_cmp(&b.price_per_hour)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(limit);

    let cheapest = candidates
        .iter()
        .min_by(|(a, _), (b, _)| {
            a.price_per_hour
                .partial_cmp(&b.price_per_hour)
                .unwrap_or(Ordering::Equal)
        })
        .map(|(o, _)| o.id.clone());
    let fastest = candidates
        .iter()
        .max_by(|(a, _), (b, _)| {
            a.compute_score
                .partial_cmp(&b.compute_score)
                .unwrap_or(Ordering::Equal)
        })
        .map(|(o, _)| o.id.clone());

    candidates
        .into_iter()
        .enumerate()
        .map(|(rank, (offer, value_score))| {
            let tag = if rank == 0 {
                RecommendationTag::BestValue
            } else if cheapest.as_deref() == Some(offer.id.as_str()) {
                RecommendationTag::Cheapest
            } else if fastest.as_deref() == Some(offer.id.as_str()) {
                RecommendationTag::Fastest
            } else {
                RecommendationTag::Alternative
            };
            RecommendedMachine {
                offer: offer.clone(),
                rank,
                tag,
                value_score,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TierKind;

    fn offer(id: &str, compute: f64, price: f64) -> MachineOffer {
        MachineOffer {
            id: id.to_string(),
            gpu_model: "RTX 4090".to_string(),
            gpu_count: 1,
            gpu_ram_gb: 24,
            compute_score: compute,
            region: "US".to_string(),
            price_per_hour: price,
            available: true,
        }
    }

    #[test]
    fn test_ranks_by_value_and_tags() {
        let offers = vec![
            offer("a", 80.0, 0.80), // 100 per dollar, fastest
            offer("b", 40.0, 0.20), // 200 per dollar, cheapest
            offer("c", 60.0, 0.40), // 150 per dollar
        ];
        let ranked = rank_offers(&offers, TierKind::Standard.tier(), 3);

        let ids: Vec<&str> = ranked.iter().map(|r| r.offer.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].tag, RecommendationTag::BestValue);
        assert_eq!(ranked[1].tag, RecommendationTag::Alternative);
        assert_eq!(ranked[2].tag, RecommendationTag::Fastest);
    }

    #[test]
    fn test_filters_unavailable_and_out_of_tier() {
        let mut taken = offer("taken", 80.0, 0.5);
        taken.available = false;
        let pricey = offer("pricey", 80.0, 5.0);
        let small = MachineOffer {
            gpu_ram_gb: 8,
            ..offer("small", 30.0, 0.3)
        };
        let ok = offer("ok", 30.0, 0.3);

        let ranked = rank_offers(&[taken, pricey, small, ok], TierKind::Standard.tier(), 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].offer.id, "ok");
    }

    #[test]
    fn test_ties_are_deterministic_and_limited() {
        let offers = vec![offer("z", 50.0, 0.5), offer("y", 50.0, 0.5), offer("x", 25.0, 0.25)];
        let ranked = rank_offers(&offers, TierKind::Standard.tier(), 2);
        let ids: Vec<&str> = ranked.iter().map(|r| r.offer.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }
}
