//! Composite peering score.
//!
//! The shipped formula (`v2`) adds three components and clamps the sum to `[0, 100]`:
//!
//! - **health**: `round((1 - low_visibility / total) * health_weight)`, 0 without routes
//! - **regional**: `regional_weight` when the ISP and the target are both present at the
//!   regional IXP of the ISP's country, else 0
//! - **overlap**: `min(shared_ixps * peer_weight, peer_cap)`
//!
//! An older formula weighted official prefix presence at 80% with a 20% peering bonus.
//! It produces materially different numbers and is not implemented.
use crate::config::{ScoringConfig, SCORING_FORMULA_VERSION};
use serde::{Deserialize, Serialize};

pub const MAX_SCORE: u32 = 100;

/// Facts the score is computed from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInputs {
    /// routes originated by the target network
    pub total_routes: usize,
    /// routes below the low-visibility threshold
    pub low_visibility_routes: usize,
    pub shared_ixps: usize,
    /// both parties are present at the regional IXP
    pub regional_peering: bool,
}

/// A score and how it was put together.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub formula: String,
    pub health: u32,
    pub regional: u32,
    pub overlap: u32,
    pub total: u32,
}

pub fn health_component(total: usize, low: usize, weight: f64) -> u32 {
    if total == 0 {
        return 0;
    }
    let low = low.min(total);
    let healthy_ratio = 1.0 - (low as f64 / total as f64);
    (healthy_ratio * weight).round().max(0.0) as u32
}

pub fn overlap_component(shared: usize, per_ixp: u32, cap: u32) -> u32 {
    let shared = u32::try_from(shared).unwrap_or(u32::MAX);
    shared.saturating_mul(per_ixp).min(cap)
}

pub fn compute_score(inputs: &ScoreInputs, config: &ScoringConfig) -> ScoreBreakdown {
    let health = health_component(
        inputs.total_routes,
        inputs.low_visibility_routes,
        config.health_weight,
    );
    let regional = match inputs.regional_peering {
        true => config.regional_weight,
        false => 0,
    };
    let overlap = overlap_component(inputs.shared_ixps, config.peer_weight, config.peer_cap);
    let total = health
        .saturating_add(regional)
        .saturating_add(overlap)
        .min(MAX_SCORE);

    ScoreBreakdown {
        formula: SCORING_FORMULA_VERSION.to_string(),
        health,
        regional,
        overlap,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_component() {
        assert_eq!(health_component(3, 1, 40.0), 27);
        assert_eq!(health_component(0, 0, 40.0), 0);
        assert_eq!(health_component(10, 0, 40.0), 40);
        assert_eq!(health_component(10, 10, 40.0), 0);
        assert_eq!(health_component(10, 20, 40.0), 0);
    }

    #[test]
    fn test_overlap_component() {
        assert_eq!(overlap_component(0, 10, 20), 0);
        assert_eq!(overlap_component(1, 10, 20), 10);
        assert_eq!(overlap_component(2, 10, 20), 20);
        assert_eq!(overlap_component(7, 10, 20), 20);
        assert_eq!(overlap_component(usize::MAX, 10, 20), 20);
    }

    #[test]
    fn test_full_score() {
        let config = ScoringConfig::default();
        let score = compute_score(
            &ScoreInputs {
                total_routes: 3,
                low_visibility_routes: 1,
                shared_ixps: 2,
                regional_peering: true,
            },
            &config,
        );
        assert_eq!(score.health, 27);
        assert_eq!(score.regional, 40);
        assert_eq!(score.overlap, 20);
        assert_eq!(score.total, 87);
        assert_eq!(score.formula, "v2");
    }

    #[test]
    fn test_score_is_clamped() {
        let config = ScoringConfig {
            health_weight: 90.0,
            regional_weight: 90,
            peer_weight: 50,
            peer_cap: 90,
            ..Default::default()
        };
        let score = compute_score(
            &ScoreInputs {
                total_routes: 5,
                low_visibility_routes: 0,
                shared_ixps: 4,
                regional_peering: true,
            },
            &config,
        );
        assert_eq!(score.total, 100);

        let score = compute_score(&ScoreInputs::default(), &ScoringConfig::default());
        assert_eq!(score.total, 0);
    }

    #[test]
    fn test_score_range_over_inputs() {
        let config = ScoringConfig::default();
        for total in [0usize, 1, 3, 50, 1000] {
            for low in [0usize, 1, 3, 50, 1000] {
                for shared in [0usize, 1, 2, 5] {
                    for regional_peering in [true, false] {
                        let score = compute_score(
                            &ScoreInputs {
                                total_routes: total,
                                low_visibility_routes: low,
                                shared_ixps: shared,
                                regional_peering,
                            },
                            &config,
                        );
                        assert!(score.total <= MAX_SCORE);
                    }
                }
            }
        }
    }
}
