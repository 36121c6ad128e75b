use crate::{PlanPolicy, PlanTier};
use rand::Rng;

/// Probabilistic admission check keyed by plan tier.
///
/// Enterprise always passes without consuming a draw. Every other tier takes
/// exactly one uniform draw in `[0, 1)` from `rng` and passes when the draw is
/// below the tier's display probability.
pub fn should_display<R: Rng + ?Sized>(policy: &PlanPolicy, tier: PlanTier, rng: &mut R) -> bool {
    if tier == PlanTier::Enterprise {
        return true;
    }
    let draw: f64 = rng.gen();
    draw < policy.display_probability(tier)
}
