//! Risk scoring: scale, infer, then map the probability to a bounded score.
//!
//! The mapping is
//!
//! ```text
//! base  = p * 0.5 + ln(1 + amount) * 0.00005 + balance_change_ratio * 0.3
//! pct   = base * 100
//! pct  += U[-8, 8]            only when pct >= 70
//! score = round(clamp(pct, 60, 95), 2)
//! ```
//!
//! Scores at or above the variance threshold are deliberately
//! non-deterministic: identical inputs may produce different scores there.
//! Below it the score is a pure function of the input.

use crate::error::{Result, ScoringError};
use crate::models::classifier::{checked_probability, Classifier};
use crate::models::scaler::StandardScaler;
use crate::types::features::FeatureVector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Source of the bounded perturbation applied to high scores.
pub trait NoiseSource {
    /// Sample uniformly from the closed range `[-bound, bound]`
    fn perturbation(&mut self, bound: f64) -> f64;
}

impl<R: Rng + ?Sized> NoiseSource for R {
    fn perturbation(&mut self, bound: f64) -> f64 {
        if bound > 0.0 {
            self.gen_range(-bound..=bound)
        } else {
            0.0
        }
    }
}

/// Coefficients and bounds of the probability-to-score mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub probability_weight: f64,
    pub log_amount_weight: f64,
    pub balance_change_weight: f64,
    /// Percentage score at which noise is injected
    pub variance_threshold: f64,
    /// Half-width of the injected noise, in percentage points
    pub variance_bound: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            probability_weight: 0.5,
            log_amount_weight: 0.00005,
            balance_change_weight: 0.3,
            variance_threshold: 70.0,
            variance_bound: 8.0,
            floor: 60.0,
            ceiling: 95.0,
        }
    }
}

impl ScoringPolicy {
    pub fn validate(&self) -> Result<()> {
        let values = [
            self.probability_weight,
            self.log_amount_weight,
            self.balance_change_weight,
            self.variance_threshold,
            self.variance_bound,
            self.floor,
            self.ceiling,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ScoringError::model_unavailable(
                "scoring policy",
                "all coefficients must be finite",
            ));
        }
        if self.floor >= self.ceiling {
            return Err(ScoringError::model_unavailable(
                "scoring policy",
                format!("floor {} must be below ceiling {}", self.floor, self.ceiling),
            ));
        }
        if self.variance_bound < 0.0 {
            return Err(ScoringError::model_unavailable(
                "scoring policy",
                "variance_bound must not be negative",
            ));
        }
        Ok(())
    }
}

/// Outcome of scoring one feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskAssessment {
    /// Classifier probability of the positive class
    pub probability: f64,
    /// Unperturbed score in percentage points, before clamping
    pub base: f64,
    /// Noise added to `base` (0 below the variance threshold)
    pub perturbation: f64,
    /// Final clamped score rounded to 2 decimals
    pub risk_score: f64,
}

impl RiskAssessment {
    pub fn is_perturbed(&self) -> bool {
        self.perturbation != 0.0
    }
}

/// Scores feature vectors against the process-wide scaler and classifier.
pub struct RiskScorer {
    scaler: Arc<StandardScaler>,
    classifier: Arc<dyn Classifier>,
    policy: ScoringPolicy,
}

impl RiskScorer {
    pub fn new(
        scaler: Arc<StandardScaler>,
        classifier: Arc<dyn Classifier>,
        policy: ScoringPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            scaler,
            classifier,
            policy,
        })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score with a request-local thread RNG
    pub fn score_random(&self, features: &FeatureVector) -> Result<RiskAssessment> {
        self.score(features, &mut rand::thread_rng())
    }

    /// Scale, infer and map the probability to a risk score.
    pub fn score<N: NoiseSource + ?Sized>(
        &self,
        features: &FeatureVector,
        noise: &mut N,
    ) -> Result<RiskAssessment> {
        let scaled = self.scaler.transform(features);
        let probability = checked_probability(self.classifier.predict_proba(&scaled)?)?;
        self.assess(probability, features, noise)
    }

    /// Class label (0 or 1) for the scaled features
    pub fn predict_label(&self, features: &FeatureVector) -> Result<u8> {
        let scaled = self.scaler.transform(features);
        self.classifier.predict_label(&scaled)
    }

    /// Map a probability to a risk score.
    ///
    /// `amount` and `balance_change_ratio` are read from the unscaled vector.
    pub fn assess<N: NoiseSource + ?Sized>(
        &self,
        probability: f64,
        features: &FeatureVector,
        noise: &mut N,
    ) -> Result<RiskAssessment> {
        let base = (self.base_score(probability, features)? * 100.0).clamp(f64::MIN, f64::MAX);

        let perturbation = if base >= self.policy.variance_threshold {
            noise
                .perturbation(self.policy.variance_bound)
                .clamp(-self.policy.variance_bound, self.policy.variance_bound)
        } else {
            0.0
        };

        let risk_score = round2((base + perturbation).clamp(self.policy.floor, self.policy.ceiling));

        debug!(
            probability,
            base,
            perturbation,
            risk_score,
            "Risk score computed"
        );

        Ok(RiskAssessment {
            probability,
            base,
            perturbation,
            risk_score,
        })
    }

    fn base_score(&self, probability: f64, features: &FeatureVector) -> Result<f64> {
        if features.amount <= -1.0 {
            return Err(ScoringError::invalid_value(
                "amount",
                format!("log(1 + amount) is undefined for amount {}", features.amount),
            ));
        }

        // Only the ratio term is unbounded; it overflows toward ±inf, never NaN
        let base = probability * self.policy.probability_weight
            + features.amount.ln_1p() * self.policy.log_amount_weight
            + features.balance_change_ratio * self.policy.balance_change_weight;

        Ok(base.clamp(f64::MIN, f64::MAX))
    }
}

/// Round half away from zero to 2 decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scaler::ScaledVector;
    use crate::types::features::FEATURE_COUNT;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct FixedClassifier(f64);

    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict_proba(&self, _features: &ScaledVector) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct FixedNoise(f64);

    impl NoiseSource for FixedNoise {
        fn perturbation(&mut self, _bound: f64) -> f64 {
            self.0
        }
    }

    fn scorer(probability: f64) -> RiskScorer {
        let scaler = StandardScaler::from_params([0.0; FEATURE_COUNT], [1.0; FEATURE_COUNT]).unwrap();
        RiskScorer::new(
            Arc::new(scaler),
            Arc::new(FixedClassifier(probability)),
            ScoringPolicy::default(),
        )
        .unwrap()
    }

    fn features(amount: f64, balance_change_ratio: f64) -> FeatureVector {
        let mut fv = FeatureVector::from_array([0.0; FEATURE_COUNT]);
        fv.amount = amount;
        fv.balance_change_ratio = balance_change_ratio;
        fv.type_cash_out = 1.0;
        fv
    }

    fn is_rounded(score: f64) -> bool {
        ((score * 100.0) - (score * 100.0).round()).abs() < 1e-6
    }

    #[test]
    fn test_low_scores_hit_the_floor() {
        let scorer = scorer(0.5);
        let result = scorer.score(&features(1000.0, 0.01), &mut FixedNoise(8.0)).unwrap();

        assert_abs_diff_eq!(result.base, 25.3345437739, epsilon = 1e-6);
        assert_eq!(result.perturbation, 0.0);
        assert_eq!(result.risk_score, 60.0);
    }

    #[test]
    fn test_mid_range_score_is_exact() {
        let scorer = scorer(1.0);
        let result = scorer.score(&features(0.0, 0.5), &mut FixedNoise(8.0)).unwrap();

        // 0.5 + 0 + 0.15 = 0.65
        assert_abs_diff_eq!(result.base, 65.0, epsilon = 1e-9);
        assert_eq!(result.risk_score, 65.0);
        assert!(!result.is_perturbed());
    }

    #[test]
    fn test_noise_applies_above_threshold() {
        let scorer = scorer(1.0);
        let fv = features(1000.0, 1.0);

        let up = scorer.score(&fv, &mut FixedNoise(8.0)).unwrap();
        let down = scorer.score(&fv, &mut FixedNoise(-8.0)).unwrap();

        assert_abs_diff_eq!(up.base, 80.0345437739, epsilon = 1e-6);
        assert_eq!(up.risk_score, 88.03);
        assert_eq!(down.risk_score, 72.03);
        assert!(up.is_perturbed());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = ScoringPolicy {
            probability_weight: 1.0,
            log_amount_weight: 0.0,
            balance_change_weight: 0.0,
            variance_threshold: 75.0,
            ..ScoringPolicy::default()
        };
        let scorer = RiskScorer::new(
            Arc::new(scorer(0.0).scaler().clone()),
            Arc::new(FixedClassifier(0.75)),
            policy,
        )
        .unwrap();
        let fv = features(10.0, 0.0);

        let at = scorer.assess(0.75, &fv, &mut FixedNoise(1.0)).unwrap();
        assert_eq!(at.base, 75.0);
        assert_eq!(at.risk_score, 76.0);

        let below = scorer.assess(0.74, &fv, &mut FixedNoise(1.0)).unwrap();
        assert_eq!(below.perturbation, 0.0);
    }

    #[test]
    fn test_out_of_range_noise_is_bounded() {
        let scorer = scorer(1.0);
        let result = scorer
            .score(&features(0.0, 0.8), &mut FixedNoise(50.0))
            .unwrap();

        assert_eq!(result.perturbation, 8.0);
    }

    #[test]
    fn test_ceiling_clamps_high_scores() {
        let scorer = scorer(1.0);
        let result = scorer.score(&features(1e9, 2.0), &mut FixedNoise(8.0)).unwrap();

        assert!(result.base > 95.0);
        assert_eq!(result.risk_score, 95.0);
    }

    #[test]
    fn test_log_domain_errors_are_client_errors() {
        let scorer = scorer(0.5);

        let err = scorer.score(&features(-1.0, 0.0), &mut FixedNoise(0.0)).unwrap_err();
        assert!(matches!(err, ScoringError::InvalidValue { ref field, .. } if field == "amount"));
        assert!(err.is_client_error());

        // ln(1 + amount) is defined between -1 and 0
        assert!(scorer.score(&features(-0.5, 0.0), &mut FixedNoise(0.0)).is_ok());
    }

    #[test]
    fn test_overflowing_ratio_term_saturates() {
        let policy = ScoringPolicy {
            balance_change_weight: 1e10,
            ..ScoringPolicy::default()
        };
        let scorer = RiskScorer::new(
            Arc::new(scorer(0.0).scaler().clone()),
            Arc::new(FixedClassifier(0.5)),
            policy,
        )
        .unwrap();

        let high = scorer.score(&features(10.0, 1e300), &mut FixedNoise(-8.0)).unwrap();
        assert!(high.base.is_finite());
        assert_eq!(high.risk_score, 95.0);

        let low = scorer.score(&features(10.0, -1e300), &mut FixedNoise(8.0)).unwrap();
        assert!(low.base.is_finite());
        assert_eq!(low.risk_score, 60.0);
    }

    #[test]
    fn test_invalid_probability_is_a_server_error() {
        let scorer = scorer(1.5);
        let err = scorer.score(&features(10.0, 0.0), &mut FixedNoise(0.0)).unwrap_err();

        assert!(matches!(err, ScoringError::Inference(_)));
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_deterministic_below_threshold() {
        let scorer = scorer(0.9);
        let fv = features(250.0, 0.3);

        let first = scorer.score_random(&fv).unwrap();
        assert!(first.base < 70.0);
        for _ in 0..100 {
            assert_eq!(scorer.score_random(&fv).unwrap(), first);
        }
    }

    #[test]
    fn test_scaler_is_invariant_across_calls() {
        let scorer = scorer(0.9);
        let before = scorer.scaler().clone();

        for amount in [0.0, 10.0, 1e7] {
            scorer.score_random(&features(amount, 0.9)).unwrap();
        }

        assert_eq!(scorer.scaler(), &before);
    }

    #[test]
    fn test_policy_validation() {
        let policy = ScoringPolicy {
            floor: 95.0,
            ceiling: 60.0,
            ..ScoringPolicy::default()
        };
        assert!(policy.validate().is_err());

        let policy = ScoringPolicy {
            variance_bound: -1.0,
            ..ScoringPolicy::default()
        };
        assert!(policy.validate().is_err());

        assert!(ScoringPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_rng_noise_stays_in_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let n = rng.perturbation(8.0);
            assert!((-8.0..=8.0).contains(&n));
        }
        assert_eq!(rng.perturbation(0.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded_and_rounded(
            probability in 0.0f64..=1.0,
            amount in 0.0f64..1e9,
            ratio in -5.0f64..5.0,
            seed in any::<u64>(),
        ) {
            let scorer = scorer(probability);
            let mut rng = StdRng::seed_from_u64(seed);
            let result = scorer.score(&features(amount, ratio), &mut rng).unwrap();

            prop_assert!((60.0..=95.0).contains(&result.risk_score));
            prop_assert!(is_rounded(result.risk_score));
            prop_assert!(result.perturbation.abs() <= 8.0);
            if result.base < 70.0 {
                prop_assert_eq!(result.perturbation, 0.0);
            }
        }

        #[test]
        fn prop_perturbed_scores_stay_near_base(
            ratio in 0.7f64..1.2,
            seed in any::<u64>(),
        ) {
            let scorer = scorer(1.0);
            let mut rng = StdRng::seed_from_u64(seed);
            let result = scorer.score(&features(100.0, ratio), &mut rng).unwrap();

            prop_assert!(result.base >= 70.0);
            let unclamped = result.base + result.perturbation;
            prop_assert!((unclamped - result.base).abs() <= 8.0);
            prop_assert!((result.risk_score - unclamped.clamp(60.0, 95.0)).abs() <= 0.005 + 1e-9);
        }
    }
}
