//! The validator set: registration, PoCS-weighted selection, peer review
//! rounds, and the network-wide reporting used by the node's read API
//! scoring, selection, and penalty/rehabilitation machinery.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use lakha_common::error::{NodeError, Result};

use crate::activities;
use crate::validator::Validator;

/// Validator pairs are reshuffled and rated every `PEER_REVIEW_INTERVAL`
/// blocks, mirroring `trigger_peer_reviews` in the original implementation.
pub const PEER_REVIEW_INTERVAL: u64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct NetworkPerformanceSummary {
    pub total_validators: usize,
    pub active_validators: usize,
    pub total_stake: f64,
    pub average_pocs_score: f64,
    pub average_reputation: f64,
    pub average_reliability: f64,
    pub average_collaboration: f64,
    pub average_network_health: f64,
}

#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Validator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, address: &str, stake: f64, now: f64) -> &mut Validator {
        self.validators
            .entry(address.to_string())
            .or_insert_with(|| Validator::new(address, stake, now))
    }

    /// Inserts an already-built `Validator`, overwriting any existing entry
    /// at the same address. Used by boot-time rehydration, where the stored
    /// record already carries its full history.
    pub fn insert(&mut self, validator: Validator) {
        self.validators.insert(validator.address.clone(), validator);
    }

    pub fn get(&self, address: &str) -> Option<&Validator> {
        self.validators.get(address)
    }

    pub fn get_mut(&mut self, address: &str) -> Option<&mut Validator> {
        self.validators.get_mut(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.validators.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn list(&self) -> Vec<&Validator> {
        let mut out: Vec<&Validator> = self.validators.values().collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }

    /// PoCS-weighted random selection among active validators.
    /// Falls back to stake-weighted choice if every score is zero, and to
    /// the first active validator (in address order) if stakes are also
    /// all zero. Returns `None` when no validator is active.
    pub fn select_validator(&mut self, now: f64) -> Option<String> {
        let mut addresses: Vec<String> = self
            .validators
            .values()
            .filter(|v| v.is_active)
            .map(|v| v.address.clone())
            .collect();
        addresses.sort();
        if addresses.is_empty() {
            return None;
        }

        let scores: Vec<f64> = addresses
            .iter()
            .map(|addr| {
                self.validators
                    .get_mut(addr)
                    .map(|v| v.calculate_score(now, false))
                    .unwrap_or(0.0)
            })
            .collect();

        let total_score: f64 = scores.iter().sum();
        let mut rng = rand::thread_rng();

        if total_score > 0.0 {
            let mut pick = rng.gen_range(0.0..total_score);
            for (addr, score) in addresses.iter().zip(scores.iter()) {
                if pick < *score {
                    return Some(addr.clone());
                }
                pick -= score;
            }
            return addresses.last().cloned();
        }

        let stakes: Vec<f64> = addresses
            .iter()
            .map(|addr| self.validators.get(addr).map(|v| v.stake).unwrap_or(0.0))
            .collect();
        let total_stake: f64 = stakes.iter().sum();
        if total_stake > 0.0 {
            let mut pick = rng.gen_range(0.0..total_stake);
            for (addr, stake) in addresses.iter().zip(stakes.iter()) {
                if pick < *stake {
                    return Some(addr.clone());
                }
                pick -= stake;
            }
            return addresses.last().cloned();
        }

        addresses.into_iter().next()
    }

    pub fn apply_validator_penalty(
        &mut self,
        address: &str,
        kind: &str,
        severity: f64,
        reason: &str,
        now: f64,
    ) -> Result<()> {
        let validator = self
            .validators
            .get_mut(address)
            .ok_or_else(|| NodeError::InvalidAddress(address.to_string()))?;
        validator.apply_penalty(kind, severity, reason, now);
        Ok(())
    }

    pub fn community_override_penalty(
        &mut self,
        address: &str,
        new_multiplier: f64,
        reason: &str,
        now: f64,
    ) -> Result<()> {
        let validator = self
            .validators
            .get_mut(address)
            .ok_or_else(|| NodeError::InvalidAddress(address.to_string()))?;
        validator.community_override_penalty(new_multiplier, reason, now);
        Ok(())
    }

    pub fn contribution_mining_activities(&self) -> &'static [activities::ActivityDefinition] {
        activities::CONTRIBUTION_ACTIVITIES
    }

    /// Credits a validator for `activity_key`, capped at that activity's
    /// `max_credits` lifetime allowance.
    pub fn record_contribution_activity(
        &mut self,
        address: &str,
        activity_key: &str,
        now: f64,
    ) -> Result<f64> {
        let definition = activities::lookup(activity_key)
            .ok_or_else(|| NodeError::KindSpecific(format!("unknown activity '{activity_key}'")))?;
        let validator = self
            .validators
            .get_mut(address)
            .ok_or_else(|| NodeError::InvalidAddress(address.to_string()))?;

        let already_earned: f64 = validator
            .contribution_activities
            .iter()
            .filter(|a| a.activity == definition.key)
            .map(|a| a.credits)
            .sum();
        let remaining = (definition.max_credits - already_earned).max(0.0);
        let awarded = definition.credit_rate.min(remaining);
        if awarded > 0.0 {
            validator.earn_contribution_credits(definition.key, awarded, definition.description, now);
        }
        Ok(awarded)
    }

    /// Adjusts every active validator's dynamic weight in response to a
    /// network-wide load condition: `"high_load"` and `"low_load"` nudge
    /// the weight by `factor`, `"normal"` resets it to 1.0.
    pub fn update_network_conditions(&mut self, condition: &str, factor: f64) {
        for validator in self.validators.values_mut() {
            validator.adjust_dynamic_weight(condition, factor);
        }
    }

    /// Pairs up active validators at random and has each rate its partner
    /// with a small amount of synthesized noise around the partner's
    /// current reliability score, then recomputes reputation for everyone
    /// rated. Mirrors `assign_peer_reviews`/`process_peer_ratings` in the
    /// original, run only when at least two validators are registered.
    pub fn trigger_peer_reviews(&mut self, block_number: u64, now: f64) {
        if block_number == 0 || block_number % PEER_REVIEW_INTERVAL != 0 {
            return;
        }
        let mut addresses: Vec<String> = self
            .validators
            .values()
            .filter(|v| v.is_active)
            .map(|v| v.address.clone())
            .collect();
        if addresses.len() < 2 {
            return;
        }
        addresses.sort();

        let mut rng = rand::thread_rng();
        addresses.shuffle(&mut rng);

        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut iter = addresses.chunks_exact(2);
        for pair in &mut iter {
            pairs.push((pair[0].clone(), pair[1].clone()));
        }
        if let [leftover] = iter.remainder() {
            if let Some((_, partner)) = pairs.first() {
                pairs.push((leftover.clone(), partner.clone()));
            }
        }

        for (rater, ratee) in pairs {
            let baseline = self.validators.get(&ratee).map(|v| v.reliability_score).unwrap_or(100.0);
            let noise: f64 = rng.gen_range(-10.0..=10.0);
            let rating = (baseline + noise).clamp(1.0, 100.0);
            if let Some(ratee_validator) = self.validators.get_mut(&ratee) {
                let _ = ratee_validator.rate_peer(&rater, rating, "periodic peer review", now);
                ratee_validator.update_reputation_score();
            }
        }
    }

    pub fn network_performance_summary(&mut self, now: f64) -> NetworkPerformanceSummary {
        let count = self.validators.len();
        if count == 0 {
            return NetworkPerformanceSummary {
                total_validators: 0,
                active_validators: 0,
                total_stake: 0.0,
                average_pocs_score: 0.0,
                average_reputation: 0.0,
                average_reliability: 0.0,
                average_collaboration: 0.0,
                average_network_health: 0.0,
            };
        }

        let mut active = 0usize;
        let mut total_stake = 0.0;
        let mut score_sum = 0.0;
        let mut reputation_sum = 0.0;
        let mut reliability_sum = 0.0;
        let mut collaboration_sum = 0.0;
        let mut network_health_sum = 0.0;

        for validator in self.validators.values_mut() {
            if validator.is_active {
                active += 1;
            }
            total_stake += validator.stake;
            score_sum += validator.calculate_score(now, false);
            reputation_sum += validator.reputation_score;
            reliability_sum += validator.reliability_score;
            collaboration_sum += validator.collaboration_score;
            network_health_sum += validator.network_health_contribution;
        }

        let n = count as f64;
        NetworkPerformanceSummary {
            total_validators: count,
            active_validators: active,
            total_stake,
            average_pocs_score: score_sum / n,
            average_reputation: reputation_sum / n,
            average_reliability: reliability_sum / n,
            average_collaboration: collaboration_sum / n,
            average_network_health: network_health_sum / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_validator_returns_none_when_empty() {
        let mut registry = ValidatorRegistry::new();
        assert_eq!(registry.select_validator(0.0), None);
    }

    #[test]
    fn select_validator_picks_the_only_active_validator() {
        let mut registry = ValidatorRegistry::new();
        registry.register("lakha1only", 100.0, 1000.0);
        assert_eq!(registry.select_validator(1000.0), Some("lakha1only".to_string()));
    }

    #[test]
    fn select_validator_falls_back_to_address_order_with_zero_stake() {
        let mut registry = ValidatorRegistry::new();
        registry.register("lakha1zzz", 0.0, 1000.0);
        registry.register("lakha1aaa", 0.0, 1000.0);
        assert_eq!(registry.select_validator(1000.0), Some("lakha1aaa".to_string()));
    }

    #[test]
    fn record_contribution_activity_caps_at_max_credits() {
        let mut registry = ValidatorRegistry::new();
        registry.register("lakha1v", 0.0, 1000.0);
        for _ in 0..20 {
            registry
                .record_contribution_activity("lakha1v", "documentation", 1000.0)
                .unwrap();
        }
        let total: f64 = registry
            .get("lakha1v")
            .unwrap()
            .contribution_activities
            .iter()
            .filter(|a| a.activity == "documentation")
            .map(|a| a.credits)
            .sum();
        assert_eq!(total, 20.0); // documentation max_credits
    }

    #[test]
    fn trigger_peer_reviews_only_runs_every_interval() {
        let mut registry = ValidatorRegistry::new();
        registry.register("lakha1a", 10.0, 1000.0);
        registry.register("lakha1b", 10.0, 1000.0);
        registry.trigger_peer_reviews(1, 1000.0);
        assert!(registry.get("lakha1a").unwrap().peer_ratings.is_empty());
        registry.trigger_peer_reviews(PEER_REVIEW_INTERVAL, 1000.0);
        let rated = registry.get("lakha1a").unwrap().peer_ratings.len()
            + registry.get("lakha1b").unwrap().peer_ratings.len();
        assert!(rated >= 1);
    }

    #[test]
    fn network_performance_summary_averages_across_validators() {
        let mut registry = ValidatorRegistry::new();
        registry.register("lakha1a", 10.0, 1000.0);
        registry.register("lakha1b", 30.0, 1000.0);
        let summary = registry.network_performance_summary(1000.0);
        assert_eq!(summary.total_validators, 2);
        assert_eq!(summary.total_stake, 40.0);
    }
}
