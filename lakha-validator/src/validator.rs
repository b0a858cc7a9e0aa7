//! A single validator's PoCS record: stake, uptime, contribution, peer
//! reputation, and the penalty/rehabilitation machinery layered on top
//! scoring, selection, and penalty/rehabilitation machinery.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use lakha_common::error::{NodeError, Result};

const SCORE_CACHE_SECONDS: f64 = 5.0;
const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;
const PENALTY_WINDOW_SECONDS: f64 = 30.0 * SECONDS_PER_DAY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyRecord {
    pub timestamp: f64,
    pub kind: String,
    pub severity: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributionActivityRecord {
    pub timestamp: f64,
    pub activity: String,
    pub credits: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRating {
    pub rating: f64,
    pub timestamp: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    pub address: String,
    pub stake: f64,
    pub is_active: bool,

    pub registered_at: f64,
    pub last_activity: f64,
    pub last_seen: f64,
    pub total_uptime_seconds: f64,

    pub blocks_attempted: u64,
    pub blocks_successful: u64,
    pub blocks_validated: u64,
    pub last_block_time: f64,
    pub total_rewards: f64,
    pub txs_processed: u64,

    pub all_transaction_types: BTreeSet<String>,

    pub contribution_score: f64,
    pub reliability_score: f64,
    pub diversity_bonus: f64,
    pub collaboration_score: f64,
    pub network_health_contribution: f64,
    pub dynamic_weight_adjustment: f64,

    pub peer_ratings: HashMap<String, PeerRating>,
    pub average_peer_rating: f64,
    pub reputation_score: f64,
    pub last_peer_review: f64,

    pub penalty_history: Vec<PenaltyRecord>,
    pub current_penalty_multiplier: f64,
    pub rehabilitation_progress: f64,
    pub contribution_credits: f64,
    pub contribution_activities: Vec<ContributionActivityRecord>,

    #[serde(skip)]
    cached_score: f64,
    #[serde(skip)]
    last_score_calculation: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub pocs_score: f64,
    pub stake: f64,
    pub reputation: f64,
    pub reliability: f64,
    pub contribution_score: f64,
    pub collaboration_score: f64,
    pub network_health_contribution: f64,
    pub penalty_multiplier: f64,
    pub rehabilitation_progress: f64,
    pub contribution_credits: f64,
    pub blocks_success_rate: f64,
    pub dynamic_weight: f64,
    pub total_activities: usize,
    pub total_penalties: usize,
}

impl Validator {
    pub fn new(address: impl Into<String>, stake: f64, now: f64) -> Self {
        Self {
            address: address.into(),
            stake,
            is_active: true,
            registered_at: now,
            last_activity: now,
            last_seen: now,
            total_uptime_seconds: 0.0,
            blocks_attempted: 0,
            blocks_successful: 0,
            blocks_validated: 0,
            last_block_time: 0.0,
            total_rewards: 0.0,
            txs_processed: 0,
            all_transaction_types: BTreeSet::new(),
            contribution_score: 0.0,
            reliability_score: 100.0,
            diversity_bonus: 0.0,
            collaboration_score: 0.0,
            network_health_contribution: 0.0,
            dynamic_weight_adjustment: 1.0,
            peer_ratings: HashMap::new(),
            average_peer_rating: 100.0,
            reputation_score: 100.0,
            last_peer_review: 0.0,
            penalty_history: Vec::new(),
            current_penalty_multiplier: 1.0,
            rehabilitation_progress: 0.0,
            contribution_credits: 0.0,
            contribution_activities: Vec::new(),
            cached_score: 0.0,
            last_score_calculation: 0.0,
        }
    }

    fn invalidate_score_cache(&mut self) {
        self.last_score_calculation = 0.0;
    }

    /// The PoCS score formula, cached for `SCORE_CACHE_SECONDS`
    /// unless `force` is set or a mutation already invalidated the cache.
    pub fn calculate_score(&mut self, now: f64, force: bool) -> f64 {
        if !force && (now - self.last_score_calculation) < SCORE_CACHE_SECONDS {
            return self.cached_score;
        }

        let days_inactive = (now - self.last_activity) / SECONDS_PER_DAY;
        let effective_stake = self.stake * (1.0 - 0.001 * days_inactive).max(0.1);
        let stake_comp = 0.25 * effective_stake * self.dynamic_weight_adjustment;

        let uptime_factor = (self.total_uptime_seconds / (now - self.registered_at).max(1.0))
            .clamp(0.0, 1.0);
        let block_success = self.blocks_successful as f64 / (self.blocks_attempted as f64).max(1.0);
        let txs_factor = (self.txs_processed as f64 / 100.0).clamp(0.0, 1.0);

        let contrib_raw = self.contribution_score * 0.3
            + uptime_factor * 15.0
            + block_success * 15.0
            + txs_factor * 15.0
            + self.collaboration_score * 8.0
            + self.network_health_contribution * 5.0;
        let contrib_comp = 0.25 * contrib_raw;

        let reliability_comp = 0.25 * self.reliability_score;
        let reputation_comp = 0.15 * self.reputation_score;
        let diversity_comp = 0.10 * self.diversity_bonus;

        let last_penalty_severity = self.penalty_history.last().map(|p| p.severity).unwrap_or(0.0);
        let penalty_comp = 0.10 * self.current_penalty_multiplier * last_penalty_severity;

        let score = (stake_comp + contrib_comp + reliability_comp + reputation_comp + diversity_comp
            - penalty_comp)
            .max(0.0);

        self.cached_score = score;
        self.last_score_calculation = now;
        score
    }

    pub fn update_activity(&mut self, now: f64) {
        self.last_activity = now;
        self.last_seen = now;
    }

    pub fn update_contribution_score(&mut self, new_contribution: f64, event: &str, now: f64) {
        self.contribution_score = self.contribution_score * 0.9 + new_contribution * 0.1;
        if !event.is_empty() {
            self.contribution_activities.push(ContributionActivityRecord {
                timestamp: now,
                activity: event.to_string(),
                credits: new_contribution,
                description: String::new(),
            });
        }
        self.invalidate_score_cache();
    }

    pub fn update_reliability_score(&mut self, success: bool, response_time: f64) {
        let _ = response_time;
        if success {
            self.reliability_score = (self.reliability_score + 1.0).min(100.0);
        } else {
            self.reliability_score = (self.reliability_score - 5.0).max(0.0);
        }
        self.invalidate_score_cache();
    }

    pub fn update_uptime(&mut self, seconds: f64) {
        self.total_uptime_seconds += seconds;
    }

    pub fn record_block_attempt(&mut self, success: bool, tx_count: u64) {
        self.blocks_attempted += 1;
        if success {
            self.blocks_successful += 1;
        }
        self.txs_processed += tx_count;
    }

    pub fn record_transaction_kinds(&mut self, kinds: impl IntoIterator<Item = String>) {
        for kind in kinds {
            self.all_transaction_types.insert(kind);
        }
        self.diversity_bonus = self.all_transaction_types.len() as f64;
    }

    pub fn update_collaboration_score(&mut self, activity: &str, increase: f64, now: f64) {
        self.collaboration_score = (self.collaboration_score + increase).min(100.0);
        self.contribution_activities.push(ContributionActivityRecord {
            timestamp: now,
            activity: format!("collaboration_{activity}"),
            credits: increase,
            description: String::new(),
        });
        self.invalidate_score_cache();
    }

    pub fn update_network_health_contribution(&mut self, metric: &str, contribution: f64, now: f64) {
        self.network_health_contribution = (self.network_health_contribution + contribution).min(100.0);
        self.contribution_activities.push(ContributionActivityRecord {
            timestamp: now,
            activity: format!("network_health_{metric}"),
            credits: contribution,
            description: String::new(),
        });
        self.invalidate_score_cache();
    }

    /// `high_load` raises the weight up to 1.5x, `low_load` lowers it down
    /// to 0.5x, `normal` resets it to 1.0.
    pub fn adjust_dynamic_weight(&mut self, condition: &str, factor: f64) {
        match condition {
            "high_load" => {
                self.dynamic_weight_adjustment = (self.dynamic_weight_adjustment * factor).min(1.5)
            }
            "low_load" => {
                self.dynamic_weight_adjustment = (self.dynamic_weight_adjustment * factor).max(0.5)
            }
            "normal" => self.dynamic_weight_adjustment = 1.0,
            _ => {}
        }
        self.invalidate_score_cache();
    }

    pub fn calculate_penalty_multiplier(&self, now: f64) -> f64 {
        let recent = self
            .penalty_history
            .iter()
            .filter(|p| now - p.timestamp < PENALTY_WINDOW_SECONDS)
            .count();
        (1.0 + recent as f64 * 0.5).min(5.0)
    }

    pub fn apply_penalty(&mut self, kind: &str, severity: f64, reason: &str, now: f64) {
        self.penalty_history.push(PenaltyRecord {
            timestamp: now,
            kind: kind.to_string(),
            severity,
            reason: reason.to_string(),
        });
        let multiplier = self.calculate_penalty_multiplier(now);
        let actual = severity * multiplier;
        self.current_penalty_multiplier = multiplier;
        self.reputation_score = (self.reputation_score - actual * 0.5).max(0.0);
        self.reliability_score = (self.reliability_score - actual * 0.3).max(0.0);
        self.rehabilitation_progress = 0.0;
        self.invalidate_score_cache();
    }

    /// An operator-invoked reset layered on top of (not replacing) the
    /// automatic penalty machinery above.
    pub fn community_override_penalty(&mut self, new_multiplier: f64, reason: &str, now: f64) {
        let old = self.current_penalty_multiplier;
        self.current_penalty_multiplier = new_multiplier;
        self.penalty_history.push(PenaltyRecord {
            timestamp: now,
            kind: "community_override".to_string(),
            severity: old - new_multiplier,
            reason: format!("Community override: {reason}"),
        });
        self.invalidate_score_cache();
    }

    pub fn update_rehabilitation_progress(&mut self, contribution: f64) {
        self.rehabilitation_progress = (self.rehabilitation_progress + contribution).min(100.0);
        if self.rehabilitation_progress >= 100.0 {
            self.current_penalty_multiplier = (self.current_penalty_multiplier * 0.8).max(1.0);
            self.rehabilitation_progress = 0.0;
        }
    }

    pub fn earn_contribution_credits(&mut self, activity: &str, credits: f64, description: &str, now: f64) {
        self.contribution_credits += credits;
        self.contribution_activities.push(ContributionActivityRecord {
            timestamp: now,
            activity: activity.to_string(),
            credits,
            description: description.to_string(),
        });
        self.update_rehabilitation_progress(credits);
        self.update_contribution_score(credits * 0.5, &format!("contribution_activity_{activity}"), now);
    }

    /// Moves `min(credits, contribution_credits)` credits to stake at a
    /// 1:0.1 ratio, returning the stake actually earned.
    pub fn convert_credits_to_stake(&mut self, credits: f64) -> f64 {
        let moved = credits.min(self.contribution_credits);
        let stake_earned = moved * 0.1;
        self.contribution_credits -= moved;
        self.stake += stake_earned;
        stake_earned
    }

    pub fn rate_peer(&mut self, peer_address: &str, rating: f64, reason: &str, now: f64) -> Result<()> {
        if !(1.0..=100.0).contains(&rating) {
            return Err(NodeError::KindSpecific("peer rating must be in [1, 100]".into()));
        }
        self.peer_ratings.insert(
            peer_address.to_string(),
            PeerRating {
                rating,
                timestamp: now,
                reason: reason.to_string(),
            },
        );
        self.last_peer_review = now;
        Ok(())
    }

    pub fn average_peer_rating(&self) -> f64 {
        if self.peer_ratings.is_empty() {
            return 100.0;
        }
        let sum: f64 = self.peer_ratings.values().map(|r| r.rating).sum();
        sum / self.peer_ratings.len() as f64
    }

    pub fn update_reputation_score(&mut self) {
        let peer_rating = self.average_peer_rating();
        self.reputation_score = 0.4 * peer_rating
            + 0.3 * self.reliability_score
            + 0.3 * self.contribution_score.min(100.0);
        self.average_peer_rating = peer_rating;
        self.invalidate_score_cache();
    }

    pub fn performance_metrics(&mut self, now: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            pocs_score: self.calculate_score(now, false),
            stake: self.stake,
            reputation: self.reputation_score,
            reliability: self.reliability_score,
            contribution_score: self.contribution_score,
            collaboration_score: self.collaboration_score,
            network_health_contribution: self.network_health_contribution,
            penalty_multiplier: self.current_penalty_multiplier,
            rehabilitation_progress: self.rehabilitation_progress,
            contribution_credits: self.contribution_credits,
            blocks_success_rate: self.blocks_successful as f64 / (self.blocks_attempted as f64).max(1.0),
            dynamic_weight: self.dynamic_weight_adjustment,
            total_activities: self.contribution_activities.len(),
            total_penalties: self.penalty_history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_validator_has_zero_score_with_no_stake() {
        let mut v = Validator::new("lakha1v", 0.0, 1000.0);
        assert_eq!(v.calculate_score(1000.0, true), 0.0);
    }

    #[test]
    fn score_cache_holds_for_five_seconds() {
        let mut v = Validator::new("lakha1v", 100.0, 1000.0);
        let first = v.calculate_score(1000.0, false);
        v.stake = 999_999.0;
        let cached = v.calculate_score(1002.0, false);
        assert_eq!(first, cached);
        let recalculated = v.calculate_score(1006.0, false);
        assert!(recalculated > cached);
    }

    #[test]
    fn apply_penalty_reduces_reputation_and_reliability() {
        let mut v = Validator::new("lakha1v", 100.0, 1000.0);
        let before_rep = v.reputation_score;
        v.apply_penalty("double_sign", 10.0, "equivocation", 1000.0);
        assert!(v.reputation_score < before_rep);
        assert_eq!(v.rehabilitation_progress, 0.0);
    }

    #[test]
    fn rehabilitation_reduces_multiplier_at_100() {
        let mut v = Validator::new("lakha1v", 100.0, 1000.0);
        v.apply_penalty("minor", 1.0, "r", 1000.0);
        let multiplier_after_penalty = v.current_penalty_multiplier;
        v.update_rehabilitation_progress(100.0);
        assert!(v.current_penalty_multiplier < multiplier_after_penalty || multiplier_after_penalty == 1.0);
        assert_eq!(v.rehabilitation_progress, 0.0);
    }

    #[test]
    fn convert_credits_to_stake_uses_one_to_point_one_ratio() {
        let mut v = Validator::new("lakha1v", 0.0, 1000.0);
        v.contribution_credits = 50.0;
        let earned = v.convert_credits_to_stake(20.0);
        assert_eq!(earned, 2.0);
        assert_eq!(v.contribution_credits, 30.0);
        assert_eq!(v.stake, 2.0);
    }

    #[test]
    fn rate_peer_rejects_out_of_range() {
        let mut v = Validator::new("lakha1v", 0.0, 1000.0);
        assert!(v.rate_peer("lakha1peer", 0.0, "bad", 1000.0).is_err());
        assert!(v.rate_peer("lakha1peer", 101.0, "bad", 1000.0).is_err());
        assert!(v.rate_peer("lakha1peer", 50.0, "ok", 1000.0).is_ok());
    }

    #[test]
    fn average_peer_rating_defaults_to_100() {
        let v = Validator::new("lakha1v", 0.0, 1000.0);
        assert_eq!(v.average_peer_rating(), 100.0);
    }
}
