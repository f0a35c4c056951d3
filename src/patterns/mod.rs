//! Pattern learning storage (spec §4.7, §5).
//!
//! Two EMA-learned stores, each behind a sharded `parking_lot::RwLock`
//! map keyed by its own tuple, so `get`/`upsert` are atomic per key under
//! concurrent batch workers without needing one global mutex — the same
//! preference for `parking_lot` plus hand-rolled sharding over pulling in
//! a concurrent-map crate that the rest of this codebase shows.

use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::config::PatternLearningConfig;
use crate::domain::order::{Category, Shift};
use crate::domain::pattern::{DailyLaborPattern, TimeslotPattern};
use crate::error::PipelineError;

const SHARD_COUNT: usize = 16;

fn shard_index<K: Hash>(key: &K) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

struct Sharded<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Sharded<K, V> {
    fn new() -> Self {
        Self { shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect() }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.shards[shard_index(key)].read().get(key).cloned()
    }

    fn upsert(&self, key: K, f: impl FnOnce(Option<V>) -> V) {
        let shard = &self.shards[shard_index(&key)];
        let mut guard = shard.write();
        let existing = guard.get(&key).cloned();
        guard.insert(key, f(existing));
    }

    fn all(&self) -> Vec<V> {
        self.shards.iter().flat_map(|s| s.read().values().cloned().collect::<Vec<_>>()).collect()
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DailyKey {
    pub restaurant: String,
    pub day_of_week: u8,
}

pub struct DailyLaborPatternStore {
    store: Sharded<DailyKey, DailyLaborPattern>,
}

impl DailyLaborPatternStore {
    pub fn new() -> Self {
        Self { store: Sharded::new() }
    }

    /// Applies the EMA update rule (spec §4.7) for one observation.
    pub fn learn(
        &self,
        restaurant: &str,
        day_of_week: u8,
        observed_pct: f64,
        observed_hours: f64,
        now: NaiveDateTime,
        rates: &crate::config::LearningRates,
    ) -> Result<(), PipelineError> {
        if day_of_week > 6 {
            return Err(PipelineError::Pattern(format!("invalid day_of_week {day_of_week}")));
        }
        let key = DailyKey { restaurant: restaurant.to_string(), day_of_week };
        self.store.upsert(key, |existing| {
            let mut pattern = existing.unwrap_or_else(|| {
                DailyLaborPattern::new(restaurant.to_string(), day_of_week, now)
            });
            let alpha = if pattern.observations < 5 {
                rates.early_observations
            } else {
                rates.mature_observations
            };
            pattern.expected_labor_percentage =
                (1.0 - alpha) * pattern.expected_labor_percentage + alpha * observed_pct;
            pattern.expected_total_hours =
                (1.0 - alpha) * pattern.expected_total_hours + alpha * observed_hours;
            pattern.observations += 1;
            pattern.confidence = (1.0 - 1.0 / (pattern.observations as f64 + 1.0)).min(0.95);
            pattern.last_updated = now;
            pattern.is_fallback = false;
            pattern.days_averaged = 0;
            pattern
        });
        Ok(())
    }

    /// Exact match if reliable; otherwise a cross-day average fallback
    /// annotated `is_fallback = true`. `None` if no reliable pattern
    /// exists at all for this restaurant.
    pub fn get(&self, restaurant: &str, day_of_week: u8) -> Option<DailyLaborPattern> {
        let key = DailyKey { restaurant: restaurant.to_string(), day_of_week: day_of_week.min(6) };
        if let Some(pattern) = self.store.get(&key) {
            if pattern.is_reliable() {
                return Some(pattern);
            }
        }
        self.fallback(restaurant)
    }

    fn fallback(&self, restaurant: &str) -> Option<DailyLaborPattern> {
        let reliable: Vec<DailyLaborPattern> = self
            .store
            .all()
            .into_iter()
            .filter(|p| p.restaurant == restaurant && p.is_reliable())
            .collect();
        if reliable.is_empty() {
            return None;
        }
        let n = reliable.len() as f64;
        let avg_pct = reliable.iter().map(|p| p.expected_labor_percentage).sum::<f64>() / n;
        let avg_hours = reliable.iter().map(|p| p.expected_total_hours).sum::<f64>() / n;
        let avg_confidence = reliable.iter().map(|p| p.confidence).sum::<f64>() / n;
        Some(DailyLaborPattern {
            restaurant: restaurant.to_string(),
            // 7 is not a valid weekday index; marks this as the synthetic
            // cross-day average rather than a real stored key.
            day_of_week: 7,
            expected_labor_percentage: avg_pct,
            expected_total_hours: avg_hours,
            confidence: avg_confidence,
            observations: reliable.iter().map(|p| p.observations).sum(),
            last_updated: reliable.iter().map(|p| p.last_updated).max().unwrap(),
            is_fallback: true,
            days_averaged: reliable.len() as u32,
        })
    }

    pub fn statistics(&self) -> PatternStoreStatistics {
        let all = self.store.all();
        PatternStoreStatistics {
            total_keys: all.len(),
            reliable_keys: all.iter().filter(|p| p.is_reliable()).count(),
        }
    }

    pub fn list(&self) -> Vec<DailyLaborPattern> {
        self.store.all()
    }
}

impl Default for DailyLaborPatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeslotKey {
    pub restaurant: String,
    pub day_of_week: String,
    pub shift: Shift,
    pub window: u32,
    pub category: Category,
}

pub struct TimeslotPatternStore {
    store: Sharded<TimeslotKey, TimeslotPattern>,
}

impl TimeslotPatternStore {
    pub fn new() -> Self {
        Self { store: Sharded::new() }
    }

    /// Learns only from timeslots whose `passed_standards == true`
    /// (spec §4.7): callers must not invoke this for failing windows.
    pub fn learn(
        &self,
        restaurant: &str,
        day_of_week: &str,
        shift: Shift,
        window: u32,
        category: Category,
        observed_avg_minutes: f64,
        now: NaiveDateTime,
    ) {
        let key = TimeslotKey {
            restaurant: restaurant.to_string(),
            day_of_week: day_of_week.to_string(),
            shift,
            window,
            category,
        };
        self.store.upsert(key, |existing| {
            let mut pattern = existing.unwrap_or_else(|| {
                TimeslotPattern::new(
                    restaurant.to_string(),
                    day_of_week.to_string(),
                    shift,
                    window,
                    category,
                    now,
                )
            });
            let prior_baseline = pattern.baseline_time;
            pattern.baseline_time = 0.8 * pattern.baseline_time + 0.2 * observed_avg_minutes;
            pattern.variance = 0.8 * pattern.variance + 0.2 * (observed_avg_minutes - prior_baseline).abs();
            pattern.confidence = (pattern.confidence + 0.1 / (1.0 + pattern.observations as f64)).min(1.0);
            pattern.observations += 1;
            pattern.last_updated = now;
            pattern
        });
    }

    pub fn get(
        &self,
        restaurant: &str,
        day_of_week: &str,
        shift: Shift,
        window: u32,
        category: Category,
    ) -> Option<TimeslotPattern> {
        let key = TimeslotKey {
            restaurant: restaurant.to_string(),
            day_of_week: day_of_week.to_string(),
            shift,
            window,
            category,
        };
        self.store.get(&key).filter(|p| p.is_reliable())
    }

    pub fn statistics(&self) -> PatternStoreStatistics {
        let all = self.store.all();
        PatternStoreStatistics {
            total_keys: all.len(),
            reliable_keys: all.iter().filter(|p| p.is_reliable()).count(),
        }
    }

    pub fn list(&self) -> Vec<TimeslotPattern> {
        self.store.all()
    }
}

impl Default for TimeslotPatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PatternStoreStatistics {
    pub total_keys: usize,
    pub reliable_keys: usize,
}

/// Both stores together, owned for the lifetime of one batch run and
/// shared (not per-run) across concurrent orchestrator workers.
pub struct PatternStores {
    daily: DailyLaborPatternStore,
    timeslot: TimeslotPatternStore,
    config: PatternLearningConfig,
}

impl PatternStores {
    pub fn new() -> Self {
        Self {
            daily: DailyLaborPatternStore::new(),
            timeslot: TimeslotPatternStore::new(),
            config: PatternLearningConfig::default(),
        }
    }

    pub fn with_config(config: PatternLearningConfig) -> Self {
        Self {
            daily: DailyLaborPatternStore::new(),
            timeslot: TimeslotPatternStore::new(),
            config,
        }
    }

    pub fn daily(&self) -> &DailyLaborPatternStore {
        &self.daily
    }

    pub fn timeslots(&self) -> &TimeslotPatternStore {
        &self.timeslot
    }

    pub fn learning_rates(&self) -> &crate::config::LearningRates {
        &self.config.learning_rates
    }

    pub fn len_hint(&self) -> usize {
        self.daily.store.len() + self.timeslot.store.len()
    }
}

impl Default for PatternStores {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn daily_pattern_converges_within_fifteen_updates() {
        let store = DailyLaborPatternStore::new();
        let rates = crate::config::LearningRates::default();
        for _ in 0..20 {
            store.learn("SDR", 0, 29.7, 153.4, now(), &rates).unwrap();
        }
        let pattern = store.get("SDR", 0).unwrap();
        assert!((pattern.expected_labor_percentage - 29.7).abs() / 29.7 < 0.005);
        assert!((pattern.expected_total_hours - 153.4).abs() / 153.4 < 0.005);
        assert!((pattern.confidence - (1.0 - 1.0 / 21.0)).abs() < 1e-9);
        assert!(pattern.is_reliable());
    }

    #[test]
    fn fallback_is_annotated_and_not_learned_back() {
        let store = DailyLaborPatternStore::new();
        let rates = crate::config::LearningRates::default();
        for _ in 0..10 {
            store.learn("SDR", 0, 25.0, 100.0, now(), &rates).unwrap();
        }
        // Tuesday has no observations; fallback should kick in.
        let fallback = store.get("SDR", 1).unwrap();
        assert!(fallback.is_fallback);
        assert_eq!(fallback.days_averaged, 1);
    }

    #[test]
    fn timeslot_pattern_confidence_monotonic() {
        let store = TimeslotPatternStore::new();
        let mut prev_conf = 0.0;
        for _ in 0..10 {
            store.learn("SDR", "Monday", Shift::Morning, 20, Category::Lobby, 9.5, now());
            let pattern = store
                .store
                .get(&TimeslotKey {
                    restaurant: "SDR".into(),
                    day_of_week: "Monday".into(),
                    shift: Shift::Morning,
                    window: 20,
                    category: Category::Lobby,
                })
                .unwrap();
            assert!(pattern.confidence >= prev_conf);
            prev_conf = pattern.confidence;
        }
    }
}
