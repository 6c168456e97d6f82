use super::models::Severity;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Below this fraction the vulnerability scan narrows to high-signal templates.
pub const NARROW_SCOPE_THRESHOLD: f64 = 0.3;
/// Below this fraction the vulnerability scan request rate is capped as well.
pub const CAP_RATE_THRESHOLD: f64 = 0.2;
pub const DEGRADED_RATE_LIMIT: u32 = 50;

const HIGH_SIGNAL_TAG: &str = "cve";
const HIGH_SIGNAL_SEVERITIES: [Severity; 2] = [Severity::Critical, Severity::High];

/// Wall-clock budget shared by all stages. Stages are never preempted; the
/// remaining fraction only shrinks what a stage is asked to do before it starts.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    total: Duration,
    start: Instant,
}

impl TimeBudget {
    pub fn new(total: Duration) -> Self {
        Self::starting_at(total, Instant::now())
    }

    pub fn starting_at(total: Duration, start: Instant) -> Self {
        Self { total, start }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining_fraction(&self) -> f64 {
        self.fraction_after(self.elapsed())
    }

    /// `max(0, 1 - elapsed/total)`, clamped to `[0, 1]`.
    pub fn fraction_after(&self, elapsed: Duration) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        let used = elapsed.as_secs_f64() / self.total.as_secs_f64();
        (1.0 - used).clamp(0.0, 1.0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_fraction() <= 0.0
    }
}

/// What the vulnerability stage is asked to cover. Empty lists mean "no
/// restriction" in that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VulnScope {
    pub templates: Vec<String>,
    pub tags: Vec<String>,
    pub severities: Vec<Severity>,
    pub rate_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    pub scope: VulnScope,
    pub narrowed: bool,
    pub rate_capped: bool,
}

impl VulnScope {
    /// Shrink the scope for the given remaining budget fraction. The result is
    /// never broader than `self`.
    pub fn degrade(&self, remaining_fraction: f64) -> Degradation {
        let mut scope = self.clone();
        let mut narrowed = false;
        let mut rate_capped = false;

        if remaining_fraction < NARROW_SCOPE_THRESHOLD {
            let severities: Vec<Severity> = if self.severities.is_empty() {
                HIGH_SIGNAL_SEVERITIES.to_vec()
            } else {
                self.severities
                    .iter()
                    .copied()
                    .filter(|s| HIGH_SIGNAL_SEVERITIES.contains(s))
                    .collect()
            };
            // an empty intersection would read as "everything"
            if !severities.is_empty() && severities != self.severities {
                scope.severities = severities;
                narrowed = true;
            }

            let has_cve = self.tags.iter().any(|t| t.eq_ignore_ascii_case(HIGH_SIGNAL_TAG));
            if self.tags.is_empty() || (has_cve && self.tags.len() > 1) {
                scope.tags = vec![HIGH_SIGNAL_TAG.to_string()];
                narrowed = true;
            }
        }

        if remaining_fraction < CAP_RATE_THRESHOLD && scope.rate_limit > DEGRADED_RATE_LIMIT {
            scope.rate_limit = DEGRADED_RATE_LIMIT;
            rate_capped = true;
        }

        Degradation { scope, narrowed, rate_capped }
    }

    /// True when every dimension of `self` is at most as broad as `other`.
    #[cfg(test)]
    pub fn is_within(&self, other: &VulnScope) -> bool {
        fn subset<T: PartialEq>(narrow: &[T], broad: &[T]) -> bool {
            broad.is_empty() || (!narrow.is_empty() && narrow.iter().all(|n| broad.contains(n)))
        }
        let tags_within = other.tags.is_empty()
            || (!self.tags.is_empty()
                && self
                    .tags
                    .iter()
                    .all(|t| other.tags.iter().any(|o| o.eq_ignore_ascii_case(t))));

        subset(&self.templates, &other.templates)
            && tags_within
            && subset(&self.severities, &other.severities)
            && self.rate_limit <= other.rate_limit
    }
}
