//! Per-condition hysteresis state

use integrity_events::ViolationKind;
use serde::{Deserialize, Serialize};

/// Continuous conditions tracked by the classifier, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    FaceMissing,
    MultipleFaces,
    GazeAway,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 3] = [
        ConditionKind::FaceMissing,
        ConditionKind::MultipleFaces,
        ConditionKind::GazeAway,
    ];

    pub fn violation_kind(&self) -> ViolationKind {
        match self {
            ConditionKind::FaceMissing => ViolationKind::FaceMissing,
            ConditionKind::MultipleFaces => ViolationKind::MultipleFaces,
            ConditionKind::GazeAway => ViolationKind::GazeAway,
        }
    }
}

/// Hysteresis timer for one condition kind
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ConditionTimer {
    /// Condition not observed
    #[default]
    Inactive,

    /// Condition observed since `since`, not yet held long enough
    Onset { since: f64 },

    /// Condition held past the debounce; `last_emitted` paces repeats
    Confirmed { since: f64, last_emitted: f64, repeats: u32 },
}

/// A violation the timer wants emitted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emission {
    /// How long the condition has held (ms)
    pub duration_ms: f64,
    /// 0 for the confirming emission, then 1, 2, ... for repeats
    pub repeat: u32,
}

impl ConditionTimer {
    /// Whether the condition is currently considered present
    pub fn condition_active(&self) -> bool {
        !matches!(self, ConditionTimer::Inactive)
    }

    /// Onset timestamp; `Some` exactly when the condition is active
    pub fn onset_timestamp(&self) -> Option<f64> {
        match *self {
            ConditionTimer::Inactive => None,
            ConditionTimer::Onset { since } | ConditionTimer::Confirmed { since, .. } => Some(since),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConditionTimer::Confirmed { .. })
    }

    /// Feed one observation of the condition.
    ///
    /// `reemit_ms == 0` disables repeats while confirmed.
    pub fn observe(&mut self, present: bool, timestamp_ms: f64, debounce_ms: f64, reemit_ms: f64) -> Option<Emission> {
        if !present {
            *self = ConditionTimer::Inactive;
            return None;
        }

        match *self {
            ConditionTimer::Inactive => {
                *self = ConditionTimer::Onset { since: timestamp_ms };
                // A zero debounce confirms on the first frame.
                self.confirm_if_due(timestamp_ms, debounce_ms)
            }
            ConditionTimer::Onset { .. } => self.confirm_if_due(timestamp_ms, debounce_ms),
            ConditionTimer::Confirmed {
                since,
                last_emitted,
                repeats,
            } => {
                if reemit_ms > 0.0 && timestamp_ms - last_emitted >= reemit_ms {
                    let repeat = repeats + 1;
                    *self = ConditionTimer::Confirmed {
                        since,
                        last_emitted: timestamp_ms,
                        repeats: repeat,
                    };
                    Some(Emission {
                        duration_ms: (timestamp_ms - since).max(0.0),
                        repeat,
                    })
                } else {
                    None
                }
            }
        }
    }

    fn confirm_if_due(&mut self, timestamp_ms: f64, debounce_ms: f64) -> Option<Emission> {
        let ConditionTimer::Onset { since } = *self else {
            return None;
        };
        let held = timestamp_ms - since;
        if held >= debounce_ms {
            *self = ConditionTimer::Confirmed {
                since,
                last_emitted: timestamp_ms,
                repeats: 0,
            };
            Some(Emission {
                duration_ms: held.max(0.0),
                repeat: 0,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onset_invariant() {
        let mut timer = ConditionTimer::default();
        assert!(!timer.condition_active());
        assert_eq!(timer.onset_timestamp(), None);

        timer.observe(true, 100.0, 2000.0, 5000.0);
        assert!(timer.condition_active());
        assert_eq!(timer.onset_timestamp(), Some(100.0));

        timer.observe(false, 200.0, 2000.0, 5000.0);
        assert!(!timer.condition_active());
        assert_eq!(timer.onset_timestamp(), None);
    }

    #[test]
    fn test_confirms_once_then_repeats_at_interval() {
        let mut timer = ConditionTimer::default();
        let mut emissions = Vec::new();
        let mut ts = 0.0;
        while ts <= 12_000.0 {
            if let Some(e) = timer.observe(true, ts, 2000.0, 5000.0) {
                emissions.push((ts, e.repeat));
            }
            ts += 100.0;
        }
        assert_eq!(emissions, vec![(2000.0, 0), (7000.0, 1), (12_000.0, 2)]);
    }

    #[test]
    fn test_zero_reemit_disables_repeats() {
        let mut timer = ConditionTimer::default();
        let count = (0..200)
            .filter_map(|i| timer.observe(true, i as f64 * 100.0, 2000.0, 0.0))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ConditionKind::GazeAway.violation_kind(), ViolationKind::GazeAway);
    }
}
