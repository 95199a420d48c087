use chrono::NaiveTime;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::Config;

/// Admission verdict for a check-in attempt at a given wall-clock time.
///
/// Only new check-ins are time-gated; checkouts are admitted at any hour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    TooEarly,
    Present,
    Late,
    Closed,
}

/// The single authoritative time-window rule.
///
/// Any device-side advisory classification must call this same function; the
/// boundary semantics (late_threshold inclusive to Present, absent_cutoff
/// inclusive to Late) live nowhere else.
#[derive(Clone, Copy, Debug)]
pub struct AdmissionPolicy {
    pub checkin_start: NaiveTime,
    pub late_threshold: NaiveTime,
    pub absent_cutoff: NaiveTime,
}

impl AdmissionPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            checkin_start: cfg.checkin_start,
            late_threshold: cfg.late_threshold,
            absent_cutoff: cfg.absent_cutoff,
        }
    }

    pub fn classify(&self, t: NaiveTime) -> Verdict {
        if t < self.checkin_start {
            Verdict::TooEarly
        } else if t <= self.late_threshold {
            Verdict::Present
        } else if t <= self.absent_cutoff {
            Verdict::Late
        } else {
            Verdict::Closed
        }
    }

    /// Whether a checkout at this time counts as leaving early.
    pub fn is_early_checkout(&self, t: NaiveTime) -> bool {
        t < self.absent_cutoff
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            checkin_start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            late_threshold: NaiveTime::from_hms_opt(7, 15, 0).unwrap(),
            absent_cutoff: NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn window_boundaries() {
        let p = AdmissionPolicy::default();

        assert_eq!(p.classify(t(5, 59, 59)), Verdict::TooEarly);
        assert_eq!(p.classify(t(6, 0, 0)), Verdict::Present);
        // late_threshold itself is still Present
        assert_eq!(p.classify(t(7, 15, 0)), Verdict::Present);
        assert_eq!(p.classify(t(7, 15, 1)), Verdict::Late);
        // absent_cutoff itself is still Late
        assert_eq!(p.classify(t(16, 30, 0)), Verdict::Late);
        assert_eq!(p.classify(t(16, 30, 1)), Verdict::Closed);
    }

    #[test]
    fn early_checkout_boundary() {
        let p = AdmissionPolicy::default();
        assert!(p.is_early_checkout(t(16, 29, 59)));
        assert!(!p.is_early_checkout(t(16, 30, 0)));
    }
}
