use chrono::NaiveTime;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Scope of the daily check-in notification dedup (see NOTIFY_DEDUP_SCOPE).
///
/// The observed school behavior is one SMS per guardian per day across all
/// subjects; multi-subject schools may prefer one per subject instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DedupScope {
    PerStudentDay,
    PerSubjectDay,
}

impl FromStr for DedupScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-student-day" => Ok(DedupScope::PerStudentDay),
            "per-subject-day" => Ok(DedupScope::PerSubjectDay),
            other => Err(format!("unknown dedup scope: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Admission window boundaries (school wall clock)
    pub checkin_start: NaiveTime,
    pub late_threshold: NaiveTime,
    pub absent_cutoff: NaiveTime,

    pub notify_dedup_scope: DedupScope,
    pub school_name: String,

    // Live-scan endpoint protections
    pub rate_scan_per_min: u32,
    pub scan_cooldown_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://attendance.db?mode=rwc".to_string()),
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            checkin_start: parse_time_var("CHECKIN_START", "06:00"),
            late_threshold: parse_time_var("LATE_THRESHOLD", "07:15"),
            absent_cutoff: parse_time_var("ABSENT_CUTOFF", "16:30"),

            notify_dedup_scope: env::var("NOTIFY_DEDUP_SCOPE")
                .unwrap_or_else(|_| "per-student-day".to_string())
                .parse()
                .unwrap(),
            school_name: env::var("SCHOOL_NAME").unwrap_or_else(|_| "KES-SMART".to_string()),

            rate_scan_per_min: env::var("RATE_SCAN_PER_MIN")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap(),
            scan_cooldown_secs: env::var("SCAN_COOLDOWN_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap(),
        }
    }
}

fn parse_time_var(name: &str, default: &str) -> NaiveTime {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
        .unwrap_or_else(|e| panic!("{name} must be HH:MM, got {raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_scope_parses() {
        assert_eq!(
            "per-student-day".parse::<DedupScope>().unwrap(),
            DedupScope::PerStudentDay
        );
        assert_eq!(
            "per-subject-day".parse::<DedupScope>().unwrap(),
            DedupScope::PerSubjectDay
        );
        assert!("daily".parse::<DedupScope>().is_err());
    }

    #[test]
    fn time_var_falls_back_to_default() {
        assert_eq!(
            parse_time_var("NO_SUCH_TIME_VAR", "07:15"),
            NaiveTime::from_hms_opt(7, 15, 0).unwrap()
        );
    }
}
