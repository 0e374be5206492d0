use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sdr_core::config::FollowUpConfig;
use tracing::warn;

/// Resolve the configured business timezone, falling back to America/Sao_Paulo
/// on a malformed config value rather than failing the whole worker.
fn resolve_tz(config: &FollowUpConfig) -> Tz {
    config.business_tz.parse().unwrap_or_else(|_| {
        warn!(tz = %config.business_tz, "unrecognized business_tz, defaulting to America/Sao_Paulo");
        chrono_tz::America::Sao_Paulo
    })
}

fn parse_hm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

/// Whether `now` falls inside the configured business window, Mon–Fri.
pub fn is_business_hours(config: &FollowUpConfig, now: DateTime<Utc>) -> bool {
    let tz = resolve_tz(config);
    let local = now.with_timezone(&tz);
    if local.weekday().num_days_from_monday() >= 5 {
        return false;
    }
    let start = parse_hm(&config.business_hours_start).unwrap_or(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    let end = parse_hm(&config.business_hours_end).unwrap_or(NaiveTime::from_hms_opt(18, 0, 0).unwrap());
    let t = local.time();
    t >= start && t < end
}

/// The next instant (UTC) at which the business window opens, at or after
/// `from`. Skips weekends.
pub fn next_window_start(config: &FollowUpConfig, from: DateTime<Utc>) -> DateTime<Utc> {
    let tz = resolve_tz(config);
    let local = from.with_timezone(&tz);
    let start = parse_hm(&config.business_hours_start).unwrap_or(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    let end = parse_hm(&config.business_hours_end).unwrap_or(NaiveTime::from_hms_opt(18, 0, 0).unwrap());

    let mut candidate_date = local.date_naive();
    let mut candidate_time = start;

    if local.weekday().num_days_from_monday() < 5 && local.time() < start {
        // still today, just before opening
    } else if local.weekday().num_days_from_monday() < 5 && local.time() < end {
        // inside the window already — caller shouldn't reach here, but be safe
        return from;
    } else {
        candidate_date = candidate_date.succ_opt().unwrap_or(candidate_date);
        candidate_time = start;
    }

    // Advance over weekends.
    loop {
        let dow = candidate_date.weekday().num_days_from_monday();
        if dow < 5 {
            break;
        }
        candidate_date = candidate_date.succ_opt().unwrap_or(candidate_date);
    }

    let naive = candidate_date.and_time(candidate_time);
    match tz.from_local_datetime(&naive).single() {
        Some(dt) => dt.with_timezone(&Utc),
        None => from,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FollowUpConfig {
        FollowUpConfig {
            followup_first_delay_min: 30,
            followup_second_delay_h: 24,
            business_hours_start: "08:00".to_string(),
            business_hours_end: "18:00".to_string(),
            business_tz: "America/Sao_Paulo".to_string(),
        }
    }

    #[test]
    fn weekend_is_outside_business_hours() {
        // 2024-01-06 is a Saturday.
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap();
        assert!(!is_business_hours(&config(), now));
    }

    #[test]
    fn midday_weekday_is_inside_business_hours() {
        // 2024-01-08 is a Monday; 14:00 UTC is 11:00 in America/Sao_Paulo (UTC-3).
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 14, 0, 0).unwrap();
        assert!(is_business_hours(&config(), now));
    }

    #[test]
    fn next_window_from_saturday_lands_on_monday() {
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap();
        let next = next_window_start(&config(), now);
        let local = next.with_timezone(&chrono_tz::America::Sao_Paulo);
        assert_eq!(local.weekday().num_days_from_monday(), 0);
        assert_eq!(local.time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }
}
