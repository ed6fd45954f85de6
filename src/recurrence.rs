//! Next-fire computation for recurring campaigns (spec.md §4.6,
//! "Recurrence computation"), used by `scheduler.rs`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::{
    error::EngineError,
    model::{RecurrenceConfig, RecurrencePattern},
};

/// The outcome of advancing a recurring campaign one occurrence.
pub enum NextFire {
    /// The campaign should fire again at this UTC instant.
    At(DateTime<Utc>),
    /// `endDate` or `maxOccurrences` was reached; the campaign completes.
    Completed,
}

/// Computes the next firing instant after `from`, given the campaign's
/// recurrence config and how many occurrences have already fired.
pub fn next_fire(config: &RecurrenceConfig, from: DateTime<Utc>, occurrences_so_far: u32) -> Result<NextFire, EngineError> {
    if let Some(max) = config.max_occurrences {
        if occurrences_so_far + 1 > max {
            return Ok(NextFire::Completed);
        }
    }

    let tz: Tz = config.timezone.parse().map_err(|_| EngineError::InvalidRequest(format!("unknown timezone: {}", config.timezone)))?;
    let time = parse_time(&config.time)?;

    let local_from = from.with_timezone(&tz);

    let candidate_date = match config.pattern {
        RecurrencePattern::Daily => local_from.date_naive() + Duration::days(config.interval as i64),
        RecurrencePattern::Weekly | RecurrencePattern::Custom => {
            if let Some(days) = &config.days_of_week {
                next_day_of_week(local_from.date_naive(), days)
            } else {
                local_from.date_naive() + Duration::days(7 * config.interval as i64)
            }
        }
        RecurrencePattern::Biweekly => local_from.date_naive() + Duration::days(14 * config.interval as i64),
        RecurrencePattern::Monthly => add_months_clamped(local_from.date_naive(), config.interval, config.day_of_month),
    };

    let candidate_naive = candidate_date.and_time(time);
    let candidate_local = tz
        .from_local_datetime(&candidate_naive)
        .single()
        .ok_or_else(|| EngineError::InvalidRequest("ambiguous local time for recurrence".into()))?;
    let candidate_utc = candidate_local.with_timezone(&Utc);

    if let Some(end_date) = config.end_date {
        if candidate_utc > end_date {
            return Ok(NextFire::Completed);
        }
    }

    Ok(NextFire::At(candidate_utc))
}

fn parse_time(time: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(time, "%H:%M").map_err(|_| EngineError::InvalidRequest(format!("invalid recurrence time: {time}")))
}

/// Advances to the nearest subsequent day in `days` (ISO weekday numbers,
/// `1` = Monday .. `7` = Sunday), strictly after `from`.
fn next_day_of_week(from: NaiveDate, days: &[u8]) -> NaiveDate {
    for offset in 1..=7 {
        let candidate = from + Duration::days(offset);
        let iso_weekday = candidate.weekday().number_from_monday() as u8;
        if days.contains(&iso_weekday) {
            return candidate;
        }
    }
    from + Duration::days(7)
}

/// Adds `interval` calendar months, then sets the day-of-month to
/// `day_of_month` clamped to the resulting month's length (spec.md §4.6,
/// "set the day-of-month clamped to the month's last day").
fn add_months_clamped(from: NaiveDate, interval: u32, day_of_month: Option<u8>) -> NaiveDate {
    let total_months = from.year() as i32 * 12 + (from.month0() as i32) + interval as i32;
    let year = total_months.div_euclid(12);
    let month0 = total_months.rem_euclid(12);
    let month = month0 as u32 + 1;

    let target_day = day_of_month.map(|d| d as u32).unwrap_or(from.day());
    let last_day = days_in_month(year, month);
    let day = target_day.min(last_day).max(1);

    NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is always valid")
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid month");
    let first_of_this = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    (first_of_next - first_of_this).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(pattern: RecurrencePattern) -> RecurrenceConfig {
        RecurrenceConfig {
            pattern,
            interval: 1,
            days_of_week: None,
            day_of_month: None,
            time: "09:00".into(),
            timezone: "UTC".into(),
            end_date: None,
            max_occurrences: None,
        }
    }

    #[test]
    fn daily_advances_by_one_day_at_fixed_time() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 5).unwrap();
        let cfg = config(RecurrencePattern::Daily);
        match next_fire(&cfg, from, 0).unwrap() {
            NextFire::At(next) => assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap()),
            NextFire::Completed => panic!("expected a next fire"),
        }
    }

    #[test]
    fn weekly_with_days_of_week_advances_to_next_matching_day() {
        // Monday 2026-01-05 09:00 UTC; daysOfWeek = [1, 3] (Mon, Wed).
        let from = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 5).unwrap();
        let mut cfg = config(RecurrencePattern::Weekly);
        cfg.days_of_week = Some(vec![1, 3]);
        match next_fire(&cfg, from, 0).unwrap() {
            NextFire::At(next) => assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 7, 9, 0, 0).unwrap()),
            NextFire::Completed => panic!("expected a next fire"),
        }
    }

    #[test]
    fn monthly_day_of_month_clamps_to_month_length() {
        // 31 Jan -> 31 requested for a 1-month interval lands on Feb 28 (2026 not a leap year).
        let from = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
        let mut cfg = config(RecurrencePattern::Monthly);
        cfg.day_of_month = Some(31);
        match next_fire(&cfg, from, 0).unwrap() {
            NextFire::At(next) => assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()),
            NextFire::Completed => panic!("expected a next fire"),
        }
    }

    #[test]
    fn max_occurrences_completes_the_campaign() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut cfg = config(RecurrencePattern::Daily);
        cfg.max_occurrences = Some(3);
        assert!(matches!(next_fire(&cfg, from, 3).unwrap(), NextFire::Completed));
        assert!(matches!(next_fire(&cfg, from, 2).unwrap(), NextFire::At(_)));
    }

    #[test]
    fn end_date_completes_the_campaign() {
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let mut cfg = config(RecurrencePattern::Daily);
        cfg.end_date = Some(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap());
        assert!(matches!(next_fire(&cfg, from, 0).unwrap(), NextFire::Completed));
    }
}
