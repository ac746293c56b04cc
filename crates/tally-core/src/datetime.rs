use anyhow::{Context, anyhow};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use regex::Regex;
use tracing::warn;

/// Parses a due-date expression against `now` in the display timezone.
///
/// Accepted shapes: `now`, `today`, `tomorrow`, weekday names (`fri`),
/// clock times (`17:30`, `3pm`, `3:23pm` — next occurrence), relative
/// offsets (`2h`, `+45m`, `-1d`), `YYYY-MM-DD` and `YYYY-MM-DD HH:MM`.
pub fn parse_date_expr(input: &str, now: DateTime<Utc>, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "now" => return Ok(now),
        "today" => return local_midnight(now.with_timezone(&tz).date_naive(), tz, "today"),
        "tomorrow" => {
            let today = parse_date_expr("today", now, tz)?;
            return Ok(today + Duration::days(1));
        }
        _ => {}
    }

    if let Some(target) = parse_weekday_name(&lower) {
        let local_today = now.with_timezone(&tz).date_naive();
        return local_midnight(next_weekday_date(local_today, target), tz, "weekday-name");
    }

    if let Some((hour, minute)) = parse_clock_time(&lower) {
        let local_now = now.with_timezone(&tz);
        let mut day = local_now.date_naive();
        let candidate = day
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid clock time: {token}"))?;
        if candidate <= local_now.naive_local() {
            day = day
                .checked_add_signed(Duration::days(1))
                .ok_or_else(|| anyhow!("failed to advance to the next day"))?;
        }
        let next = day
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid clock time: {token}"))?;
        return to_utc_from_local(next, tz, "clock-time");
    }

    if let Some(offset) = parse_relative_expr(&lower)? {
        return Ok(now + offset);
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return local_midnight(date, tz, "iso-date");
    }

    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, format) {
            return to_utc_from_local(ndt, tz, "iso-datetime");
        }
    }

    Err(anyhow!("unrecognized date expression: {token}"))
}

/// Parses a lead-time span such as `15m`, `2h`, `1d` or `1h30m`.
pub fn parse_duration_expr(input: &str) -> anyhow::Result<Duration> {
    let token = input.trim().to_ascii_lowercase();
    if token.is_empty() {
        return Err(anyhow!("empty duration expression"));
    }

    let part_re = Regex::new(r"(?P<num>\d+)(?P<unit>[dhms])")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

    let mut total = Duration::zero();
    let mut matched_len = 0;
    for caps in part_re.captures_iter(&token) {
        let num: i64 = caps["num"].parse().context("invalid duration amount")?;
        let span = match &caps["unit"] {
            "d" => Duration::days(num),
            "h" => Duration::hours(num),
            "m" => Duration::minutes(num),
            "s" => Duration::seconds(num),
            other => return Err(anyhow!("unknown duration unit: {other}")),
        };
        total = total + span;
        matched_len += caps[0].len();
    }

    if matched_len != token.len() {
        return Err(anyhow!("unrecognized duration expression: {input}"));
    }
    Ok(total)
}

fn parse_relative_expr(token: &str) -> anyhow::Result<Option<Duration>> {
    let rel_re = Regex::new(r"^(?P<sign>[+-])?(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    let Some(caps) = rel_re.captures(token) else {
        return Ok(None);
    };

    let num: i64 = caps["num"].parse().context("invalid relative amount")?;
    let span = match &caps["unit"] {
        "d" => Duration::days(num),
        "h" => Duration::hours(num),
        "m" => Duration::minutes(num),
        other => return Err(anyhow!("unknown relative unit: {other}")),
    };

    let negative = caps.name("sign").map(|m| m.as_str()) == Some("-");
    Ok(Some(if negative { -span } else { span }))
}

fn parse_weekday_name(lower: &str) -> Option<Weekday> {
    match lower {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let mut date = from + Duration::days(1);
    while date.weekday() != target {
        date = date + Duration::days(1);
    }
    date
}

fn parse_clock_time(lower: &str) -> Option<(u32, u32)> {
    let clock_re = Regex::new(r"^(?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?(?P<ampm>am|pm)?$").ok()?;
    let caps = clock_re.captures(lower)?;

    let mut hour: u32 = caps["hour"].parse().ok()?;
    let minute: u32 = caps
        .name("minute")
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(0))?;
    let ampm = caps.name("ampm").map(|m| m.as_str());

    // A bare number with no minutes or am/pm marker reads as a relative
    // amount or a year, not a clock time.
    if ampm.is_none() && caps.name("minute").is_none() {
        return None;
    }

    match ampm {
        Some("am") => {
            if hour == 12 {
                hour = 0;
            }
        }
        Some("pm") => {
            if hour < 12 {
                hour += 12;
            }
        }
        _ => {}
    }

    (hour < 24 && minute < 60).then_some((hour, minute))
}

fn local_midnight(date: NaiveDate, tz: Tz, context: &str) -> anyhow::Result<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("failed to construct midnight: {context}"))?;
    to_utc_from_local(midnight, tz, context)
}

fn to_utc_from_local(naive: NaiveDateTime, tz: Tz, context: &str) -> anyhow::Result<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(local) => Ok(local.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            warn!(context, first = %first, second = %second, "ambiguous local datetime; using earliest");
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in the display timezone: {context}"
        )),
    }
}

pub fn format_date(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

pub fn format_datetime(dt: DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

/// Compact span rendering for reminder lead times, e.g. `1h30m`.
pub fn format_duration_ms(ms: i64) -> String {
    let mut remaining = ms / 1000;
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, label) in [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")] {
        let count = remaining / unit;
        if count > 0 {
            out.push_str(&format!("{count}{label}"));
            remaining -= count * unit;
        }
    }
    out
}
