//! Schedule window parsing and evaluation.
//!
//! A schedule window names a time-of-day boundary and an optional day-of-week
//! filter, written as human-readable recurrence strings:
//!
//! - `"after 02:00"` — every day from 02:00 (inclusive) to midnight
//! - `"before 05:00 on tuesday"` — Tuesdays up to 05:00 (exclusive)
//! - `"after 22:00 and before 05:00 on friday"` — wraps past midnight; the
//!   day filter applies to the day the window opens
//!
//! Boundaries are half-open: `after` is inclusive, `before` is exclusive.
//! Parsing happens once at fragment normalization; evaluation is infallible.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Timelike, Utc, Weekday};

use crate::error::ScheduleParseError;

/// Parses a fragment-declared timezone string into a fixed UTC offset.
///
/// Accepted forms: `"UTC"`, `"Z"`, `"+HH:MM"`, `"-HH:MM"`.
#[must_use]
pub fn parse_timezone(spec: &str) -> Option<FixedOffset> {
    let s = spec.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1i32, &s[1..]),
        b'-' => (-1i32, &s[1..]),
        _ => return None,
    };
    let (hh, mm) = rest.split_once(':')?;
    let hours: i32 = hh.parse().ok()?;
    let minutes: i32 = mm.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// One recurrence window within a schedule specification.
///
/// At least one boundary is always present. An empty day list means the
/// window recurs every day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWindow {
    after: Option<NaiveTime>,
    before: Option<NaiveTime>,
    days: Vec<Weekday>,
}

fn parse_time(token: &str) -> Result<NaiveTime, ScheduleParseError> {
    NaiveTime::parse_from_str(token, "%H:%M").map_err(|_| ScheduleParseError::InvalidTime {
        got: token.to_string(),
    })
}

fn parse_day(token: &str) -> Result<Weekday, ScheduleParseError> {
    match token.trim_end_matches(',').to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        other => Err(ScheduleParseError::UnknownDay {
            got: other.to_string(),
        }),
    }
}

impl ScheduleWindow {
    /// Parses a single recurrence window string.
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleParseError`] describing the first offending token.
    pub fn parse(spec: &str) -> Result<Self, ScheduleParseError> {
        let tokens: Vec<&str> = spec.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(ScheduleParseError::Empty);
        }

        let mut after: Option<NaiveTime> = None;
        let mut before: Option<NaiveTime> = None;
        let mut days: Vec<Weekday> = Vec::new();

        let mut i = 0;
        let mut saw_boundary = false;
        while i < tokens.len() {
            match tokens[i].to_ascii_lowercase().as_str() {
                "after" | "before" if tokens.len() > i + 1 => {
                    let keyword = tokens[i].to_ascii_lowercase();
                    let slot = if keyword == "after" { &mut after } else { &mut before };
                    if slot.is_some() {
                        return Err(ScheduleParseError::TrailingInput {
                            got: tokens[i].to_string(),
                        });
                    }
                    *slot = Some(parse_time(tokens[i + 1])?);
                    saw_boundary = true;
                    i += 2;
                }
                "and" if saw_boundary && tokens.len() > i + 1 => {
                    i += 1;
                }
                "on" if saw_boundary && tokens.len() > i + 1 => {
                    for token in &tokens[i + 1..] {
                        if token.eq_ignore_ascii_case("and") {
                            continue;
                        }
                        let day = parse_day(token)?;
                        if !days.contains(&day) {
                            days.push(day);
                        }
                    }
                    i = tokens.len();
                }
                _ if !saw_boundary => {
                    return Err(ScheduleParseError::MissingBoundary {
                        got: tokens[i].to_string(),
                    });
                }
                _ => {
                    return Err(ScheduleParseError::TrailingInput {
                        got: tokens[i].to_string(),
                    });
                }
            }
        }

        if !saw_boundary {
            return Err(ScheduleParseError::MissingBoundary {
                got: spec.trim().to_string(),
            });
        }

        Ok(Self { after, before, days })
    }

    /// Returns true if this window wraps past midnight
    /// (`after` boundary later than `before` boundary).
    #[must_use]
    pub fn wraps_midnight(&self) -> bool {
        matches!((self.after, self.before), (Some(a), Some(b)) if a > b)
    }

    fn day_allowed(&self, day: Weekday) -> bool {
        self.days.is_empty() || self.days.contains(&day)
    }

    /// Tests whether a local instant falls within this window.
    #[must_use]
    pub fn contains_local(&self, local: DateTime<FixedOffset>) -> bool {
        let tod = local.time();
        match (self.after, self.before) {
            (Some(a), Some(b)) if a > b => {
                // Wrapped window: the day filter names the opening day.
                if tod >= a {
                    self.day_allowed(local.weekday())
                } else if tod < b {
                    self.day_allowed(local.weekday().pred())
                } else {
                    false
                }
            }
            _ => {
                let after_ok = self.after.map_or(true, |a| tod >= a);
                let before_ok = self.before.map_or(true, |b| tod < b);
                after_ok && before_ok && self.day_allowed(local.weekday())
            }
        }
    }

    /// The local time of day at which this window opens.
    fn opening_time(&self) -> NaiveTime {
        self.after
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default())
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(a) = self.after {
            parts.push(format!("after {:02}:{:02}", a.hour(), a.minute()));
        }
        if let Some(b) = self.before {
            parts.push(format!("before {:02}:{:02}", b.hour(), b.minute()));
        }
        write!(f, "{}", parts.join(" and "))?;
        if !self.days.is_empty() {
            let days: Vec<String> = self.days.iter().map(|d| format!("{d}")).collect();
            write!(f, " on {}", days.join(","))?;
        }
        Ok(())
    }
}

/// An ordered set of recurrence windows, retaining the raw strings they were
/// parsed from for emission to external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScheduleSpec {
    raw: Vec<String>,
    windows: Vec<ScheduleWindow>,
}

impl ScheduleSpec {
    /// Parses an ordered list of window strings.
    ///
    /// # Errors
    ///
    /// Returns the offending string alongside the parse error.
    pub fn parse(specs: &[String]) -> Result<Self, (String, ScheduleParseError)> {
        let mut windows = Vec::with_capacity(specs.len());
        for spec in specs {
            let window = ScheduleWindow::parse(spec).map_err(|e| (spec.clone(), e))?;
            windows.push(window);
        }
        Ok(Self {
            raw: specs.to_vec(),
            windows,
        })
    }

    /// True if no window restricts dispatch ("anytime").
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.windows.is_empty()
    }

    /// The raw window strings as authored.
    #[must_use]
    pub fn raw(&self) -> &[String] {
        &self.raw
    }

    /// The parsed windows.
    #[must_use]
    pub fn windows(&self) -> &[ScheduleWindow] {
        &self.windows
    }

    /// Tests whether `instant` falls within this specification.
    #[must_use]
    pub fn in_window(&self, tz: FixedOffset, instant: DateTime<Utc>) -> bool {
        in_window(&self.windows, tz, instant)
    }

    /// Earliest future opening strictly after `from`, if restricted.
    #[must_use]
    pub fn next_open(&self, tz: FixedOffset, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_open(&self.windows, tz, from)
    }
}

/// Tests whether `instant` falls within at least one window.
///
/// Windows are OR'ed; an empty window list means "always in window".
/// Evaluation happens in the given fixed-offset timezone.
#[must_use]
pub fn in_window(windows: &[ScheduleWindow], tz: FixedOffset, instant: DateTime<Utc>) -> bool {
    if windows.is_empty() {
        return true;
    }
    let local = instant.with_timezone(&tz);
    windows.iter().any(|w| w.contains_local(local))
}

/// Computes the earliest instant strictly after `from` at which some window
/// opens.
///
/// Returns `None` for an empty window list (no schedule restriction). Scans
/// at most eight local days, which covers every weekly recurrence.
#[must_use]
pub fn next_open(
    windows: &[ScheduleWindow],
    tz: FixedOffset,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if windows.is_empty() {
        return None;
    }

    let local_from = from.with_timezone(&tz);
    let mut earliest: Option<DateTime<Utc>> = None;

    for window in windows {
        for day_offset in 0..=7i64 {
            let date = local_from.date_naive() + Duration::days(day_offset);
            if !window.day_allowed(date.weekday()) {
                continue;
            }
            let naive = date.and_time(window.opening_time());
            let Some(local_open) = tz.from_local_datetime(&naive).single() else {
                continue;
            };
            let open = local_open.with_timezone(&Utc);
            if open <= from {
                continue;
            }
            match earliest {
                Some(e) if e <= open => {}
                _ => earliest = Some(open),
            }
            break;
        }
    }

    earliest
}
