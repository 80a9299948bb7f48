use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, Weekday};
use regex::Regex;

/// Date-only formats, tried in order.
pub const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%A, %B %d, %Y",
];

/// Date-time formats; the time of day is dropped.
pub const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

static PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:due(?:\s+date)?|deadline|截止(?:日期|时间)?)\s*[:：]?\s*").unwrap());

static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:at|@)\s+\d{1,2}(?::\d{2})?\s*(?:[ap]\.?m\.?)?.*$").unwrap());

static CJK_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日?").unwrap());

const RELATIVE: [(&str, u64); 5] = [
    ("today", 0),
    ("tomorrow", 1),
    ("今天", 0),
    ("明天", 1),
    ("后天", 2),
];

const WEEKDAYS: [(&str, Weekday); 14] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
    ("周一", Weekday::Mon),
    ("周二", Weekday::Tue),
    ("周三", Weekday::Wed),
    ("周四", Weekday::Thu),
    ("周五", Weekday::Fri),
    ("周六", Weekday::Sat),
    ("周日", Weekday::Sun),
];

/// Parses scraped due-date text. Relative phrases are resolved against
/// `as_of`. Returns `None` for anything unrecognised.
#[must_use]
pub fn parse_due(raw: &str, as_of: NaiveDate) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(date) = parse_absolute(text) {
        return Some(date);
    }

    let cleaned = clean(text);
    if let Some(date) = parse_absolute(&cleaned) {
        return Some(date);
    }
    // "Wednesday, January 10, 2024" with a weekday chrono disagrees with.
    if let Some(date) = cleaned
        .split_once(", ")
        .and_then(|(_, rest)| parse_absolute(rest))
    {
        return Some(date);
    }

    parse_relative(&cleaned.to_lowercase(), as_of)
}

fn clean(text: &str) -> String {
    let text = PREFIX.replace(text, "");
    let text = TIME_OF_DAY.replace(&text, "");
    let text = CJK_DATE.replace(&text, "$1-$2-$3");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_absolute(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
        .or_else(|| DateTime::parse_from_rfc2822(text).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            let time = httpdate::parse_http_date(text).ok()?;
            Some(DateTime::<chrono::Utc>::from(time).date_naive())
        })
}

fn parse_relative(lowered: &str, as_of: NaiveDate) -> Option<NaiveDate> {
    if let Some(&(_, offset)) = RELATIVE.iter().find(|(k, _)| lowered.contains(k)) {
        return as_of.checked_add_days(Days::new(offset));
    }

    let &(_, target) = WEEKDAYS.iter().find(|(k, _)| lowered.contains(k))?;
    let ahead = (target.num_days_from_monday() + 7 - as_of.weekday().num_days_from_monday()) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    as_of.checked_add_days(Days::new(u64::from(ahead)))
}

static EMBEDDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \d{4}-\d{1,2}-\d{1,2}
        | \d{4}\s*年\s*\d{1,2}\s*月\s*\d{1,2}\s*日?
        | (?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},\s*\d{4}
        | \b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b[^\n]{0,40}
        ",
    )
    .unwrap()
});

/// First date-like phrase inside free text, for containers without a
/// dedicated due-date element.
#[must_use]
pub fn find_in_text(text: &str) -> Option<&str> {
    EMBEDDED.find(text).map(|m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn every_accepted_format_reaches_the_same_day() {
        let as_of = d(2024, 1, 1);
        let inputs = [
            "2024-01-10",
            "2024/01/10",
            "10/01/2024",
            "10-01-2024",
            "10.01.2024",
            "January 10, 2024",
            "Jan 10, 2024",
            "10 January 2024",
            "10 Jan 2024",
            "Wednesday, January 10, 2024",
            "2024-01-10 23:59",
            "2024-01-10T23:59:00",
            "2024-01-10T23:59:00+08:00",
            "Wed, 10 Jan 2024 12:00:00 GMT",
            "2024年1月10日",
            "Due: Jan 10, 2024 at 11:59 PM",
            "Due Wednesday, January 10, 2024 at 11:59 PM",
            "截止：2024-01-10",
        ];
        for input in inputs {
            assert_eq!(parse_due(input, as_of), Some(d(2024, 1, 10)), "{input}");
        }
    }

    #[test]
    fn unparseable_text_is_none() {
        let as_of = d(2024, 1, 1);
        for input in ["", "   ", "TBD", "无截止日期", "2024-02-30", "soon"] {
            assert_eq!(parse_due(input, as_of), None, "{input}");
        }
    }

    #[test]
    fn relative_words_use_reference_date() {
        let as_of = d(2024, 1, 15); // a Monday
        assert_eq!(parse_due("Today", as_of), Some(as_of));
        assert_eq!(parse_due("due tomorrow at 8am", as_of), Some(d(2024, 1, 16)));
        assert_eq!(parse_due("后天", as_of), Some(d(2024, 1, 17)));
        assert_eq!(parse_due("Friday", as_of), Some(d(2024, 1, 19)));
        assert_eq!(parse_due("Monday at 9:00", as_of), Some(d(2024, 1, 22)));
        assert_eq!(parse_due("周日", as_of), Some(d(2024, 1, 21)));
    }

    #[test]
    fn finds_dates_in_free_text() {
        assert_eq!(find_in_text("Essay draft 2024-01-10 English"), Some("2024-01-10"));
        assert_eq!(find_in_text("Lab report Jan 5, 2024 Chemistry"), Some("Jan 5, 2024"));
        assert_eq!(
            find_in_text("Reading Friday 23:59 History"),
            Some("Friday 23:59 History")
        );
        assert_eq!(find_in_text("nothing to see"), None);
    }
}
