//! Normalization of raw entries into [`AssignmentRecord`]s.
//!
//! Everything here is pure: the reference date is passed in and malformed
//! fields fall back to documented defaults instead of failing.

pub mod date;

use std::{
    hash::{BuildHasher, BuildHasherDefault, DefaultHasher},
    sync::LazyLock,
};

use chrono::NaiveDate;
use compact_str::CompactString;
use regex::Regex;
use serde::Serialize;

use crate::{collect::RawAssignmentEntry, details::AssignmentDetails, scrape::squash, view::section_hint};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Submitted,
    Overdue,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Overdue => "overdue",
        }
    }
}

/// Ordered so that `High > Medium > Low`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Summative,
    Formative,
    Unknown,
}

impl Kind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summative => "summative",
            Self::Formative => "formative",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AssignmentRecord {
    pub id: CompactString,
    pub title: String,
    pub course: String,
    pub due_date: Option<NaiveDate>,
    pub due_text: String,
    pub status: Status,
    pub priority: Priority,
    /// Whole days from the reference date to the due date; 0 without one.
    pub urgency: i64,
    pub kind: Kind,
    pub link: Option<String>,
    pub view: CompactString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<AssignmentDetails>,
}

static OVERDUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)overdue|past\s+due|\blate\b|逾期|迟交").unwrap());

static NOT_SUBMITTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not\s+(?:yet\s+)?submitted|unsubmitted|not\s+turned\s+in|\bpending\b|未提交|未上交|待提交").unwrap()
});

static SUBMITTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)submitted|turned\s+in|已提交|已上交").unwrap());

/// Status named by the text, if any.
#[must_use]
pub fn detect_status(text: &str) -> Option<Status> {
    if OVERDUE.is_match(text) {
        Some(Status::Overdue)
    } else if NOT_SUBMITTED.is_match(text) {
        Some(Status::Pending)
    } else if SUBMITTED.is_match(text) {
        Some(Status::Submitted)
    } else {
        None
    }
}

#[must_use]
pub fn detect_kind(text: &str) -> Kind {
    let lowered = text.to_lowercase();
    if lowered.contains("summative") || lowered.contains("总结性") {
        Kind::Summative
    } else if lowered.contains("formative") || lowered.contains("形成性") {
        Kind::Formative
    } else {
        Kind::Unknown
    }
}

/// Priority policy. Exact boundaries resolve to the higher priority.
#[must_use]
pub const fn priority(status: Status, days_until_due: Option<i64>) -> Priority {
    match (status, days_until_due) {
        (Status::Overdue, _) => Priority::High,
        (Status::Submitted, _) | (Status::Pending, None) => Priority::Low,
        (Status::Pending, Some(days)) if days <= 2 => Priority::High,
        (Status::Pending, Some(days)) if days <= 7 => Priority::Medium,
        (Status::Pending, Some(_)) => Priority::Low,
    }
}

/// Stable id over normalized title, course and due date.
#[must_use]
pub fn record_id(title: &str, course: &str, due: &str) -> CompactString {
    let key = (title.to_lowercase(), course.to_lowercase(), due.trim());
    let hash = BuildHasherDefault::<DefaultHasher>::default().hash_one(&key);
    compact_str::format_compact!("{hash:016x}")
}

#[must_use]
pub fn classify_one(entry: RawAssignmentEntry, as_of: NaiveDate) -> AssignmentRecord {
    let title = squash(&entry.title);
    let course = squash(&entry.course);
    let due_text = squash(&entry.due);

    let due_date = date::parse_due(&due_text, as_of);
    let days = due_date.map(|due| (due - as_of).num_days());

    let status = detect_status(&entry.status)
        .or_else(|| section_hint(&entry.view))
        .unwrap_or(Status::Pending);

    let id = match due_date {
        Some(due) => record_id(&title, &course, &due.format("%Y-%m-%d").to_string()),
        None => record_id(&title, &course, &due_text),
    };
    let kind = detect_kind(&format!("{title} {}", entry.status));

    AssignmentRecord {
        id,
        title,
        course,
        due_date,
        due_text,
        status,
        priority: priority(status, days),
        urgency: days.unwrap_or(0),
        kind,
        link: entry.link.filter(|l| !l.trim().is_empty()),
        view: entry.view,
        details: entry.details,
    }
}

/// One record per entry, in input order.
pub fn classify<I>(entries: I, as_of: NaiveDate) -> Vec<AssignmentRecord>
where
    I: IntoIterator<Item = RawAssignmentEntry>,
{
    entries
        .into_iter()
        .map(|entry| classify_one(entry, as_of))
        .collect()
}
