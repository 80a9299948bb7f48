use compact_str::CompactString;
use hashbrown::{HashMap, HashSet};
use unicase::UniCase;
use url::Url;

use crate::classify::Status;

const TASKS_PATH: &str = "student/tasks_and_deadlines";

/// A listing page of the portal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    pub name: CompactString,
    /// Path below the portal base, or an absolute URL.
    pub target: String,
}

impl View {
    /// Resolves `name` to its page. `overrides` take precedence over the
    /// built-in table.
    #[must_use]
    pub fn resolve(name: &str, overrides: &HashMap<String, String>) -> Self {
        let name = name.trim();
        let target = overrides
            .iter()
            .find(|(k, _)| UniCase::new(k.as_str()) == UniCase::new(name))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| default_target(name));

        Self {
            name: name.into(),
            target,
        }
    }

    /// Absolute URL of this view. `None` if the target cannot be joined.
    #[must_use]
    pub fn url(&self, base: &Url) -> Option<Url> {
        if let Ok(url) = Url::parse(&self.target) {
            return Some(url);
        }
        base.join(self.target.trim_start_matches('/')).ok()
    }

    /// Status implied by the section this view lists, if any.
    #[must_use]
    pub fn section_hint(&self) -> Option<Status> {
        section_hint(&self.name)
    }
}

#[must_use]
pub fn section_hint(name: &str) -> Option<Status> {
    match name.trim().to_ascii_lowercase().as_str() {
        "pending" | "upcoming" | "unsubmitted" | "todo" => Some(Status::Pending),
        "overdue" | "late" | "past_due" => Some(Status::Overdue),
        "submitted" | "completed" | "turned_in" => Some(Status::Submitted),
        _ => None,
    }
}

fn default_target(name: &str) -> String {
    if name.starts_with('/') || Url::parse(name).is_ok() {
        return name.to_owned();
    }
    match name.to_ascii_lowercase().as_str() {
        "all" => TASKS_PATH.to_owned(),
        "pending" | "upcoming" => format!("{TASKS_PATH}?filter=upcoming"),
        other => format!("{TASKS_PATH}?filter={other}"),
    }
}

/// Resolves `names` in order, ignoring blanks and case-insensitive repeats.
#[must_use]
pub fn plan<S: AsRef<str>>(names: &[S], overrides: &HashMap<String, String>) -> Vec<View> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(UniCase::new(n.to_owned())))
        .map(|n| View::resolve(n, overrides))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://school.managebac.com/").unwrap()
    }

    #[test]
    fn plan_drops_duplicates_and_keeps_order() {
        let views = plan(&["overdue", "Pending", " ", "OVERDUE", "pending", "submitted"], &HashMap::new());
        let names = views.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["overdue", "Pending", "submitted"]);
    }

    #[test]
    fn builtin_targets() {
        let none = HashMap::new();
        let url = |n: &str| View::resolve(n, &none).url(&base()).unwrap().to_string();
        assert_eq!(url("all"), "https://school.managebac.com/student/tasks_and_deadlines");
        assert_eq!(
            url("upcoming"),
            "https://school.managebac.com/student/tasks_and_deadlines?filter=upcoming"
        );
        assert_eq!(
            url("overdue"),
            "https://school.managebac.com/student/tasks_and_deadlines?filter=overdue"
        );
        assert_eq!(url("/student/classes"), "https://school.managebac.com/student/classes");
        assert_eq!(url("https://other.example/tasks"), "https://other.example/tasks");
    }

    #[test]
    fn overrides_match_case_insensitively() {
        let mut overrides = HashMap::new();
        overrides.insert("Overdue".to_owned(), "/student/late".to_owned());
        let view = View::resolve("overdue", &overrides);
        assert_eq!(view.target, "/student/late");
        assert_eq!(view.url(&base()).unwrap().as_str(), "https://school.managebac.com/student/late");
    }

    #[test]
    fn hints_follow_section_names() {
        assert_eq!(section_hint("Upcoming"), Some(Status::Pending));
        assert_eq!(section_hint("overdue"), Some(Status::Overdue));
        assert_eq!(section_hint("submitted"), Some(Status::Submitted));
        assert_eq!(section_hint("all"), None);
    }
}
