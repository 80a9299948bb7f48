use std::{collections::BTreeMap, fmt::Write as _, path::{Path, PathBuf}};

use ascr::{Acquisition, AssignmentRecord, Priority, Status, ViewFailure};
use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Console,
    Json,
    Markdown,
    Html,
}

impl Format {
    const fn extension(self) -> Option<&'static str> {
        match self {
            Self::Console => None,
            Self::Json => Some("json"),
            Self::Markdown => Some("md"),
            Self::Html => Some("html"),
        }
    }
}

const PRIORITIES: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];
const STATUSES: [Status; 3] = [Status::Overdue, Status::Pending, Status::Submitted];

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_priority: BTreeMap<&'static str, usize>,
    pub by_status: BTreeMap<&'static str, usize>,
    pub by_kind: BTreeMap<&'static str, usize>,
    pub by_course: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub generated_at: DateTime<Local>,
    pub summary: Summary,
    pub assignments: Vec<&'a AssignmentRecord>,
    pub failures: &'a [ViewFailure],
}

impl<'a> Report<'a> {
    /// Keeps the first record of every id; the rest are ordered by priority,
    /// then by due date (undated last).
    pub fn new(acquisition: &'a Acquisition, generated_at: DateTime<Local>) -> Self {
        let mut seen = hashbrown::HashSet::new();
        let mut assignments = acquisition
            .records
            .iter()
            .filter(|r| seen.insert(r.id.as_str()))
            .collect::<Vec<_>>();
        assignments.sort_by_key(|r| (core::cmp::Reverse(r.priority), r.due_date.is_none(), r.due_date));

        let mut summary = Summary {
            total: assignments.len(),
            ..Summary::default()
        };
        for record in &assignments {
            *summary.by_priority.entry(record.priority.as_str()).or_default() += 1;
            *summary.by_status.entry(record.status.as_str()).or_default() += 1;
            *summary.by_kind.entry(record.kind.as_str()).or_default() += 1;
            let course = if record.course.is_empty() { "(no course)" } else { record.course.as_str() };
            *summary.by_course.entry(course.to_owned()).or_default() += 1;
        }

        Self {
            generated_at,
            summary,
            assignments,
            failures: &acquisition.failures,
        }
    }

    fn count(map: &BTreeMap<&'static str, usize>, key: &str) -> usize {
        map.get(key).copied().unwrap_or_default()
    }

    pub fn render_console(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ManageBac assignments ({})", self.generated_at.format("%Y-%m-%d %H:%M"));
        let _ = writeln!(out, "{}", "=".repeat(48));
        let _ = writeln!(out, "total: {}", self.summary.total);
        for p in PRIORITIES {
            let _ = writeln!(out, "  {:<9} {}", p.as_str(), Self::count(&self.summary.by_priority, p.as_str()));
        }
        for s in STATUSES {
            let _ = writeln!(out, "  {:<9} {}", s.as_str(), Self::count(&self.summary.by_status, s.as_str()));
        }

        for p in PRIORITIES {
            let mut group = self.assignments.iter().filter(|r| r.priority == p).peekable();
            if group.peek().is_none() {
                continue;
            }
            let _ = writeln!(out, "\n[{}]", p.as_str().to_uppercase());
            for r in group {
                let _ = writeln!(
                    out,
                    "  {} | {} | {} | {}{}",
                    r.title,
                    r.course,
                    due_cell(r),
                    r.status.as_str(),
                    days_suffix(r),
                );
            }
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "\nfailed views:");
            for failure in self.failures {
                let _ = writeln!(out, "  {failure}");
            }
        }
        out
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# ManageBac assignment report\n");
        let _ = writeln!(out, "Generated {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S"));

        let _ = writeln!(out, "## Summary\n");
        let _ = writeln!(out, "| | count |\n|---|---|");
        let _ = writeln!(out, "| total | {} |", self.summary.total);
        for p in PRIORITIES {
            let _ = writeln!(out, "| {} | {} |", p.as_str(), Self::count(&self.summary.by_priority, p.as_str()));
        }
        for s in STATUSES {
            let _ = writeln!(out, "| {} | {} |", s.as_str(), Self::count(&self.summary.by_status, s.as_str()));
        }

        if !self.summary.by_kind.is_empty() {
            let _ = writeln!(out, "\n### By kind\n");
            for (kind, n) in &self.summary.by_kind {
                let _ = writeln!(out, "- {kind}: {n}");
            }
        }

        if !self.summary.by_course.is_empty() {
            let _ = writeln!(out, "\n### By course\n");
            for (course, n) in &self.summary.by_course {
                let _ = writeln!(out, "- {}: {n}", escape(course));
            }
        }

        let _ = writeln!(out, "\n## Assignments\n");
        if self.assignments.is_empty() {
            let _ = writeln!(out, "Nothing found.");
        } else {
            let _ = writeln!(out, "| priority | title | course | due | status | days |");
            let _ = writeln!(out, "|---|---|---|---|---|---|");
            for r in &self.assignments {
                let title = match &r.link {
                    Some(link) => format!("[{}]({link})", escape(&r.title)),
                    None => escape(&r.title),
                };
                let days = if r.due_date.is_some() { r.urgency.to_string() } else { String::new() };
                let _ = writeln!(
                    out,
                    "| {} | {title} | {} | {} | {} | {days} |",
                    r.priority.as_str(),
                    escape(&r.course),
                    escape(&due_cell(r)),
                    r.status.as_str(),
                );
            }
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "\n## Failed views\n");
            for failure in self.failures {
                let _ = writeln!(out, "- `{}`: {}", failure.view, failure.error);
            }
        }
        out
    }

    pub fn render_html(&self) -> String {
        let mut out = String::from(HTML_HEAD);
        let _ = writeln!(out, "<h1>ManageBac assignment report</h1>");
        let _ = writeln!(out, "<p>Generated {}</p>", self.generated_at.format("%Y-%m-%d %H:%M:%S"));

        let _ = writeln!(out, "<section><h2>Summary</h2>");
        let _ = writeln!(out, "<span class=\"badge\">total {}</span>", self.summary.total);
        for p in PRIORITIES {
            let n = Self::count(&self.summary.by_priority, p.as_str());
            let _ = writeln!(out, "<span class=\"badge {0}\">{0} {n}</span>", p.as_str());
        }
        for s in STATUSES {
            let n = Self::count(&self.summary.by_status, s.as_str());
            let _ = writeln!(out, "<span class=\"badge\">{} {n}</span>", s.as_str());
        }
        let _ = writeln!(out, "</section>");

        for (heading, status) in [("Overdue", Some(Status::Overdue)), ("Pending", Some(Status::Pending)), ("All", None)] {
            let rows = self
                .assignments
                .iter()
                .filter(|r| status.is_none_or(|s| r.status == s))
                .collect::<Vec<_>>();
            let _ = writeln!(out, "<section><h2>{heading}</h2><table>");
            let _ = writeln!(
                out,
                "<thead><tr><th>title</th><th>course</th><th>due</th><th>status</th><th>priority</th></tr></thead><tbody>"
            );
            if rows.is_empty() {
                let _ = writeln!(out, "<tr><td colspan=\"5\">none</td></tr>");
            }
            for r in rows {
                let title = match &r.link {
                    Some(link) => format!("<a href=\"{}\">{}</a>", html_escape(link), html_escape(&r.title)),
                    None => html_escape(&r.title),
                };
                let _ = writeln!(
                    out,
                    "<tr class=\"{}\"><td>{title}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    r.priority.as_str(),
                    html_escape(&r.course),
                    html_escape(&due_cell(r)),
                    r.status.as_str(),
                    r.priority.as_str(),
                );
            }
            let _ = writeln!(out, "</tbody></table></section>");
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "<section><h2>Failed views</h2><ul>");
            for failure in self.failures {
                let _ = writeln!(
                    out,
                    "<li><code>{}</code>: {}</li>",
                    html_escape(&failure.view),
                    html_escape(&failure.error.to_string())
                );
            }
            let _ = writeln!(out, "</ul></section>");
        }
        out.push_str("</div></body></html>\n");
        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Renders `format`. Console output goes to stdout; the others are
    /// written below `dir` and their path is returned.
    pub fn emit(&self, format: Format, dir: &Path) -> anyhow::Result<Option<PathBuf>> {
        let Some(ext) = format.extension() else {
            print!("{}", self.render_console());
            return Ok(None);
        };
        let body = match format {
            Format::Json => self.render_json()?,
            Format::Html => self.render_html(),
            _ => self.render_markdown(),
        };

        std::fs::create_dir_all(dir)?;
        let path = dir.join(file_name(self.generated_at, ext));
        std::fs::write(&path, body)?;
        Ok(Some(path))
    }
}

pub fn file_name(at: DateTime<Local>, ext: &str) -> String {
    format!("managebac_report_{}.{ext}", at.format("%Y%m%d_%H%M%S"))
}

fn due_cell(r: &AssignmentRecord) -> String {
    r.due_date.map_or_else(
        || if r.due_text.is_empty() { "-".to_owned() } else { r.due_text.clone() },
        |d| d.format("%Y-%m-%d").to_string(),
    )
}

fn days_suffix(r: &AssignmentRecord) -> String {
    match (r.due_date, r.urgency) {
        (None, _) => String::new(),
        (Some(_), 0) => " (today)".to_owned(),
        (Some(_), d) if d < 0 => format!(" ({} days late)", -d),
        (Some(_), d) => format!(" (in {d} days)"),
    }
}

fn escape(s: &str) -> String {
    s.replace('|', "\\|")
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>ManageBac assignment report</title>
<style>
body { font-family: -apple-system, 'Segoe UI', Arial, sans-serif; margin: 24px; background: #f9fafb; color: #111827; }
.container { max-width: 980px; margin: 0 auto; background: white; padding: 24px; border-radius: 12px; }
table { width: 100%; border-collapse: collapse; margin: 16px 0; }
th, td { padding: 8px 12px; text-align: left; border-bottom: 1px solid #e5e7eb; }
th { background: #2563eb; color: white; }
.badge { display: inline-block; padding: 4px 10px; border-radius: 999px; background: #eff6ff; margin-right: 8px; }
.high { color: #b91c1c; }
.medium { color: #b45309; }
</style>
</head>
<body>
<div class="container">
"#;

#[cfg(test)]
mod tests {
    use ascr::{Kind, ViewError};
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn record(id: &str, title: &str, priority: Priority, status: Status, due: Option<(u32, u32)>) -> AssignmentRecord {
        let due_date = due.and_then(|(m, d)| NaiveDate::from_ymd_opt(2024, m, d));
        AssignmentRecord {
            id: id.into(),
            title: title.to_owned(),
            course: "English".to_owned(),
            due_date,
            due_text: String::new(),
            status,
            priority,
            urgency: due_date.map_or(0, |d| (d - NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()).num_days()),
            kind: Kind::Unknown,
            link: None,
            view: "all".into(),
            details: None,
        }
    }

    fn acquisition() -> Acquisition {
        Acquisition {
            records: vec![
                record("a", "Reading | notes", Priority::Low, Status::Pending, None),
                record("b", "Essay", Priority::High, Status::Overdue, Some((1, 10))),
                record("b", "Essay (again)", Priority::High, Status::Overdue, Some((1, 10))),
                record("c", "Lab", Priority::Medium, Status::Pending, Some((1, 20))),
            ],
            failures: vec![ViewFailure {
                view: "submitted".into(),
                error: ViewError::Collection {
                    message: "cannot load".to_owned(),
                },
            }],
        }
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 15, 8, 30, 5).unwrap()
    }

    #[test]
    fn deduplicates_and_orders_by_priority() {
        let acquisition = acquisition();
        let report = Report::new(&acquisition, at());
        let titles = report.assignments.iter().map(|r| r.title.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, ["Essay", "Lab", "Reading | notes"]);

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.by_priority["high"], 1);
        assert_eq!(report.summary.by_status["pending"], 2);
        assert_eq!(report.summary.by_course["English"], 3);
        assert_eq!(report.summary.by_kind["unknown"], 3);
    }

    #[test]
    fn summary_counts_kinds() {
        let mut acquisition = acquisition();
        acquisition.records[1].kind = Kind::Summative;
        acquisition.records[3].kind = Kind::Formative;
        let report = Report::new(&acquisition, at());
        assert_eq!(report.summary.by_kind["summative"], 1);
        assert_eq!(report.summary.by_kind["formative"], 1);
        assert_eq!(report.summary.by_kind["unknown"], 1);
    }

    #[test]
    fn html_escapes_and_groups_rows() {
        let mut acquisition = acquisition();
        acquisition.records[1].title = "Essay <draft>".to_owned();
        acquisition.records[1].link = Some("https://x.example/t?a=1&b=2".to_owned());
        let html = Report::new(&acquisition, at()).render_html();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<a href="https://x.example/t?a=1&amp;b=2">Essay &lt;draft&gt;</a>"#));
        assert_eq!(html.matches("<h2>Overdue</h2>").count(), 1);
        // Essay shows up under "Overdue" and under "All".
        assert_eq!(html.matches("Essay &lt;draft&gt;").count(), 2);
        assert!(html.contains("<li><code>submitted</code>: cannot load</li>"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn markdown_lists_records_and_failures() {
        let acquisition = acquisition();
        let md = Report::new(&acquisition, at()).render_markdown();
        assert!(md.contains("| high | Essay | English | 2024-01-10 | overdue | -5 |"));
        assert!(md.contains("Reading \\| notes"));
        assert!(md.contains("- `submitted`: cannot load"));
    }

    #[test]
    fn console_groups_by_priority() {
        let acquisition = acquisition();
        let text = Report::new(&acquisition, at()).render_console();
        let high = text.find("[HIGH]").unwrap();
        let low = text.find("[LOW]").unwrap();
        assert!(high < low);
        assert!(text.contains("Essay | English | 2024-01-10 | overdue (5 days late)"));
        assert!(text.contains("view submitted: cannot load"));
    }

    #[test]
    fn json_has_summary_and_assignments() {
        let acquisition = acquisition();
        let json = Report::new(&acquisition, at()).render_json().unwrap();
        let value = serde_json::from_str::<serde_json::Value>(&json).unwrap();
        assert_eq!(value["summary"]["total"], 3);
        assert_eq!(value["assignments"][0]["priority"], "high");
        assert_eq!(value["assignments"][0]["due_date"], "2024-01-10");
        assert_eq!(value["failures"][0]["error"]["kind"], "collection");
    }

    #[test]
    fn report_file_names_carry_a_timestamp() {
        assert_eq!(file_name(at(), "md"), "managebac_report_20240115_083005.md");
    }
}
