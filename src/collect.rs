use core::time::Duration;

use compact_str::CompactString;
use futures_util::{Stream, stream};
use scraper::{ElementRef, Html};
use tokio::time::timeout;
use url::Url;

use crate::{
    auth::Session,
    classify::date::find_in_text,
    details::AssignmentDetails,
    error::{Stage, ViewError},
    events::{Event, EventSink, Level},
    scrape::{Cascade, Strategy, text_of},
    view::View,
};

/// Navigation attempts per view; only timeouts are retried.
pub const MAX_ATTEMPTS: u32 = 2;

const CONTAINERS: [Strategy; 11] = [
    Strategy::Text(".assignment"),
    Strategy::Text(".assignment-item"),
    Strategy::Text(".task-item"),
    Strategy::Text(".homework-item"),
    Strategy::Text(".fusion-card-item"),
    Strategy::Text(r#"li[class*="assignment"]"#),
    Strategy::Text(".assignment-list li"),
    Strategy::Text(".homework-list li"),
    Strategy::Text(r#"tr[class*="assignment"], tr[class*="task"], tr[class*="homework"]"#),
    Strategy::Text(".tasks-list .line"),
    Strategy::Text(".card"),
];

const TITLE: [Strategy; 8] = [
    Strategy::Text(".title"),
    Strategy::Text(".assignment-title"),
    Strategy::Text(".homework-title"),
    Strategy::Text("h1"),
    Strategy::Text("h2"),
    Strategy::Text("h3"),
    Strategy::Text("h4"),
    Strategy::Text("a"),
];

const COURSE: [Strategy; 7] = [
    Strategy::Text(".course"),
    Strategy::Text(".course-name"),
    Strategy::Text(".class-name"),
    Strategy::Text(".subject"),
    Strategy::Text(".group-name"),
    Strategy::Text(r#"[class*="course"]"#),
    Strategy::Text(r#"a[href*="/classes/"]"#),
];

const DUE: [Strategy; 7] = [
    Strategy::Attr("time[datetime]", "datetime"),
    Strategy::Text(".due-date"),
    Strategy::Text(".due"),
    Strategy::Text(r#"[class*="due"]"#),
    Strategy::Text(".date"),
    Strategy::Text(".deadline"),
    Strategy::Text("time"),
];

const STATUS: [Strategy; 4] = [
    Strategy::Text(".status"),
    Strategy::Text(r#"[class*="status"]"#),
    Strategy::Text(".label"),
    Strategy::Text(".badge"),
];

const LINK: [Strategy; 4] = [
    Strategy::Attr(r#"a[href*="core_tasks"]"#, "href"),
    Strategy::Attr(r#"a[href*="/tasks/"]"#, "href"),
    Strategy::Attr(r#"a[href*="/assignment"]"#, "href"),
    Strategy::Attr("a[href]", "href"),
];

/// Unparsed fields of one listed assignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawAssignmentEntry {
    pub title: String,
    pub course: String,
    pub due: String,
    pub status: String,
    pub link: Option<String>,
    /// Name of the view the entry was found in.
    pub view: CompactString,
    /// Filled in only when assignment pages are visited.
    pub details: Option<AssignmentDetails>,
}

#[derive(Clone, Copy, Debug)]
pub struct CollectOptions {
    /// Limit of one navigation attempt (load plus DOM read).
    pub timeout: Duration,
    pub debug: bool,
}

/// Compiled selector cascades for containers and their fields.
#[derive(Debug)]
pub struct Extractor {
    containers: Cascade,
    title: Cascade,
    course: Cascade,
    due: Cascade,
    status: Cascade,
    link: Cascade,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Entries found on one page, plus the container strategy that found them.
#[derive(Debug)]
pub struct Extracted {
    pub strategy: Option<Strategy>,
    pub entries: Vec<RawAssignmentEntry>,
}

impl Extractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            containers: Cascade::new(&CONTAINERS),
            title: Cascade::new(&TITLE),
            course: Cascade::new(&COURSE),
            due: Cascade::new(&DUE),
            status: Cascade::new(&STATUS),
            link: Cascade::new(&LINK),
        }
    }

    /// Entries of `html` in document order. Relative links are resolved
    /// against `base`.
    #[must_use]
    pub fn extract(&self, html: &str, view: &str, base: &Url) -> Extracted {
        let document = Html::parse_document(html);
        let Some((idx, containers)) = self.containers.containers(&document) else {
            return Extracted {
                strategy: None,
                entries: Vec::new(),
            };
        };

        let entries = containers
            .into_iter()
            .map(|container| self.entry(container, view, base))
            .collect();

        Extracted {
            strategy: self.containers.strategy(idx),
            entries,
        }
    }

    fn entry(&self, container: ElementRef<'_>, view: &str, base: &Url) -> RawAssignmentEntry {
        let due = self.due.first(container).unwrap_or_else(|| {
            let text = text_of(container);
            find_in_text(&text).map(ToOwned::to_owned).unwrap_or_default()
        });

        let link = self
            .link
            .first_matching(container, |href| {
                !(href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:"))
            })
            .and_then(|href| base.join(&href).ok())
            .map(String::from);

        RawAssignmentEntry {
            title: self.title.first(container).unwrap_or_default(),
            course: self.course.first(container).unwrap_or_default(),
            due,
            status: self.status.first(container).unwrap_or_default(),
            link,
            view: view.into(),
            details: None,
        }
    }
}

/// What one view produced.
#[derive(Debug)]
pub struct ViewOutcome {
    pub view: View,
    pub result: Result<Vec<RawAssignmentEntry>, ViewError>,
}

/// Visits `views` one after another, lazily: a view is loaded only when the
/// stream is polled for it. A failing view yields an `Err` outcome and the
/// stream moves on.
pub fn collect<'a>(
    session: &'a Session,
    views: &'a [View],
    options: CollectOptions,
    sink: &'a dyn EventSink,
) -> impl Stream<Item = ViewOutcome> + 'a {
    let state = (views.iter(), Extractor::new());
    stream::unfold(state, move |(mut rest, extractor)| async move {
        let view = rest.next()?;
        let result = collect_view(session, view, &extractor, options, sink).await;
        Some((
            ViewOutcome {
                view: view.clone(),
                result,
            },
            (rest, extractor),
        ))
    })
}

async fn collect_view(
    session: &Session,
    view: &View,
    extractor: &Extractor,
    options: CollectOptions,
    sink: &dyn EventSink,
) -> Result<Vec<RawAssignmentEntry>, ViewError> {
    let fail = |message: String| {
        sink.emit(Event::new(Level::Error, Stage::Collect).view(&view.name).detail(message.clone()));
        ViewError::Collection { message }
    };

    if !session.is_authenticated() {
        return Err(fail("session is not authenticated".to_owned()));
    }
    let Some(url) = view.url(session.base()) else {
        return Err(fail(format!("cannot build a url from {:?}", view.target)));
    };

    sink.emit(Event::new(Level::Info, Stage::Collect).view(&view.name).detail(format!("loading {url}")));

    let page = session.page();
    let mut attempts = 0;
    let html = loop {
        attempts += 1;
        let load = async {
            page.goto(url.as_str()).await?;
            page.content().await
        };
        match timeout(options.timeout, load).await {
            Ok(Ok(html)) => break html,
            Ok(Err(e)) => return Err(fail(format!("cannot load {url}: {e:#}"))),
            Err(_) if attempts < MAX_ATTEMPTS => {
                sink.emit(
                    Event::new(Level::Warn, Stage::Collect)
                        .view(&view.name)
                        .detail(format!("timed out after {:?}, retrying", options.timeout)),
                );
            }
            Err(_) => {
                let error = ViewError::Timeout {
                    attempts,
                    after: options.timeout,
                };
                sink.emit(Event::new(Level::Error, Stage::Collect).view(&view.name).detail(error.to_string()));
                return Err(error);
            }
        }
    };

    let Extracted { strategy, entries } = extractor.extract(&html, &view.name, session.base());

    if options.debug {
        sink.emit(Event::new(Level::Debug, Stage::Collect).view(&view.name).detail(format!(
            "parsed {} bytes, container strategy {:?}",
            html.len(),
            strategy.map(Strategy::selector)
        )));
    }
    if entries.is_empty() {
        sink.emit(Event::new(Level::Info, Stage::Collect).view(&view.name).count(0).detail("no assignments listed"));
    } else {
        sink.emit(Event::new(Level::Info, Stage::Collect).view(&view.name).count(entries.len()).detail("entries found"));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
        <div class="tasks-list">
          <div class="line">
            <a class="title" href="/student/classes/7/core_tasks/101">Unit 3 Essay</a>
            <div class="group-name">English A: Language and Literature</div>
            <div class="due-date">Jan 10, 2024 at 11:59 PM</div>
            <span class="label label-danger">Overdue</span>
          </div>
          <div class="line">
            <a class="title" href="javascript:void(0)">Lab Report</a>
            <span class="course">Chemistry HL</span>
            <time datetime="2024-01-18T23:59:00+08:00">Thu</time>
          </div>
          <div class="line">
            <span class="title">Reading notes</span>
            <p>Due Friday 23:59</p>
          </div>
        </div>
        </body></html>
    "#;

    fn base() -> Url {
        Url::parse("https://school.managebac.com/").unwrap()
    }

    #[test]
    fn extracts_fields_with_fallbacks() {
        let extracted = Extractor::new().extract(LISTING, "pending", &base());
        assert_eq!(extracted.strategy.map(Strategy::selector), Some(".tasks-list .line"));
        let entries = extracted.entries;
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].title, "Unit 3 Essay");
        assert_eq!(entries[0].course, "English A: Language and Literature");
        assert_eq!(entries[0].due, "Jan 10, 2024 at 11:59 PM");
        assert_eq!(entries[0].status, "Overdue");
        assert_eq!(
            entries[0].link.as_deref(),
            Some("https://school.managebac.com/student/classes/7/core_tasks/101")
        );
        assert_eq!(entries[0].view, "pending");

        assert_eq!(entries[1].title, "Lab Report");
        assert_eq!(entries[1].course, "Chemistry HL");
        assert_eq!(entries[1].due, "2024-01-18T23:59:00+08:00");
        assert_eq!(entries[1].status, "");
        assert_eq!(entries[1].link, None);

        assert_eq!(entries[2].title, "Reading notes");
        assert_eq!(entries[2].course, "");
        assert_eq!(entries[2].due, "Friday 23:59");
    }

    #[test]
    fn page_without_containers_is_empty() {
        let extracted = Extractor::new().extract("<html><p>No tasks</p></html>", "overdue", &base());
        assert!(extracted.strategy.is_none());
        assert!(extracted.entries.is_empty());
    }

    #[test]
    fn table_rows_are_containers() {
        let html = r#"<table>
            <tr class="task-row"><td><h4>Problem set 5</h4></td><td class="subject">Math AA</td>
                <td class="date">2024-02-01</td><td class="status">Submitted</td></tr>
            <tr class="task-row"><td><h4>Problem set 6</h4></td></tr>
        </table>"#;
        let entries = Extractor::new().extract(html, "all", &base()).entries;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].course, "Math AA");
        assert_eq!(entries[0].due, "2024-02-01");
        assert_eq!(entries[0].status, "Submitted");
        assert_eq!(entries[1].title, "Problem set 6");
        assert_eq!(entries[1].due, "");
    }
}
