//! Optional visit of assignment pages for fields the listings do not show.

use core::time::Duration;

use scraper::Html;
use serde::Serialize;
use tokio::time::timeout;
use url::Url;

use crate::{
    auth::Session,
    collect::RawAssignmentEntry,
    error::Stage,
    events::{Event, EventSink, Level},
    scrape::{Cascade, Strategy},
};

const DESCRIPTION: [Strategy; 4] = [
    Strategy::Text(".description"),
    Strategy::Text(".assignment-description"),
    Strategy::Text(".instructions"),
    Strategy::Text(".content"),
];

const TEACHER: [Strategy; 3] = [
    Strategy::Text(".teacher"),
    Strategy::Text(".author"),
    Strategy::Text(r#"a[href*="/teachers/"]"#),
];

const CREATED: [Strategy; 2] = [Strategy::Text(".created-at"), Strategy::Text(r#"[class*="created"]"#)];

const UPDATED: [Strategy; 2] = [Strategy::Text(".updated-at"), Strategy::Text(r#"[class*="updated"]"#)];

const ATTACHMENTS: [Strategy; 2] = [
    Strategy::Text(r#"a[href*="/files/"]"#),
    Strategy::Text(r#"a[href*="/attachments/"]"#),
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentDetails {
    pub description: Option<String>,
    pub teacher: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Absolute URLs, in page order, without repeats.
    pub attachments: Vec<String>,
}

#[derive(Debug)]
pub struct DetailExtractor {
    description: Cascade,
    teacher: Cascade,
    created: Cascade,
    updated: Cascade,
    attachments: Cascade,
}

impl Default for DetailExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl DetailExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            description: Cascade::new(&DESCRIPTION),
            teacher: Cascade::new(&TEACHER),
            created: Cascade::new(&CREATED),
            updated: Cascade::new(&UPDATED),
            attachments: Cascade::new(&ATTACHMENTS),
        }
    }

    #[must_use]
    pub fn extract(&self, html: &str, base: &Url) -> AssignmentDetails {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut attachments = Vec::new();
        if let Some((_, links)) = self.attachments.containers(&document) {
            for href in links.into_iter().filter_map(|a| a.attr("href")) {
                if let Ok(url) = base.join(href.trim()) {
                    let url = String::from(url);
                    if !attachments.contains(&url) {
                        attachments.push(url);
                    }
                }
            }
        }

        AssignmentDetails {
            description: self.description.first(root),
            teacher: self.teacher.first(root),
            created_at: self.created.first(root),
            updated_at: self.updated.first(root),
            attachments,
        }
    }
}

/// Loads one assignment page on the session page, bounded by `limit`.
pub async fn fetch_details(
    session: &Session,
    extractor: &DetailExtractor,
    link: &str,
    limit: Duration,
) -> anyhow::Result<AssignmentDetails> {
    let page = session.page();
    let html = timeout(limit, async {
        page.goto(link).await?;
        page.content().await
    })
    .await??;
    Ok(extractor.extract(&html, session.base()))
}

/// Attaches details to entries with a link, in order, until `budget` pages
/// were read successfully. Failed pages are logged and do not use budget.
pub async fn enrich(
    session: &Session,
    entries: &mut [RawAssignmentEntry],
    budget: &mut usize,
    limit: Duration,
    sink: &dyn EventSink,
) {
    let extractor = DetailExtractor::new();
    for entry in entries.iter_mut() {
        if *budget == 0 {
            break;
        }
        let Some(link) = entry.link.as_deref() else {
            continue;
        };
        match fetch_details(session, &extractor, link, limit).await {
            Ok(details) => {
                entry.details = Some(details);
                *budget -= 1;
            }
            Err(e) => sink.emit(
                Event::new(Level::Warn, Stage::Collect)
                    .view(&entry.view)
                    .detail(format!("details of {link}: {e:#}")),
            ),
        }
    }
}
