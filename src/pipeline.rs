use core::pin::pin;

use chrono::NaiveDate;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::task::spawn_blocking;

use crate::{
    auth::login,
    classify::{AssignmentRecord, classify},
    collect::{CollectOptions, collect},
    config::Config,
    details,
    error::{PipelineError, Stage, ViewFailure},
    events::{Event, EventSink, Level},
    scrape::{Chrome, Launcher},
    view,
};

/// Records of every view that could be read, and why the others could not.
#[derive(Debug, Default, Serialize)]
pub struct Acquisition {
    pub records: Vec<AssignmentRecord>,
    pub failures: Vec<ViewFailure>,
}

/// Runs the whole pipeline against a freshly launched Chromium, classifying
/// against today's local date.
pub async fn acquire_assignments(config: &Config, sink: &dyn EventSink) -> Result<Acquisition, PipelineError> {
    if view::plan(&config.views_to_check, &config.view_paths).is_empty() {
        sink.emit(Event::new(Level::Info, Stage::Launch).detail("no views to check"));
        return Ok(Acquisition::default());
    }
    config.validate()?;

    let (headless, timeout) = (config.headless, config.timeout());
    sink.emit(Event::new(Level::Info, Stage::Launch).detail(format!("starting chromium (headless: {headless})")));
    let chrome = spawn_blocking(move || Chrome::launch(headless, timeout))
        .await
        .map_err(|e| PipelineError::Launch(e.into()))?
        .map_err(PipelineError::Launch)?;

    let today = chrono::Local::now().date_naive();
    acquire_assignments_with(config, &chrome, sink, today).await
}

/// [`acquire_assignments`] over any browser.
///
/// Login failures are returned; failures of single views end up in
/// [`Acquisition::failures`]. The session is closed before returning.
pub async fn acquire_assignments_with(
    config: &Config,
    launcher: &dyn Launcher,
    sink: &dyn EventSink,
    as_of: NaiveDate,
) -> Result<Acquisition, PipelineError> {
    let views = view::plan(&config.views_to_check, &config.view_paths);
    if views.is_empty() {
        sink.emit(Event::new(Level::Info, Stage::Launch).detail("no views to check"));
        return Ok(Acquisition::default());
    }
    let credentials = config.validate()?;

    let session = login(launcher, &credentials, config.timeout(), sink).await?;

    let options = CollectOptions {
        timeout: config.timeout(),
        debug: config.debug,
    };
    let mut acquisition = Acquisition::default();
    let mut budget = if config.fetch_details { config.details_limit } else { 0 };
    {
        let mut outcomes = pin!(collect(&session, &views, options, sink));
        while let Some(outcome) = outcomes.next().await {
            match outcome.result {
                Ok(mut entries) => {
                    if budget > 0 {
                        details::enrich(&session, &mut entries, &mut budget, config.timeout(), sink).await;
                    }
                    let records = classify(entries, as_of);
                    sink.emit(
                        Event::new(Level::Info, Stage::Classify)
                            .view(&outcome.view.name)
                            .count(records.len())
                            .detail("records classified"),
                    );
                    acquisition.records.extend(records);
                }
                Err(error) => acquisition.failures.push(ViewFailure {
                    view: outcome.view.name,
                    error,
                }),
            }
        }
    }

    if let Err(e) = session.close().await {
        sink.emit(Event::new(Level::Warn, Stage::Collect).detail(format!("close page: {e:#}")));
    }

    sink.emit(
        Event::new(Level::Info, Stage::Classify)
            .count(acquisition.records.len())
            .detail(format!("records in total, {} view(s) failed", acquisition.failures.len())),
    );
    Ok(acquisition)
}
