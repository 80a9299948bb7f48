use core::time::Duration;

use scraper::Html;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::{
    config::Credentials,
    error::{PipelineError, Stage},
    events::{Event, EventSink, Level},
    scrape::{Cascade, Launcher, Page, Strategy, first_hit},
};

const EMAIL_FIELDS: [&str; 5] = [
    r#"input[type="email"]"#,
    r#"input[name="email"]"#,
    r#"input[name="login"]"#,
    "#session_login",
    r#"input[autocomplete="username"]"#,
];

const PASSWORD_FIELDS: [&str; 3] = [
    r#"input[type="password"]"#,
    r#"input[name="password"]"#,
    "#session_password",
];

const SUBMIT_BUTTONS: [&str; 4] = [
    r#"button[type="submit"]"#,
    r#"input[type="submit"]"#,
    r#"[name="commit"]"#,
    ".btn-primary",
];

const ERROR_MESSAGES: [Strategy; 4] = [
    Strategy::Text(".alert-danger"),
    Strategy::Text(".flash-error"),
    Strategy::Text(".error"),
    Strategy::Text(r#"[class*="error"]"#),
];

const POLL_PERIOD: Duration = Duration::from_millis(1832 / 4);

pub const GENERIC_FAILURE: &str = "login failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// A browser page bound to the portal.
///
/// Only [`login`] produces an authenticated session. Closing consumes it, so a
/// session is released at most once.
pub struct Session {
    page: Box<dyn Page>,
    base: Url,
    state: SessionState,
}

impl Session {
    /// An unauthenticated session over an already open page.
    #[must_use]
    pub fn new(page: Box<dyn Page>, base: Url) -> Self {
        Self {
            page,
            base,
            state: SessionState::Unauthenticated,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    #[must_use]
    pub fn page(&self) -> &dyn Page {
        &*self.page
    }

    pub async fn close(self) -> anyhow::Result<()> {
        self.page.close().await
    }
}

#[must_use]
pub fn login_url(base: &Url) -> Url {
    base.join("login").unwrap_or_else(|_| base.clone())
}

/// Logs into the portal and returns an authenticated session.
///
/// The whole exchange, from opening the page to observing the outcome, is
/// bounded by `limit`. Fails with [`PipelineError::Authentication`] when the
/// portal rejects the credentials or the form cannot be filled, and with
/// [`PipelineError::Timeout`] when neither outcome shows up in time. Never
/// retries. The page is closed on every failure.
pub async fn login(
    launcher: &dyn Launcher,
    credentials: &Credentials,
    limit: Duration,
    sink: &dyn EventSink,
) -> Result<Session, PipelineError> {
    if limit.is_zero() {
        return Err(PipelineError::authentication("login timeout must be positive"));
    }

    let page = launcher.open_page().await.map_err(PipelineError::Launch)?;
    let mut session = Session::new(page, credentials.base().clone());

    let outcome = match timeout(limit, submit_and_wait(&session, credentials, sink)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(PipelineError::Timeout {
            stage: Stage::Login,
            after: limit,
        }),
    };

    match outcome {
        Ok(()) => {
            session.state = SessionState::Authenticated;
            sink.emit(Event::new(Level::Info, Stage::Login).detail(format!(
                "logged in as \x1b[1;36m{}\x1b[0m",
                credentials.email()
            )));
            Ok(session)
        }
        Err(err) => {
            sink.emit(Event::new(Level::Error, Stage::Login).detail(err.to_string()));
            if let Err(e) = session.close().await {
                sink.emit(Event::new(Level::Warn, Stage::Login).detail(format!("close page: {e:#}")));
            }
            Err(err)
        }
    }
}

async fn submit_and_wait(
    session: &Session,
    credentials: &Credentials,
    sink: &dyn EventSink,
) -> Result<(), PipelineError> {
    let page = session.page();
    let form_error = |e: anyhow::Error| PipelineError::authentication(format!("login form interaction failed: {e:#}"));

    let login_url = login_url(session.base());
    sink.emit(Event::new(Level::Info, Stage::Login).detail(format!("navigating to {login_url}")));
    page.goto(login_url.as_str()).await.map_err(form_error)?;

    // The portal may redirect to its real sign-in page (or an SSO host).
    let form_url = match page.current_url().await {
        Ok(url) => Url::parse(&url).unwrap_or_else(|_| login_url.clone()),
        Err(_) => login_url.clone(),
    };
    if form_url.as_str() != login_url.as_str() {
        sink.emit(Event::new(Level::Debug, Stage::Login).detail(format!("sign-in form at {form_url}")));
    }

    let Some(email_field) = first_hit(&EMAIL_FIELDS, |s| page.fill(s, credentials.email()))
        .await
        .map_err(form_error)?
    else {
        return Err(PipelineError::authentication(
            "login form interaction failed: email field not found",
        ));
    };
    let Some(password_field) = first_hit(&PASSWORD_FIELDS, |s| page.fill(s, credentials.password()))
        .await
        .map_err(form_error)?
    else {
        return Err(PipelineError::authentication(
            "login form interaction failed: password field not found",
        ));
    };
    sink.emit(
        Event::new(Level::Debug, Stage::Login)
            .detail(format!("filled {email_field} and {password_field}")),
    );

    // Banners rendered before submitting (often empty placeholders) do not count.
    let errors = Cascade::new(&ERROR_MESSAGES);
    let stale = page
        .content()
        .await
        .ok()
        .and_then(|html| error_message(&html, &errors));

    let submitted = first_hit(&SUBMIT_BUTTONS, |s| page.click(s))
        .await
        .map_err(form_error)?;
    if submitted.is_none() {
        sink.emit(
            Event::new(Level::Warn, Stage::Login)
                .detail("no submit button found, pressing Enter in the password field"),
        );
        page.press_enter(password_field).await.map_err(form_error)?;
    }

    let password_fields = Cascade::new(&PASSWORD_FIELDS.map(Strategy::Text));
    loop {
        // DevTools calls may fail while the document is being replaced.
        let (url, html) = match (page.current_url().await, page.content().await) {
            (Ok(url), Ok(html)) => (url, html),
            (Err(e), _) | (_, Err(e)) => {
                sink.emit(Event::new(Level::Debug, Stage::Login).detail(format!("poll: {e:#}")));
                sleep(POLL_PERIOD).await;
                continue;
            }
        };

        // A form re-rendered under another path (e.g. after POST) is still the sign-in page.
        if left_login(&url, &form_url) && !has_match(&html, &password_fields) {
            return Ok(());
        }
        match error_message(&html, &errors) {
            Some(message) if stale.as_ref() != Some(&message) => {
                return Err(PipelineError::authentication(message));
            }
            _ => {}
        }

        sleep(POLL_PERIOD).await;
    }
}

/// Whether `current` is another page than the sign-in form at `form_url`.
fn left_login(current: &str, form_url: &Url) -> bool {
    let Ok(current) = Url::parse(current) else {
        return false;
    };
    current.origin() != form_url.origin() || current.path().trim_end_matches('/') != form_url.path().trim_end_matches('/')
}

fn has_match(html: &str, cascade: &Cascade) -> bool {
    cascade.containers(&Html::parse_document(html)).is_some()
}

/// Text of the portal's error banner; the generic message when the banner is
/// present but empty. `None` when there is no banner.
fn error_message(html: &str, errors: &Cascade) -> Option<String> {
    let document = Html::parse_document(html);
    let (_, found) = errors.containers(&document)?;
    let message = found
        .into_iter()
        .map(crate::scrape::text_of)
        .find(|t| !t.is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE.to_owned());
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_is_below_base() {
        let base = Url::parse("https://school.managebac.com/").unwrap();
        assert_eq!(login_url(&base).as_str(), "https://school.managebac.com/login");
    }

    #[test]
    fn detects_navigation_away_from_login() {
        let login = Url::parse("https://school.managebac.com/login").unwrap();
        assert!(!left_login("https://school.managebac.com/login", &login));
        assert!(!left_login("https://school.managebac.com/login/", &login));
        assert!(!left_login("https://school.managebac.com/login?error=1", &login));
        assert!(left_login("https://school.managebac.com/student", &login));
    }

    #[test]
    fn redirected_sign_in_page_is_the_reference() {
        let form = Url::parse("https://sso.example.org/users/sign_in").unwrap();
        assert!(!left_login("https://sso.example.org/users/sign_in", &form));
        assert!(!left_login("https://sso.example.org/users/sign_in?error=1", &form));
        assert!(left_login("https://school.managebac.com/student", &form));
    }

    #[test]
    fn sign_in_form_is_recognised_by_its_password_field() {
        let fields = Cascade::new(&PASSWORD_FIELDS.map(Strategy::Text));
        assert!(has_match(r#"<form><input type="password"></form>"#, &fields));
        assert!(!has_match(r#"<main><div class="form-errors"></div></main>"#, &fields));
    }

    #[test]
    fn error_banner_text_or_generic() {
        let errors = Cascade::new(&ERROR_MESSAGES);
        let html = r#"<form><div class="alert alert-danger"> Invalid email
            or password </div></form>"#;
        assert_eq!(error_message(html, &errors).as_deref(), Some("Invalid email or password"));

        let html = r#"<form><div class="field-error"></div></form>"#;
        assert_eq!(error_message(html, &errors).as_deref(), Some(GENERIC_FAILURE));

        assert_eq!(error_message("<form><input type=email></form>", &errors), None);
    }
}
