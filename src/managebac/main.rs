mod report;

use std::{io::BufReader, path::PathBuf};

use anyhow::Context;
use ascr::{Config, TracingSink};

/// Fetches ManageBac assignments and ranks them by urgency.
#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    /// JSON config file; flags and environment variables override it
    #[arg(short, long, value_name = "file")]
    config: Option<PathBuf>,
    #[arg(long, env = "MANAGEBAC_EMAIL")]
    email: Option<String>,
    /// Prompted for when missing
    #[arg(long, env = "MANAGEBAC_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Portal root, e.g. https://school.managebac.com
    #[arg(long, env = "MANAGEBAC_URL")]
    url: Option<String>,
    #[arg(long, env = "HEADLESS")]
    headless: Option<bool>,
    /// Per-step limit in milliseconds
    #[arg(long, value_name = "ms", env = "TIMEOUT")]
    timeout: Option<u64>,
    /// Views to check, in order (pending, overdue, submitted, all, ...)
    #[arg(long = "view", value_name = "name", env = "VIEWS", value_delimiter = ',')]
    views: Vec<String>,
    #[arg(long, env = "DEBUG")]
    debug: bool,
    /// Also visit assignment pages (description, teacher, attachments)
    #[arg(long, env = "FETCH_DETAILS")]
    fetch_details: bool,
    /// Most assignment pages visited per run
    #[arg(long, value_name = "n", env = "DETAILS_LIMIT")]
    details_limit: Option<usize>,
    #[arg(long, env = "REPORT_FORMAT", value_delimiter = ',', default_value = "console")]
    format: Vec<report::Format>,
    #[arg(long, value_name = "dir", env = "OUTPUT_DIR", default_value = "reports")]
    output_dir: PathBuf,
}

fn init_logger(debug: bool) {
    let level = if debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    pretty_env_logger::formatted_timed_builder()
        .filter_level(level)
        .filter_module("headless_chrome", log::LevelFilter::Warn)
        .filter_module("tungstenite", log::LevelFilter::Warn)
        .parse_default_env()
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let file = std::fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            Config::from_json(BufReader::new(file)).with_context(|| format!("cannot parse {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(email) = &args.email {
        config.email.clone_from(email);
    }
    if let Some(password) = &args.password {
        config.password.clone_from(password);
    }
    if let Some(url) = &args.url {
        config.portal_url.clone_from(url);
    }
    if let Some(headless) = args.headless {
        config.headless = headless;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = timeout;
    }
    if !args.views.is_empty() {
        config.views_to_check.clone_from(&args.views);
    }
    config.debug |= args.debug;
    config.fetch_details |= args.fetch_details;
    if let Some(limit) = args.details_limit {
        config.details_limit = limit;
    }

    if config.password.is_empty() && !config.views_to_check.is_empty() {
        config.password = rpassword::prompt_password(format!("password for {}: ", config.email))?;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    let args = Args::parse();
    let config = load_config(&args)?;
    init_logger(config.debug);
    tracing::debug!(target: "config", "{config:?}");

    let acquisition = ascr::acquire_assignments(&config, &TracingSink).await?;
    for failure in &acquisition.failures {
        tracing::warn!(target: "collect", "{failure}");
    }

    let report = report::Report::new(&acquisition, chrono::Local::now());
    for &format in &args.format {
        if let Some(path) = report.emit(format, &args.output_dir)? {
            tracing::info!(target: "report", "written to \x1b[1;32m{}\x1b[0m", path.display());
        }
    }

    Ok(())
}
