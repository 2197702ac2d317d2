//! `gcpvcr` - inspect, lint and re-redact recorded cassettes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcpvcr::vcr::redact::{
    filter_headers, find_unredacted, redact_body, redact_url, RECORDED_REQUEST_HEADERS,
    RECORDED_RESPONSE_HEADERS,
};
use gcpvcr::vcr::Cassette;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Version injected at compile time via GCPVCR_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCPVCR_VERSION") {
    Some(v) => v,
    None => "dev",
};

/// Cassette tooling for GCP acceptance tests
#[derive(Parser, Debug)]
#[command(name = "gcpvcr", version, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the interactions of a cassette
    Inspect { cassette: PathBuf },
    /// Fail if a cassette still holds secrets
    Lint { cassette: PathBuf },
    /// Rewrite a cassette with redaction and header filtering applied
    Redact { cassette: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gcpvcr {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcpvcr").join("gcpvcr.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcpvcr").join("gcpvcr.log");
    }
    PathBuf::from("gcpvcr.log")
}

fn load(path: &Path) -> Result<Cassette> {
    Cassette::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn inspect(path: &Path) -> Result<()> {
    let cassette = load(path)?;
    println!(
        "{} - recorded {} - seed {} - {} interactions",
        cassette.name,
        cassette.recorded_at.to_rfc3339(),
        cassette.seed,
        cassette.len()
    );
    for interaction in &cassette.interactions {
        println!(
            "{:>4}  {:<6} {:>3}  {}",
            interaction.seq,
            interaction.request.method,
            interaction.response.status,
            interaction.request.url
        );
    }
    Ok(())
}

/// Every leftover secret in a cassette, one line each
fn lint_findings(cassette: &Cassette) -> Vec<String> {
    let mut findings = Vec::new();
    for interaction in &cassette.interactions {
        let seq = interaction.seq;
        let request = &interaction.request;
        if request
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("authorization"))
        {
            findings.push(format!("#{seq}: request stores an authorization header"));
        }
        if redact_url(&request.url) != request.url.as_str() {
            findings.push(format!("#{seq}: request URL carries a credential parameter"));
        }
        if let Some(body) = &request.body {
            for field in find_unredacted(body) {
                findings.push(format!("#{seq}: request body field {field} is not redacted"));
            }
        }
        for field in find_unredacted(&interaction.response.body) {
            findings.push(format!("#{seq}: response body field {field} is not redacted"));
        }
    }
    findings
}

fn lint(path: &Path) -> Result<()> {
    let cassette = load(path)?;
    let findings = lint_findings(&cassette);
    if findings.is_empty() {
        println!("{}: clean ({} interactions)", path.display(), cassette.len());
        return Ok(());
    }
    for finding in &findings {
        eprintln!("{}: {}", path.display(), finding);
    }
    bail!("{} has {} unredacted secrets", path.display(), findings.len())
}

fn redact(path: &Path) -> Result<()> {
    let mut cassette = load(path)?;
    for interaction in &mut cassette.interactions {
        let request = &mut interaction.request;
        request.url = redact_url(&request.url).into_owned();
        let headers: Vec<(String, String)> = request.headers.clone().into_iter().collect();
        request.headers = filter_headers(&headers, RECORDED_REQUEST_HEADERS);
        request.body = request
            .body
            .as_deref()
            .map(|body| redact_body(body).into_owned());

        let response = &mut interaction.response;
        let headers: Vec<(String, String)> = response.headers.clone().into_iter().collect();
        response.headers = filter_headers(&headers, RECORDED_RESPONSE_HEADERS);
        response.body = redact_body(&response.body).into_owned();
    }
    cassette
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}: rewritten ({} interactions)", path.display(), cassette.len());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    match &args.command {
        Command::Inspect { cassette } => inspect(cassette),
        Command::Lint { cassette } => lint(cassette),
        Command::Redact { cassette } => redact(cassette),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcpvcr::vcr::{Interaction, RecordedRequest, RecordedResponse};
    use std::collections::BTreeMap;

    fn leaky() -> Cassette {
        let mut cassette = Cassette::new("TestAccLeaky", 1);
        cassette.interactions.push(Interaction {
            seq: 0,
            request: RecordedRequest {
                method: "POST".to_string(),
                url: "https://x/keys?key=AIzaReal".to_string(),
                headers: BTreeMap::from([(
                    "authorization".to_string(),
                    "Bearer ya29.real".to_string(),
                )]),
                body: Some(r#"{"keyValue":"real"}"#.to_string()),
            },
            response: RecordedResponse {
                status: 200,
                headers: BTreeMap::new(),
                body: r#"{"name":"op"}"#.to_string(),
            },
        });
        cassette
    }

    #[test]
    fn test_lint_reports_each_leak() {
        let findings = lint_findings(&leaky());
        assert_eq!(findings.len(), 3, "{findings:?}");
    }

    #[test]
    fn test_redact_then_lint_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TestAccLeaky.yaml");
        leaky().save(&path).unwrap();

        redact(&path).unwrap();
        let cleaned = Cassette::load(&path).unwrap();
        assert!(lint_findings(&cleaned).is_empty());
        assert!(lint(&path).is_ok());
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Off.to_tracing_level(), None);
        assert_eq!(LogLevel::Debug.to_tracing_level(), Some(Level::DEBUG));
    }
}
