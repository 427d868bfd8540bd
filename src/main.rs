mod collectors;
mod config;
mod error;
mod sink;
mod snapshot;

use clap::Parser;
use collectors::system::SysinfoProvider;
use collectors::{Collector, SystemProvider};
use config::{Config, Overrides};
use error::{ExportError, Stage};
use sink::{Delivery, Destination};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LONG_FLAGS: &[&str] = &[
    "url",
    "cpu-sample-window",
    "config",
    "user-agent",
    "print-default-config",
    "help",
    "version",
];

#[derive(Parser, Debug)]
#[command(name = "system-data-exporter")]
#[command(version, about = "Collect a host telemetry snapshot and print or POST it as JSON")]
struct Cli {
    /// Destination: '-' for stdout, or an absolute http(s) URL to POST to
    #[arg(long)]
    url: Option<String>,
    /// How long CPU usage is sampled, e.g. "5s" or "250ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    cpu_sample_window: Option<Duration>,
    /// Optional YAML config file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    user_agent: Option<String>,
    #[arg(long)]
    print_default_config: bool,
}

fn main() {
    init_tracing();

    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::resolve(
        cli.config.as_deref(),
        Overrides {
            url: cli.url,
            cpu_sample_window: cli.cpu_sample_window,
            user_agent: cli.user_agent,
        },
    ) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let mut provider = SysinfoProvider::new();
    let stdout = std::io::stdout();
    match run(&cfg, &mut provider, &mut stdout.lock()) {
        Ok(()) => info!(stage = %Stage::Done, "export finished"),
        Err(err) => {
            error!(stage = %Stage::Failed, stopped_at = %err.stage(), error = %err, "export failed");
            std::process::exit(1);
        }
    }
}

/// One export: validate the destination, collect, serialize, deliver.
/// Everything meant for stdout goes to `out`.
fn run<P: SystemProvider, W: Write>(
    cfg: &Config,
    provider: &mut P,
    out: &mut W,
) -> Result<(), ExportError> {
    let destination = Destination::parse(&cfg.url)?;

    info!(stage = %Stage::Collecting, window = ?cfg.cpu_sample_window(), "collecting snapshot");
    let snapshot = Collector::new(cfg.cpu_sample_window()).collect(provider)?;

    info!(stage = %Stage::Serializing, "serializing snapshot");
    let document = snapshot::to_json(&snapshot)?;

    info!(stage = %Stage::Delivering, destination = %cfg.url, bytes = document.len(), "delivering snapshot");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ExportError::Runtime)?;
    let delivery = runtime.block_on(sink::deliver(&destination, document, &mut *out, &cfg.user_agent))?;

    if let Delivery::Posted(report) = delivery {
        writeln!(out, "Response-Status: {}", report.status)?;
        writeln!(out, "Response-Content: {}", report.body)?;
        out.flush()?;
    }
    Ok(())
}

/// Logs go to stderr so stdout carries nothing but the document.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Accepts Go-style single-dash long flags (`-url x`, `-url=x`) by
/// rewriting them to their `--` form before clap sees them.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(rest) = text.strip_prefix('-') else {
                return arg;
            };
            if rest.starts_with('-') {
                return arg;
            }
            let name = rest.split('=').next().unwrap_or(rest);
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::tests::FixtureProvider;
    use crate::collectors::Subsystem;
    use crate::sink::tests::spawn_receiver;
    use crate::snapshot::tests::sample_snapshot;
    use crate::snapshot::Snapshot;

    const SUBSYSTEMS: [Subsystem; 10] = [
        Subsystem::Memory,
        Subsystem::Host,
        Subsystem::DiskPartitions,
        Subsystem::DiskUsage,
        Subsystem::CpuPercent,
        Subsystem::CpuInfo,
        Subsystem::LoadAverage,
        Subsystem::Network,
        Subsystem::Uptime,
        Subsystem::Processes,
    ];

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    fn config(url: &str, user_agent: &str) -> Config {
        Config {
            url: url.to_string(),
            cpu_sample_window_ms: 0,
            user_agent: user_agent.to_string(),
        }
    }

    #[test]
    fn stdout_run_prints_one_snapshot_line() {
        let mut provider = FixtureProvider::new(sample_snapshot());
        let mut out = Vec::new();

        run(&config("-", "test-agent"), &mut provider, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        let parsed: Snapshot = serde_json::from_str(text.trim_end()).unwrap();
        let expected = sample_snapshot();
        assert_eq!(parsed.memory, expected.memory);
        assert_eq!(parsed.host_info, expected.host_info);
        assert_eq!(parsed.processes, expected.processes);
        assert!(parsed.disk_usage.contains_key("/"));
    }

    #[test]
    fn stdout_run_does_not_need_a_valid_user_agent() {
        let mut provider = FixtureProvider::new(sample_snapshot());
        let mut out = Vec::new();

        run(&config("-", "agent\nbroken"), &mut provider, &mut out)
            .expect("user agent only matters for http");

        assert!(out.ends_with(b"\n"));
        assert_eq!(out.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn collection_failure_writes_nothing_to_stdout() {
        for failing in SUBSYSTEMS {
            let mut provider = FixtureProvider::new(sample_snapshot());
            provider.fail_on = Some(failing);
            let mut out = Vec::new();

            let err = run(&config("-", "test-agent"), &mut provider, &mut out)
                .expect_err("collection failure must abort the run");

            assert!(out.is_empty(), "{failing}: wrote {} bytes", out.len());
            assert_eq!(err.stage(), Stage::Collecting);
            match err {
                ExportError::Collection(e) => assert_eq!(e.subsystem, failing),
                other => panic!("{failing}: unexpected error {other}"),
            }
        }
    }

    #[test]
    fn collection_failure_sends_no_request() {
        // The receiver lives on its own runtime; `run` builds its own.
        let server = tokio::runtime::Runtime::new().unwrap();
        let (base, received) = server.block_on(spawn_receiver());
        let url = base.join("ingest").unwrap().to_string();

        for failing in SUBSYSTEMS {
            let mut provider = FixtureProvider::new(sample_snapshot());
            provider.fail_on = Some(failing);
            let mut out = Vec::new();

            let err = run(&config(&url, "test-agent"), &mut provider, &mut out)
                .expect_err("collection failure must abort the run");

            assert!(out.is_empty());
            assert!(
                matches!(err, ExportError::Collection(ref e) if e.subsystem == failing),
                "{failing}: {err}"
            );
        }
        assert!(received.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn http_run_posts_once_and_reports_response() {
        let server = tokio::runtime::Runtime::new().unwrap();
        let (base, received) = server.block_on(spawn_receiver());
        let url = base.join("ingest").unwrap().to_string();
        let mut provider = FixtureProvider::new(sample_snapshot());
        let mut out = Vec::new();

        run(&config(&url, "test-agent"), &mut provider, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Response-Status: 202 Accepted\nResponse-Content: stored\n");
        let requests = received.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.as_deref(), Some("application/json"));
        let posted: Snapshot = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(posted.host_info, sample_snapshot().host_info);
    }

    #[test]
    fn invalid_destination_stops_before_collection() {
        let mut provider = FixtureProvider::new(sample_snapshot());
        let mut out = Vec::new();

        let err = run(&config("not-a-url", "test-agent"), &mut provider, &mut out).unwrap_err();

        assert!(matches!(err, ExportError::Validation { .. }));
        assert!(provider.calls.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn single_dash_long_flags_are_rewritten() {
        let out = normalize_args(args(&[
            "system-data-exporter",
            "-url",
            "http://h/x",
            "-cpu-sample-window=1s",
            "--config",
            "c.yaml",
            "-",
        ]));
        assert_eq!(
            out,
            args(&[
                "system-data-exporter",
                "--url",
                "http://h/x",
                "--cpu-sample-window=1s",
                "--config",
                "c.yaml",
                "-",
            ])
        );
    }

    #[test]
    fn go_style_url_flag_parses() {
        let cli = Cli::parse_from(normalize_args(args(&["x", "-url", "-"])));
        assert_eq!(cli.url.as_deref(), Some("-"));

        let cli = Cli::parse_from(normalize_args(args(&["x", "-url=http://h/ingest"])));
        assert_eq!(cli.url.as_deref(), Some("http://h/ingest"));
    }

    #[test]
    fn sample_window_accepts_humantime() {
        let cli = Cli::parse_from(args(&["x", "--cpu-sample-window", "250ms"]));
        assert_eq!(cli.cpu_sample_window, Some(Duration::from_millis(250)));
    }

    #[test]
    fn unknown_single_dash_args_are_left_alone() {
        let out = normalize_args(args(&["x", "-v", "-urlx"]));
        assert_eq!(out, args(&["x", "-v", "-urlx"]));
    }
}
