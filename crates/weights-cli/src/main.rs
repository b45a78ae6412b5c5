//! weights — a thin driver for `weights-core`.
//!
//! Builds a synthetic multi-host dataset with the in-memory mock
//! collaborator, runs one `WeightsRequest` through the coordinator, ranks
//! and renders it, and prints the JSON response. Plays the role the
//! teacher's `rpglot` binary plays for `rpglot-core`: proves the library
//! end-to-end without a real storage engine behind it.

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use weights_core::coordinator;
use weights_core::query::mock::MockCollaborator;
use weights_core::rank;
use weights_core::render;
use weights_core::request::{EngineConfig, OutputFormat, Selector, WeightsMethod, WeightsRequest};
use weights_core::util::parse_time;

/// Runs the Metric Correlations / Weights Engine against a synthetic fleet.
#[derive(Parser)]
#[command(name = "weights", about = "Metric correlations / weights engine demo", version)]
struct Args {
    /// Scoring method.
    #[arg(long, value_enum, default_value_t = Method::Ks2)]
    method: Method,

    /// Output shape.
    #[arg(long, value_enum, default_value_t = Format::Charts)]
    format: Format,

    /// Highlight window start: epoch seconds, ISO 8601, or relative (`-1h`, `-30m`).
    #[arg(long, default_value = "400")]
    after: String,

    /// Highlight window end: epoch seconds, ISO 8601, or relative (`-1h`, `-30m`).
    #[arg(long, default_value = "600")]
    before: String,

    /// Baseline window start (KS2/Volume only), same formats as `--after`.
    #[arg(long, default_value = "0")]
    baseline_after: String,

    /// Baseline window end (KS2/Volume only), same formats as `--after`.
    #[arg(long, default_value = "400")]
    baseline_before: String,

    /// Points per window.
    #[arg(long, default_value_t = 20)]
    points: u32,

    /// Number of synthetic hosts to generate.
    #[arg(long, default_value_t = 5)]
    hosts: usize,

    /// Restrict to a single node, by name (e.g. "host-2").
    #[arg(long)]
    node: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Method {
    Ks2,
    Volume,
    AnomalyRate,
    Value,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Ks2 => "ks2",
            Method::Volume => "volume",
            Method::AnomalyRate => "anomaly-rate",
            Method::Value => "value",
        };
        write!(f, "{s}")
    }
}

impl From<Method> for WeightsMethod {
    fn from(m: Method) -> Self {
        match m {
            Method::Ks2 => WeightsMethod::Ks2,
            Method::Volume => WeightsMethod::Volume,
            Method::AnomalyRate => WeightsMethod::AnomalyRate,
            Method::Value => WeightsMethod::Value,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Format {
    Charts,
    Contexts,
    Multinode,
    Mcp,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Charts => "charts",
            Format::Contexts => "contexts",
            Format::Multinode => "multinode",
            Format::Mcp => "mcp",
        };
        write!(f, "{s}")
    }
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Charts => OutputFormat::Charts,
            Format::Contexts => OutputFormat::Contexts,
            Format::Multinode => OutputFormat::Multinode,
            Format::Mcp => OutputFormat::Mcp,
        }
    }
}

/// Initializes the tracing subscriber, matching `rpglotd`'s `init_logging`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("weights={level}").parse().unwrap())
        .add_directive(format!("weights_core={level}").parse().unwrap());

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Builds `host_count` hosts, each reporting the same three `system.cpu`
/// dimensions, with a distinct synthetic anomaly injected on `host-0` so the
/// demo has something worth correlating: `user` spikes during the highlight
/// window while `system`/`idle` stay flat.
fn synthetic_fleet(host_count: usize, baseline_after: i64, before: i64, step: i64) -> MockCollaborator {
    let mut mock = MockCollaborator::new();
    for h in 0..host_count {
        let host = format!("host-{h}");
        let anomalous = h == 0;

        let points = |flat: f64, spike: f64| -> Vec<(i64, f64)> {
            let mut t = baseline_after;
            let mut pts = Vec::new();
            while t < before {
                let value = if anomalous && t >= (before + baseline_after) / 2 { spike } else { flat };
                pts.push((t, value));
                t += step;
            }
            pts
        };

        mock = mock.with_metric(&host, "system.cpu", "cpu", "user", points(20.0, 80.0));
        mock = mock.with_metric(&host, "system.cpu", "cpu", "system", points(5.0, 6.0));
        mock = mock.with_metric(&host, "system.cpu", "cpu", "idle", points(75.0, 74.0));
    }
    mock
}

/// Resolves a CLI time argument to epoch seconds, exiting with a clear
/// message on a malformed value rather than letting a bad `i64` silently
/// produce an empty window.
fn resolve_time(input: &str, flag: &str) -> i64 {
    parse_time(input).unwrap_or_else(|e| {
        eprintln!("invalid value for {flag}: {e}");
        std::process::exit(2);
    })
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("weights engine demo starting");

    // Each of these accepts the formats spec §6.1 requires ("relative
    // allowed; resolved to absolute"): epoch seconds, ISO 8601, or a
    // relative offset like `-1h`.
    let after = resolve_time(&args.after, "--after");
    let before = resolve_time(&args.before, "--before");
    let baseline_after = resolve_time(&args.baseline_after, "--baseline-after");
    let baseline_before = resolve_time(&args.baseline_before, "--baseline-before");

    let step = ((before - baseline_after).max(1) / (args.points as i64 * 4).max(1)).max(1);
    let source = synthetic_fleet(args.hosts, baseline_after, before, step);

    let nodes = match &args.node {
        Some(n) => Selector { scope: vec![], include: vec![n.clone()] },
        None => Selector::default(),
    };

    let request = WeightsRequest {
        method: args.method.into(),
        format: args.format.into(),
        after,
        before,
        baseline_after,
        baseline_before,
        points: args.points,
        nodes,
        ..Default::default()
    };

    let config = EngineConfig::default();

    let outcome = match coordinator::run(&request, &config, &source) {
        Ok(outcome) => outcome,
        Err(e) => {
            let error = serde_json::json!({"error": e.to_string(), "status": e.as_http_status()});
            println!("{}", serde_json::to_string_pretty(&error).unwrap());
            std::process::exit(1);
        }
    };

    let max_base_high_ratio = outcome.stats.max_base_high_ratio;
    let ranked = rank::spread_evenly(&outcome.registry, request.method, request.format, max_base_high_ratio);
    let response = render::render(&request, &outcome, &ranked);

    info!(registered = ranked.len(), status = outcome.status.as_http_status(), "rendering response");

    println!("{}", serde_json::to_string_pretty(&response).unwrap());
}
