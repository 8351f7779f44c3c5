use anyhow::{anyhow, Context, Result};
use case_session::{CaseSession, CaseView, SessionEvent, ViewOptions};
use clap::{Parser, Subcommand, ValueEnum};
use file_tree::FileTreeMode;
use module_watch::SeenModulesIndex;
use scan_api::{HttpScanApi, ScanApi};
use scanview_core::{records_from_value, AnalysisRecord, CaseId, TreeNode};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod render;

const DEFAULT_LOG_FILTER: &str = "warn,scanview=info,case_session=info,module_status=info,module_watch=info";

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Jsonl }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum TreeMode { Auto, Flat, Nested }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ResultView { Raw, Files, Processes, Network }

#[derive(Debug, Parser)]
#[command(name = "scanview", version, about = "Structure and follow memory-analysis scan results")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./scanview.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend base URL (overrides config)
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Output format: text, json, or jsonl
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Build a file tree from a JSON results file
    FileTree {
        file: PathBuf,
        /// Input shape; auto detects server-built hierarchies
        #[arg(long, value_enum, default_value_t = TreeMode::Auto)]
        mode: TreeMode,
    },
    /// Build a process tree from a JSON results file
    ProcessTree { file: PathBuf },
    /// Build the connection graph from a JSON results file
    NetGraph {
        file: PathBuf,
        /// Also write edges as CSV
        #[arg(long, value_name = "OUT")]
        csv: Option<PathBuf>,
    },
    /// Check that the backend answers
    Health,
    /// List cases known to the backend
    Cases,
    /// Show one case's status
    Status {
        #[arg(long)]
        case: String,
    },
    /// Fetch one module's results for a case
    Results {
        #[arg(long)]
        case: String,
        #[arg(long)]
        module: String,
        #[arg(long, value_enum, default_value_t = ResultView::Raw)]
        view: ResultView,
    },
    /// Follow a case: module transitions, new modules, refreshed results
    Watch {
        #[arg(long)]
        case: String,
        /// Module whose results are refetched on completion (default: first module seen)
        #[arg(long)]
        module: Option<String>,
        /// Stop after N polls
        #[arg(long)]
        ticks: Option<u64>,
        /// Poll interval in milliseconds (overrides config)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn init_tracing(cfg: &config::Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(cfg.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn read_records(path: &Path) -> Result<Vec<AnalysisRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {}", path.display()))?;
    Ok(records_from_value(value))
}

fn tree_mode(mode: TreeMode, records: &[AnalysisRecord]) -> FileTreeMode {
    match mode {
        TreeMode::Auto => FileTreeMode::detect(records),
        TreeMode::Flat => FileTreeMode::FlatPaths,
        TreeMode::Nested => FileTreeMode::Hierarchical,
    }
}

fn print_forest(roots: &[TreeNode], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render::forest(roots)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(roots)?),
        OutputFormat::Jsonl => {
            for r in roots { println!("{}", serde_json::to_string(r)?); }
        }
    }
    Ok(())
}

fn print_graph(graph: &net_topology::NetworkGraph, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render::graph(graph)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(graph)?),
        OutputFormat::Jsonl => {
            for n in &graph.nodes { println!("{}", serde_json::json!({"node": n})); }
            for e in &graph.edges { println!("{}", serde_json::json!({"edge": e})); }
        }
    }
    Ok(())
}

fn write_edges_csv(graph: &net_topology::NetworkGraph, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(File::create(path)?);
    wtr.write_record(["source", "target", "protocol", "state", "local_port", "foreign_port"])?;
    for e in &graph.edges {
        wtr.write_record([
            e.source.clone(),
            e.target.clone(),
            e.protocol().unwrap_or_default(),
            e.state().unwrap_or_default(),
            e.local_port().map(|v| v.to_string()).unwrap_or_default(),
            e.foreign_port().map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_event(ev: &SessionEvent, format: OutputFormat) -> Result<()> {
    let ts = now_rfc3339();
    match format {
        OutputFormat::Text => println!("{} {}", ts, render::event(ev)),
        OutputFormat::Json | OutputFormat::Jsonl => {
            let mut obj = serde_json::to_value(ev)?;
            if let Some(map) = obj.as_object_mut() {
                map.insert("ts".into(), ts.into());
            }
            println!("{}", serde_json::to_string(&obj)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = config::load_config(cli.config.as_deref());
    let mut cfg = match &loaded {
        Ok(Some(c)) => c.clone(),
        _ => config::Config::default(),
    };
    init_tracing(&cfg);
    if let Err(e) = &loaded {
        let reason = format!("{:#}", e);
        tracing::warn!(error = %reason, "config not loaded, using defaults");
    }
    if let Some(url) = cli.base_url {
        cfg.api.base_url = url;
    }
    let format = cli.format;

    match cli.command {
        Commands::Version => {
            println!("scanview {} (core {})", env!("CARGO_PKG_VERSION"), scanview_core::version());
        }
        Commands::FileTree { file, mode } => {
            let records = read_records(&file)?;
            let mode = tree_mode(mode, &records);
            let roots = file_tree::build_file_tree(&records, mode);
            tracing::info!(records = records.len(), nodes = scanview_core::forest_count(&roots), ?mode, "file tree built");
            print_forest(&roots, format)?;
        }
        Commands::ProcessTree { file } => {
            let records = read_records(&file)?;
            let roots = process_tree::build_process_tree(&records);
            tracing::info!(records = records.len(), roots = roots.len(), "process tree built");
            print_forest(&roots, format)?;
        }
        Commands::NetGraph { file, csv } => {
            let records = read_records(&file)?;
            let graph = net_topology::build_network_graph(&records);
            if let Some(path) = csv {
                write_edges_csv(&graph, &path)?;
                tracing::info!(edges = graph.edges.len(), out = %path.display(), "edges written");
            }
            print_graph(&graph, format)?;
        }
        Commands::Health => {
            let api = HttpScanApi::new(&cfg.api.options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let ok = rt.block_on(api.health());
            match format {
                OutputFormat::Text => println!("{} {}", cfg.api.base_url, if ok { "ok" } else { "unreachable" }),
                _ => println!("{}", serde_json::json!({"base_url": cfg.api.base_url, "healthy": ok})),
            }
            if !ok {
                return Err(anyhow!("backend at {} is not healthy", cfg.api.base_url));
            }
        }
        Commands::Cases => {
            let api = HttpScanApi::new(&cfg.api.options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let cases = rt.block_on(api.list_cases())?;
            match format {
                OutputFormat::Text => {
                    for c in &cases { println!("{}", render::case_line(c)); }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cases)?),
                OutputFormat::Jsonl => {
                    for c in &cases { println!("{}", serde_json::to_string(c)?); }
                }
            }
        }
        Commands::Status { case } => {
            let api = HttpScanApi::new(&cfg.api.options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(api.case_status(&CaseId::from(case.as_str())))?;
            match format {
                OutputFormat::Text => {
                    println!("{}", render::case_line(&summary));
                    if let Some(err) = &summary.error { println!("  error: {}", err); }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Jsonl => println!("{}", serde_json::to_string(&summary)?),
            }
        }
        Commands::Results { case, module, view } => {
            let api = HttpScanApi::new(&cfg.api.options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let started = Instant::now();
            let records = rt.block_on(api.module_results(&CaseId::from(case.as_str()), &module))?;
            tracing::info!(case = %case, module = %module, records = records.len(), duration_ms = started.elapsed().as_millis() as u64, "results fetched");
            match view {
                ResultView::Raw => match format {
                    OutputFormat::Jsonl | OutputFormat::Text => {
                        for r in &records { println!("{}", serde_json::to_string(r)?); }
                    }
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                },
                ResultView::Files => {
                    let mode = FileTreeMode::detect(&records);
                    print_forest(&file_tree::build_file_tree(&records, mode), format)?;
                }
                ResultView::Processes => print_forest(&process_tree::build_process_tree(&records), format)?,
                ResultView::Network => print_graph(&net_topology::build_network_graph(&records), format)?,
            }
        }
        Commands::Watch { case, module, ticks, interval_ms } => {
            if let Some(ms) = interval_ms {
                cfg.watch.poll_interval_ms = ms;
            }
            let api: Arc<dyn ScanApi> = Arc::new(HttpScanApi::new(&cfg.api.options())?);
            let mut session = CaseSession::new(api, CaseId::from(case.as_str()), SeenModulesIndex::new())
                .with_auto_select(cfg.watch.auto_select && module.is_none());
            if let Some(m) = &module {
                session.select(m);
            }
            let opts = ViewOptions { period: cfg.watch.period(), max_ticks: ticks };
            tracing::info!(case = %case, period_ms = opts.period.as_millis() as u64, "watching case");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                let (tx, mut rx) = mpsc::channel(64);
                let view = CaseView::open(session, opts, tx);
                loop {
                    tokio::select! {
                        ev = rx.recv() => match ev {
                            Some(ev) => print_event(&ev, format)?,
                            None => break,
                        },
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("interrupted");
                            break;
                        }
                    }
                }
                view.close();
                Ok::<_, anyhow::Error>(())
            })?;
        }
    }
    Ok(())
}
