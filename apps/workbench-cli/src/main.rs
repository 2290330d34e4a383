use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use workbench_common::PropertyBag;
use workbench_kernel::{
    AlgorithmHost, AlgorithmRegistry, AlgorithmSpec, Datastore, EntityRepository, LayerState, LoggingProgress,
    ModelCatalog, PerspectiveState, PreferenceStore, Repository, ViewerPartState, ViewerRegistry, ViewerState,
    WindowManager, Workbench,
};
use workbench_persist::{
    Collaborators, RestoreFailure, RestoreOptions, SessionConfig, SessionService, decoder, escape,
};

#[derive(Parser)]
#[command(name = "workbench-cli", about = "CLI tool for workbench session files")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Workspace directory holding sessions and engine state
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// JSON session configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and effective configuration
    Info,
    /// Dump every record of a session file
    Inspect { file: PathBuf },
    /// Parse a session file and report dangling references
    Check { file: PathBuf },
    /// Escape text for an attribute value
    Escape { text: String },
    /// Reverse attribute escaping
    Unescape { text: String },
    /// Build a sample workbench, save it, and restore it into a fresh one
    Demo,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Info => {
            println!("workbench-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("workspace: {}", config.workspace_dir.display());
            println!("sessions: {} (*{})", config.sessions_path().display(), config.session_suffix);
            println!("batch: {} (*{})", config.batch_path().display(), config.batch_suffix);
            println!("index: {}", config.index_path().display());
            println!("excluded entity types: {}", config.exclusions.entity_classes.join(", "));
            println!("excluded model classes: {}", config.exclusions.model_classes.join(", "));
        }
        Commands::Inspect { file } => {
            let snapshot = decoder::parse_file(&file).with_context(|| format!("reading {}", file.display()))?;
            print!("{}", snapshot.describe());
        }
        Commands::Check { file } => {
            let snapshot = decoder::parse_file(&file).with_context(|| format!("reading {}", file.display()))?;
            println!(
                "{}: {} entities, {} algorithms, {} windows, {} viewers",
                file.display(),
                snapshot.entities.len(),
                snapshot.algorithms.len(),
                snapshot.window_ids.len(),
                snapshot.viewers.len()
            );
            if snapshot.reference_gaps.is_empty() {
                println!("OK");
            } else {
                for gap in &snapshot.reference_gaps {
                    println!("line {}: <{}> {}", gap.line, gap.element, gap.detail);
                }
                anyhow::bail!("{} dangling reference(s)", snapshot.reference_gaps.len());
            }
        }
        Commands::Escape { text } => println!("{}", escape::encode(&text)),
        Commands::Unescape { text } => println!("{}", escape::decode(&text)),
        Commands::Demo => demo(config)?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(dir) = &cli.workspace {
        config.workspace_dir = dir.clone();
    }
    Ok(config)
}

fn catalog(store: Arc<Datastore>) -> ModelCatalog {
    let mut catalog = ModelCatalog::new(store);
    catalog
        .register("WellModel", "Well", &["name"])
        .register("GridModel", "Grid", &[])
        .register("SurveyModel", "SeismicSurvey3d", &[]);
    catalog
}

/// An empty in-memory workbench whose models live in `store`.
fn sample_workbench(store: Arc<Datastore>) -> (Collaborators, Arc<Workbench>) {
    let preferences = PreferenceStore::new();
    preferences.register_page("Units", "prefs.Units", true);
    let bench = Arc::new(Workbench::with_renderer_classes(["render.Well", "render.Grid"]));
    let live = Collaborators::with_workbench(
        Arc::new(Repository::new()),
        Arc::new(catalog(store)),
        Arc::new(AlgorithmHost::new()),
        Arc::new(preferences),
        bench.clone(),
    );
    (live, bench)
}

fn populate(live: &Collaborators, bench: &Workbench, catalog: &ModelCatalog) -> anyhow::Result<()> {
    let repo = &live.repository;
    repo.add(catalog.load(
        "WellModel",
        "wells/well-1",
        [("name", "Discovery #1"), ("depth", "2750 < 3000")].into_iter().collect(),
    )?);
    repo.add(catalog.load("GridModel", "grids/top", PropertyBag::new())?);
    repo.add(catalog.load("SurveyModel", "surveys/north", PropertyBag::new())?);

    live.preferences
        .apply("prefs.Units", &[("depth", "meters")].into_iter().collect())?;

    let window = bench.open_window(Some(&PerspectiveState {
        id: "map".into(),
        name: "Map".into(),
        class_name: "ui.MapPerspective".into(),
        editor_area_visible: false,
    }))?;
    bench.set_plot_window(&window)?;
    bench.add_viewer_part(
        &window,
        ViewerPartState {
            class_name: "ui.MapPart".into(),
            part_id: "map.view".into(),
            perspective_id: "map".into(),
            unique_id: "part-1".into(),
            viewers: vec![ViewerState {
                title: "Base map".into(),
                class_name: "ui.MapViewer".into(),
                ..ViewerState::default()
            }],
            ..ViewerPartState::default()
        },
    )?;
    let handle = bench
        .find_viewers(&window, "map.view")
        .into_iter()
        .next()
        .context("viewer part has no viewers")?;
    bench.update_layers(
        &handle,
        &[LayerState {
            name: "Wells".into(),
            checked: true,
        }],
    )?;
    let well = repo
        .find_by_unique_id("wells/well-1")
        .context("sample well missing")?;
    bench.add_renderer(&handle, "render.Well", &[("color", "red")].into_iter().collect(), &well)?;

    live.algorithms
        .activate(AlgorithmSpec::new("Contour", "algo.Contour", window).with_parameter("interval", "25"))?;
    Ok(())
}

fn demo(config: SessionConfig) -> anyhow::Result<()> {
    let store = Arc::new(Datastore::with_ids(["wells/well-1", "grids/top", "surveys/north"]));

    let (source, source_bench) = sample_workbench(store.clone());
    populate(&source, &source_bench, &catalog(store.clone()))?;

    let saver = SessionService::new(config.clone(), source);
    let path = saver.save_session_as("demo")?;
    let indexed = saver.save_index()?;
    println!("saved {} ({indexed} entities indexed)", path.display());

    // The grid disappears from the backing store before the restore.
    store.remove("grids/top");

    let (target, _) = sample_workbench(store);
    let restorer = SessionService::new(config, target);
    let progress = LoggingProgress::new();
    let report = restorer.restore_session(&path, RestoreOptions { launching: true }, &progress)?;

    println!("restore phase: {}", report.phase);
    for (unique_id, var_name) in &report.entities {
        println!("  entity {var_name} <- {unique_id}");
    }
    println!("  algorithms: {:?}", report.algorithms);
    println!("  windows: {}", report.windows.len());
    println!("  viewers: {}, renderers: {}", report.viewers, report.renderers);
    for failure in &report.failures {
        let level = match failure {
            RestoreFailure::Validation { .. } | RestoreFailure::Existence { .. } => "stale",
            _ => "failed",
        };
        println!("  {level}: {failure}");
    }
    println!("index now holds {} entities", restorer.index_store()?.len());
    Ok(())
}
