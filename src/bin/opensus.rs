//! OpenSUS CLI: load decoded files into warehouses and build flow networks.
//!
//! Usage:
//!   opensus ingest [--input dir] [--only RD] [--warehouse-dir dir]
//!   opensus network --kind l2l --locations refs.json --start 2020-01-01 --end 2020-12-31
//!   opensus tables
//!   opensus count <warehouse> [table]

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use opensus::flow::{admissions_in, equipment_in_month, service_records};
use opensus::{
    FacilityTable, FlowAggregator, FlowKind, FlowSet, Ingestor, JsonLinesSource, LocationTable,
    NetworkBuilder, NodeKind, OpenStore, References, RunConfig, SourceKind, SqliteTableStore,
    StratifyMode, TableStore, Warehouse,
};
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "opensus",
    version,
    about = "Health-record warehouses and patient-flow networks"
)]
struct Cli {
    /// YAML run configuration; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the warehouse databases
    #[arg(long, global = true)]
    warehouse_dir: Option<PathBuf>,
    /// Report per-file and per-batch progress
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load decoded files into their warehouses
    Ingest {
        /// Directory of decoded files
        #[arg(long)]
        input: Option<PathBuf>,
        /// Extension of decoded files
        #[arg(long)]
        ext: Option<String>,
        /// Only load files of this type code (RD, SP, ST, DO, ...)
        #[arg(long)]
        only: Option<String>,
        /// Rows per insert transaction
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Aggregate flows and write the network as JSON
    Network {
        /// Network kind (l2l, l2f, f2c, f2s, e2f, e2l or the full name)
        #[arg(long)]
        kind: String,
        /// JSON array of municipalities
        #[arg(long)]
        locations: Option<PathBuf>,
        /// First admission date of the window
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last admission date of the window (inclusive)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Competence month for equipment networks
        #[arg(long)]
        reference_month: Option<NaiveDate>,
        /// none, diagnosis, chapters or procedure
        #[arg(long)]
        stratify: Option<String>,
        /// Code truncation depth for diagnosis or procedure strata
        #[arg(long)]
        depth: Option<usize>,
        /// Keep (true) or drop (false) self-edges
        #[arg(long)]
        self_edges: Option<bool>,
        /// Aggregate service lines instead of admissions
        #[arg(long)]
        services: bool,
        /// Output file; stdout when absent
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List warehouses and their tables
    Tables,
    /// Count rows in a warehouse
    Count {
        /// admissions, establishments or mortality
        warehouse: String,
        /// A single table; every table when absent
        table: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::INFO } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn open_store(config: &RunConfig, warehouse: Warehouse) -> Result<SqliteTableStore, String> {
    let path = config.warehouse_path(warehouse);
    SqliteTableStore::open(&path, warehouse)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))
}

fn cmd_ingest(config: &RunConfig) -> i32 {
    let mut loaded = 0;
    let mut skipped = 0;
    let mut inserted = 0;

    for warehouse in Warehouse::ALL {
        let source = JsonLinesSource::scan(
            &config.source.input_dir,
            &config.source.extension,
            config.source_type,
        )
        .for_warehouse(warehouse);
        if source.is_empty() {
            continue;
        }

        let store = match open_store(config, warehouse) {
            Ok(store) => store,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        let ingestor = Ingestor::new(&store).with_batch_size(config.batch_size);
        match ingestor.ingest_all(source) {
            Ok(report) => {
                loaded += report.loaded.len();
                skipped += report.skipped.len();
                inserted += report.rows_inserted();
                for failure in &report.skipped {
                    eprintln!(
                        "Skipped {} at stage {}: {}",
                        failure.file, failure.stage, failure.error
                    );
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }

    if config.verbose {
        println!("Loaded {} files ({} rows), skipped {}", loaded, inserted, skipped);
    }
    0
}

struct NetworkRequest {
    kind: FlowKind,
    locations: Option<PathBuf>,
    reference_month: Option<NaiveDate>,
    services: bool,
    out: Option<PathBuf>,
}

fn load_references(config: &RunConfig, request: &NetworkRequest) -> Result<References, String> {
    let kind = request.kind;
    let uses = |node: NodeKind| kind.origin() == node || kind.destination() == node;

    let locations = if uses(NodeKind::Location) {
        let path = request
            .locations
            .as_deref()
            .ok_or_else(|| format!("{} networks need --locations", kind))?;
        LocationTable::from_json_file(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?
    } else {
        LocationTable::default()
    };

    // Equipment-to-location flows reach municipalities through facilities
    let facilities = if uses(NodeKind::Facility) || kind == FlowKind::EquipmentToLocation {
        let store = open_store(config, Warehouse::Establishments)?;
        FacilityTable::from_store(&store).map_err(|e| e.to_string())?
    } else {
        FacilityTable::default()
    };

    Ok(References::new(locations, facilities))
}

fn aggregate(
    config: &RunConfig,
    request: &NetworkRequest,
    references: &References,
) -> Result<FlowSet, String> {
    let options = config.flow_options().map_err(|e| e.to_string())?;
    let aggregator = FlowAggregator::new(request.kind, references).with_options(options);

    match request.kind {
        FlowKind::EquipmentToFacility | FlowKind::EquipmentToLocation => {
            let month = request
                .reference_month
                .or(config.window_start)
                .ok_or("equipment networks need --reference-month")?;
            let store = open_store(config, Warehouse::Establishments)?;
            let counts = equipment_in_month(&store, month).map_err(|e| e.to_string())?;
            aggregator.equipment(&counts).map_err(|e| e.to_string())
        }
        kind => {
            let window = options.window.ok_or("admission networks need --start and --end")?;
            let store = open_store(config, Warehouse::Admissions)?;
            let admissions = admissions_in(&store, &window).map_err(|e| e.to_string())?;
            if request.services || kind == FlowKind::FacilityToService {
                let services = service_records(&store, &admissions).map_err(|e| e.to_string())?;
                aggregator.services(&services).map_err(|e| e.to_string())
            } else {
                aggregator.admissions(&admissions).map_err(|e| e.to_string())
            }
        }
    }
}

fn cmd_network(config: &RunConfig, request: &NetworkRequest) -> i32 {
    let result = load_references(config, request).and_then(|references| {
        let flows = aggregate(config, request, &references)?;
        NetworkBuilder::new(request.kind, &references)
            .build(&flows)
            .map_err(|e| e.to_string())
    });
    let graph = match result {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let written = match &request.out {
        Some(path) => graph.write_json(path).map(|_| {
            if config.verbose {
                println!(
                    "Wrote {} nodes and {} edges to {}",
                    graph.node_count(),
                    graph.edge_count(),
                    path.display()
                );
            }
        }),
        None => graph.to_json().map(|json| println!("{}", json)),
    };
    match written {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_tables() -> i32 {
    println!("{:<16}  {:<28}  {:>7}  {:<20}", "WAREHOUSE", "TABLE", "COLUMNS", "KEY");
    println!("{}", "-".repeat(78));
    for warehouse in Warehouse::ALL {
        for table in warehouse.tables() {
            println!(
                "{:<16}  {:<28}  {:>7}  {:<20}",
                warehouse.name(),
                table.name,
                table.fields.len(),
                table.primary_key
            );
        }
    }
    0
}

fn cmd_count(config: &RunConfig, warehouse: &str, table: Option<&str>) -> i32 {
    let warehouse: Warehouse = match warehouse.parse() {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let store = match open_store(config, warehouse) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let names: Vec<&str> = match table {
        Some(name) => vec![name],
        None => warehouse.tables().iter().map(|t| t.name).collect(),
    };
    for name in names {
        match store.count(name) {
            Ok(count) => println!("{:<28}  {:>10}", name, count),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    0
}

fn load_config(path: Option<&Path>) -> Result<RunConfig, String> {
    RunConfig::load_or_default(path).map_err(|e| format!("Failed to load configuration: {}", e))
}

fn main() {
    let cli = Cli::parse();
    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    config.verbose |= cli.verbose;
    if let Some(dir) = cli.warehouse_dir {
        config.warehouse_dir = dir;
    }
    init_logging(config.verbose);

    let code = match cli.command {
        Commands::Ingest { input, ext, only, batch_size } => {
            if let Some(input) = input {
                config.source.input_dir = input;
            }
            if let Some(ext) = ext {
                config.source.extension = ext;
            }
            if let Some(size) = batch_size {
                config.batch_size = size;
            }
            match only.map(|code| code.parse::<SourceKind>()).transpose() {
                Ok(Some(kind)) => {
                    config.source_type = Some(kind);
                    cmd_ingest(&config)
                }
                Ok(None) => cmd_ingest(&config),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        Commands::Network {
            kind,
            locations,
            start,
            end,
            reference_month,
            stratify,
            depth,
            self_edges,
            services,
            out,
        } => {
            let kind = match kind.parse::<FlowKind>() {
                Ok(kind) => kind,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            config.window_start = start.or(config.window_start);
            config.window_end = end.or(config.window_end);
            config.self_edges = self_edges.or(config.self_edges);
            if let Some(mode) = stratify {
                match mode.parse::<StratifyMode>() {
                    Ok(mode) => config.stratify = mode,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            if let Some(depth) = depth {
                match config.stratify {
                    StratifyMode::Procedure => config.proc_depth = depth,
                    _ => config.diag_depth = depth,
                }
            }
            let request = NetworkRequest { kind, locations, reference_month, services, out };
            cmd_network(&config, &request)
        }
        Commands::Tables => cmd_tables(),
        Commands::Count { warehouse, table } => cmd_count(&config, &warehouse, table.as_deref()),
    };
    std::process::exit(code);
}
