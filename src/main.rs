//! Hierarchy Params CLI
//!
//! Operator front end over the same engine the request layer uses. Every
//! command prints JSON on stdout; failures print a localized error body on
//! stderr and exit non-zero.
//!
//! ## Usage
//!
//! ```bash
//! # Create the data directory, config and database
//! hierarchy-params init
//!
//! # Load nodes and definitions from a fixture
//! hierarchy-params seed fixtures.json
//!
//! # Inspect a node
//! hierarchy-params catalog 100
//! hierarchy-params values 100 7 1 --page 1 --size 10
//!
//! # Configure and distribute
//! hierarchy-params create-value 100 7 1 --amount 10.00
//! hierarchy-params spread 100 --parameter 7
//! hierarchy-params take 101
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hierarchy_params::db::definitions::{self, ParameterInput};
use hierarchy_params::db::hierarchy::{self, NodeInput};
use hierarchy_params::db::models::{
    Category, CreateValueInput, PropertyDefinition, Status, ValuePayload, ValueQuery,
};
use hierarchy_params::services::events::spawn_logging_listener;
use hierarchy_params::{AllowAll, Config, ParamDb, ParamError, ParameterEngine, Principal};

#[derive(Parser, Debug)]
#[command(name = "hierarchy-params")]
#[command(about = "Hierarchical parameter propagation engine")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "HIERARCHY_PARAMS_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(long, env = "HIERARCHY_PARAMS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Number of pool workers (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Operation timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Language for error messages
    #[arg(long, env = "HIERARCHY_PARAMS_LANGUAGE")]
    language: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create data directory, config file and schema
    Init,
    /// Load nodes and definitions from a JSON fixture
    Seed { file: PathBuf },
    /// Grouped catalog of a node
    Catalog { hierarchy_id: i64 },
    /// Property templates of a parameter for a node
    Template { hierarchy_id: i64, parameter_id: i64 },
    /// Page through values of a binding
    Values {
        hierarchy_id: i64,
        parameter_id: i64,
        property_id: i64,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 10)]
        size: i64,
    },
    /// Add a value under (node, parameter, property)
    CreateValue {
        hierarchy_id: i64,
        parameter_id: i64,
        property_id: i64,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        amount_min: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        amount_max: Option<String>,
        #[arg(long = "type")]
        value_type: Option<String>,
        #[arg(long)]
        property_code: Option<String>,
        #[arg(long, value_enum, default_value_t = StatusArg::Active)]
        status: StatusArg,
    },
    /// Change a value's status
    UpdateValue {
        value_id: i64,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Delete a value
    DeleteValue { value_id: i64 },
    /// Enable or disable a binding
    SetStatus {
        hierarchy_id: i64,
        parameter_id: i64,
        property_id: i64,
        #[arg(value_enum)]
        status: StatusArg,
    },
    /// Push pending bindings to descendants
    Spread {
        hierarchy_id: i64,
        #[arg(long)]
        parameter: Option<i64>,
    },
    /// Replace a node's bindings with its parent's
    Take {
        hierarchy_id: i64,
        #[arg(long)]
        parameter: Option<i64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Active,
    Inactive,
}

impl From<StatusArg> for Status {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Status::Active,
            StatusArg::Inactive => Status::Inactive,
        }
    }
}

/// Seed file: externally owned data the engine only reads
#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    nodes: Vec<FixtureNode>,
    #[serde(default)]
    categories: Vec<Category>,
    #[serde(default)]
    parameters: Vec<FixtureParameter>,
    #[serde(default)]
    properties: Vec<PropertyDefinition>,
}

/// Parents must be listed before their children
#[derive(Debug, Deserialize)]
struct FixtureNode {
    id: i64,
    parent_id: Option<i64>,
    node_type_id: i64,
    #[serde(default = "active")]
    status: Status,
}

#[derive(Debug, Deserialize)]
struct FixtureParameter {
    id: i64,
    name: String,
    description: Option<String>,
    category_id: i64,
    applicable_node_types: Vec<i64>,
    #[serde(default = "one")]
    max_properties: i64,
    #[serde(default = "active")]
    status: Status,
}

fn active() -> Status {
    Status::Active
}

fn one() -> i64 {
    1
}

#[derive(Debug, Serialize)]
struct SeedSummary {
    nodes: usize,
    categories: usize,
    parameters: usize,
    properties: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing (stderr, so stdout stays JSON)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hierarchy_params=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let default_path = Config::default().config_path();
            if default_path.exists() {
                Config::load(&default_path)?
            } else {
                Config::default()
            }
        }
    };

    // Apply CLI overrides
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    if let Some(timeout) = args.timeout_ms {
        config.request_timeout_ms = timeout;
    }
    if let Some(language) = &args.language {
        config.default_language = language.clone();
    }
    Ok(config)
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;

    match &args.command {
        Command::Init => {
            let config_path = config.config_path();
            if !config_path.exists() {
                config.save(&config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }
            ParamDb::from_config(&config)?;
            info!(db = %config.db_path().display(), "Database ready");
            return print(&config);
        }
        Command::Seed { file } => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let fixture: Fixture = serde_json::from_str(&content)?;
            let db = ParamDb::from_config(&config)?;
            let summary = seed(&db, fixture)?;
            return print(&summary);
        }
        _ => {}
    }

    let engine = ParameterEngine::from_config(&config, Arc::new(AllowAll))?;
    let _listener = spawn_logging_listener(engine.events());
    let principal = Principal::new(whoami(), "cli");
    let language = config.default_language.clone();

    let result = dispatch(&engine, &principal, args.command).await;
    match result {
        Ok(json) => {
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            let body = engine.error_body(&e, &language);
            eprintln!("{}", serde_json::to_string_pretty(&body)?);
            Err(anyhow::Error::new(e).context("operation failed"))
        }
    }
}

async fn dispatch(
    engine: &ParameterEngine,
    principal: &Principal,
    command: Command,
) -> Result<String, ParamError> {
    match command {
        Command::Catalog { hierarchy_id } => to_json(&engine.get_catalog(principal, hierarchy_id).await?),
        Command::Template { hierarchy_id, parameter_id } => {
            to_json(&engine.get_template(principal, hierarchy_id, parameter_id).await?)
        }
        Command::Values { hierarchy_id, parameter_id, property_id, page, size } => {
            let query = ValueQuery {
                hierarchy_id: Some(hierarchy_id),
                parameter_id: Some(parameter_id),
                property_id: Some(property_id),
                page,
                size,
            };
            to_json(&engine.list_values(principal, query).await?)
        }
        Command::CreateValue {
            hierarchy_id,
            parameter_id,
            property_id,
            label,
            amount_min,
            amount,
            amount_max,
            value_type,
            property_code,
            status,
        } => {
            let input = CreateValueInput {
                hierarchy_id,
                parameter_id,
                property_id,
                status: status.into(),
                property_code,
                payload: ValuePayload {
                    label_parameter: label,
                    amount_min,
                    amount,
                    amount_max,
                    value_type,
                },
            };
            to_json(&engine.create_value(principal, input).await?)
        }
        Command::UpdateValue { value_id, status } => {
            to_json(&engine.update_value_status(principal, value_id, status.into()).await?)
        }
        Command::DeleteValue { value_id } => {
            engine.delete_value(principal, value_id).await?;
            to_json(&serde_json::json!({ "deleted": value_id }))
        }
        Command::SetStatus { hierarchy_id, parameter_id, property_id, status } => to_json(
            &engine
                .set_binding_status(principal, hierarchy_id, parameter_id, property_id, status.into())
                .await?,
        ),
        Command::Spread { hierarchy_id, parameter } => {
            let affected = engine.spread(principal, hierarchy_id, parameter).await?;
            to_json(&serde_json::json!({ "hierarchy_id": hierarchy_id, "affected": affected }))
        }
        Command::Take { hierarchy_id, parameter } => {
            let outcome = engine.take(principal, hierarchy_id, parameter).await?;
            to_json(&serde_json::json!({
                "hierarchy_id": hierarchy_id,
                "parent_id": outcome.parent_id,
                "bindings": outcome.bindings,
                "values": outcome.values,
            }))
        }
        Command::Init | Command::Seed { .. } => Err(ParamError::Internal("handled before dispatch".into())),
    }
}

fn seed(db: &ParamDb, fixture: Fixture) -> Result<SeedSummary, ParamError> {
    let summary = SeedSummary {
        nodes: fixture.nodes.len(),
        categories: fixture.categories.len(),
        parameters: fixture.parameters.len(),
        properties: fixture.properties.len(),
    };

    db.write_tx(|tx| {
        for node in &fixture.nodes {
            hierarchy::upsert_node(
                tx,
                &NodeInput {
                    id: node.id,
                    parent_id: node.parent_id,
                    node_type_id: node.node_type_id,
                    status: node.status,
                },
            )?;
        }
        for category in &fixture.categories {
            definitions::upsert_category(tx, category)?;
        }
        for parameter in &fixture.parameters {
            definitions::upsert_parameter(
                tx,
                &ParameterInput {
                    id: parameter.id,
                    name: parameter.name.clone(),
                    description: parameter.description.clone(),
                    category_id: parameter.category_id,
                    applicable_node_types: parameter.applicable_node_types.clone(),
                    max_properties: parameter.max_properties,
                    status: parameter.status,
                },
            )?;
        }
        for property in &fixture.properties {
            definitions::upsert_property(tx, property)?;
        }
        Ok(())
    })?;

    info!(
        nodes = summary.nodes,
        parameters = summary.parameters,
        properties = summary.properties,
        "Fixture loaded"
    );
    Ok(summary)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ParamError> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}
