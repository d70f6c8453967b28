use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dimlink_core::{Config, QueryResult, WarehouseConfig};
use dimlink_warehouse::{dimension_type_for_name, PostgresClient, TableIdentifier, WarehouseClient};

const DEFAULT_CONFIG: &str = "dimlink.toml";

/// dimlink - PostgreSQL / Redshift warehouse connector
#[derive(Parser)]
#[command(name = "dimlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dimlink.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the warehouse accepts connections and queries
    Test,

    /// Run a SQL query
    Query {
        /// SQL text
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        sql: Option<String>,

        /// Read SQL from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the result as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Also write the result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show column dimension types for tables
    Catalog {
        /// Tables as database.schema.table
        #[arg(required = true)]
        tables: Vec<String>,

        /// Also write the catalog as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the dimension type for warehouse type names
    MapType {
        /// Type names, e.g. "numeric(10,2)" or "timestamp with time zone"
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    match cli.command {
        Commands::MapType { names } => {
            map_type_command(&names);
            Ok(())
        }
        Commands::Test => {
            let client = connect_client(cli.config.as_deref())?;
            test_command(&client).await
        }
        Commands::Query { sql, file, json, output } => {
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read SQL from {}", path.display()))?,
                (None, None) => anyhow::bail!("Provide SQL text or --file"),
            };
            let client = connect_client(cli.config.as_deref())?;
            query_command(&client, &sql, json, output.as_deref()).await
        }
        Commands::Catalog { tables, output } => {
            let client = connect_client(cli.config.as_deref())?;
            catalog_command(&client, &tables, output.as_deref()).await
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flag
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn connect_client(config_path: Option<&Path>) -> Result<PostgresClient> {
    let config = match config_path {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::from_file(Path::new(DEFAULT_CONFIG))?,
        None => {
            tracing::debug!("No config file found, using environment only");
            Config::default()
        }
    };

    let warehouse = resolve_warehouse(config, |key| std::env::var(key).ok())?;

    tracing::debug!(
        warehouse = warehouse.kind.display_name(),
        host = %warehouse.host,
        port = warehouse.port(),
        dbname = %warehouse.dbname,
        "Using warehouse"
    );

    Ok(PostgresClient::new(warehouse)?)
}

/// Warehouse settings from the config file plus `DIMLINK_*` overrides
fn resolve_warehouse<F>(config: Config, lookup: F) -> Result<WarehouseConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warehouse = config
        .warehouse
        .unwrap_or_else(|| WarehouseConfig::new("", "", ""));
    warehouse.apply_env_overrides(lookup)?;

    if warehouse.host.is_empty() {
        anyhow::bail!(
            "No warehouse configured. Add a [warehouse] section to {} or set DIMLINK_HOST.",
            DEFAULT_CONFIG
        );
    }
    if warehouse.user.is_empty() || warehouse.dbname.is_empty() {
        anyhow::bail!("Warehouse user and dbname are required (or set DIMLINK_USER / DIMLINK_DBNAME)");
    }

    Ok(warehouse)
}

async fn test_command(client: &PostgresClient) -> Result<()> {
    let target = format!("{}:{}", client.config().host, client.config().port());

    match client.test().await {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Connection successful:".green(),
                format!("{} at {}", client.name(), target)
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "✗ Connection failed:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn query_command(
    client: &dyn WarehouseClient,
    sql: &str,
    json: bool,
    output: Option<&Path>,
) -> Result<()> {
    let result = client.run_query(sql).await?;
    let result_json = serde_json::to_string_pretty(&result)?;

    if json {
        println!("{}", result_json);
    } else {
        print_table(&result);
    }

    if let Some(path) = output {
        std::fs::write(path, &result_json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("{} {}", "Result written to:".cyan(), path.display());
    }

    Ok(())
}

async fn catalog_command(
    client: &dyn WarehouseClient,
    tables: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let requests = tables
        .iter()
        .map(|t| t.parse::<TableIdentifier>())
        .collect::<Result<Vec<_>, _>>()?;

    let catalog = client.get_catalog(&requests).await?;

    if catalog.is_empty() {
        eprintln!("{}", "⚠ No columns found for the requested tables".yellow());
    }

    let catalog_json = serde_json::to_string_pretty(&catalog)?;
    println!("{}", catalog_json);

    if let Some(path) = output {
        std::fs::write(path, &catalog_json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("{} {}", "Catalog written to:".cyan(), path.display());
    }

    Ok(())
}

fn map_type_command(names: &[String]) {
    let width = names.iter().map(|n| n.len()).max().unwrap_or(0);
    for name in names {
        println!(
            "{:<width$}  {}",
            name,
            dimension_type_for_name(name).to_string().cyan(),
            width = width
        );
    }
}

fn print_table(result: &QueryResult) {
    let table = TextTable::from_result(result);

    println!("{}", table.header.bold());
    println!("{}", table.separator.dimmed());
    for line in &table.lines {
        println!("{}", line);
    }
    println!(
        "{}",
        format!("({} row{})", result.row_count(), if result.row_count() == 1 { "" } else { "s" })
            .dimmed()
    );
}

/// Plain-text rendering of a query result, one line per row
struct TextTable {
    header: String,
    separator: String,
    lines: Vec<String>,
}

impl TextTable {
    fn from_result(result: &QueryResult) -> Self {
        let names = result.field_names();
        let cells: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .map(|name| cell_text(row.get(*name)))
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let join = |values: Vec<&str>| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{:<width$}", value, width = *width))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let header = join(names.clone());
        let separator = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");
        let lines = cells
            .iter()
            .map(|row| join(row.iter().map(String::as_str).collect()))
            .collect();

        Self {
            header,
            separator,
            lines,
        }
    }
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "NULL".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dimlink_core::{DimensionType, FieldMeta, Row, SslMode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_requires_sql_or_file() {
        assert!(Cli::try_parse_from(["dimlink", "query"]).is_err());
        assert!(Cli::try_parse_from(["dimlink", "query", "SELECT 1"]).is_ok());
        assert!(Cli::try_parse_from(["dimlink", "query", "--file", "q.sql"]).is_ok());
        assert!(Cli::try_parse_from(["dimlink", "query", "SELECT 1", "--file", "q.sql"]).is_err());
    }

    #[test]
    fn test_resolve_warehouse_env_only() {
        let env = |key: &str| match key {
            "DIMLINK_HOST" => Some("db.internal".to_string()),
            "DIMLINK_USER" => Some("analyst".to_string()),
            "DIMLINK_DBNAME" => Some("analytics".to_string()),
            "DIMLINK_SSLMODE" => Some("require".to_string()),
            _ => None,
        };

        let warehouse = resolve_warehouse(Config::default(), env).unwrap();
        assert_eq!(warehouse.host, "db.internal");
        assert_eq!(warehouse.ssl_mode().unwrap(), SslMode::Require);
    }

    #[test]
    fn test_resolve_warehouse_overrides_file() {
        let config = Config::from_toml(
            r#"
            [warehouse]
            host = "from-file"
            user = "analyst"
            dbname = "analytics"
            "#,
        )
        .unwrap();

        let warehouse = resolve_warehouse(config, |key| {
            (key == "DIMLINK_PASSWORD").then(|| "hunter2".to_string())
        })
        .unwrap();
        assert_eq!(warehouse.host, "from-file");
        assert_eq!(warehouse.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_resolve_warehouse_missing() {
        assert!(resolve_warehouse(Config::default(), |_| None).is_err());

        let host_only = |key: &str| (key == "DIMLINK_HOST").then(|| "db".to_string());
        assert!(resolve_warehouse(Config::default(), host_only).is_err());
    }

    #[test]
    fn test_text_table() {
        let mut first = Row::new();
        first.insert("id".to_string(), json!(1));
        first.insert("name".to_string(), json!("Ada"));
        let mut second = Row::new();
        second.insert("id".to_string(), json!(10));
        second.insert("name".to_string(), serde_json::Value::Null);

        let result = QueryResult::new(
            vec![
                FieldMeta::new("id", DimensionType::Number, "int4"),
                FieldMeta::new("name", DimensionType::String, "text"),
            ],
            vec![first, second],
        );

        let table = TextTable::from_result(&result);
        assert_eq!(table.header, "id | name");
        assert_eq!(table.separator, "---+-----");
        assert_eq!(table.lines, vec!["1  | Ada", "10 | NULL"]);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(None), "NULL");
        assert_eq!(cell_text(Some(&json!("x"))), "x");
        assert_eq!(cell_text(Some(&json!(2.5))), "2.5");
        assert_eq!(cell_text(Some(&json!([1, 2]))), "[1,2]");
        assert_eq!(cell_text(Some(&json!(true))), "true");
    }
}
