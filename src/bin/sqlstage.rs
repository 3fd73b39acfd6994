//! Command-line front end: stage CSV files into a database and query them.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlstage::config::{StageConfig, CONFIG_ENV};
use sqlstage::logging::init_logging;
use sqlstage::table::temporal::{format_date, format_timestamp};
use sqlstage::{
    insert_with_options, run, run_streaming, Argument, CsvChunkEncoder, EncoderConfig, Engine,
    ExistencePolicy, QueryOptions, QueryRequest, QueryResult, SchemaTarget, SqliteEngine,
    TabularDataset, Value,
};

#[derive(Parser, Debug)]
#[command(
    name = "sqlstage",
    version,
    about = "Stage CSV files as relations, run SQL against them, clean up",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = CONFIG_ENV,
        value_name = "FILE",
        help = "Config file (defaults to <config dir>/sqlstage/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter, e.g. info or sqlstage::stage=debug"
    )]
    log: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Csv,
        help = "Result output format"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Stage tables, run a statement, print the result")]
    Query(QueryCmd),
    #[command(about = "Append tables into existing relations")]
    Insert(InsertCmd),
}

#[derive(Args, Debug)]
struct TargetArgs {
    #[arg(
        long,
        value_name = "DB",
        help = "SQLite database file, or a postgres:// URL when built with postgres support"
    )]
    db: String,

    #[arg(
        long = "table",
        value_name = "NAME=FILE",
        value_parser = parse_table_arg,
        help = "CSV file staged as NAME; repeatable"
    )]
    tables: Vec<(String, PathBuf)>,
}

#[derive(Args, Debug)]
struct QueryCmd {
    #[command(flatten)]
    target: TargetArgs,

    #[arg(value_name = "SQL")]
    sql: String,

    #[arg(long = "param", value_name = "VALUE", help = "Positional parameter; repeatable")]
    params: Vec<String>,

    #[arg(long, value_name = "SCHEMA", help = "Schema name, 'default', or 'session-temporary'")]
    schema: Option<String>,

    #[arg(long = "if-exists", value_name = "POLICY", help = "fail, replace, or append")]
    if_exists: Option<String>,

    #[arg(long, help = "Keep staged relations after the query")]
    keep: bool,

    #[arg(long, help = "Fail instead of creating missing relations")]
    no_create: bool,

    #[arg(long, help = "Stage the row position as a leading index column")]
    index: bool,

    #[arg(long, value_name = "LABEL", help = "Label of the staged index column")]
    index_label: Option<String>,

    #[arg(long, value_name = "COLUMN", help = "Result column used as the row index")]
    index_column: Option<String>,

    #[arg(long = "parse-dates", value_name = "COLUMN", help = "Result column parsed as timestamps; repeatable")]
    parse_dates: Vec<String>,

    #[arg(long, value_name = "ROWS", help = "Stream the result in chunks of ROWS rows")]
    chunk_size: Option<usize>,

    #[arg(long, help = "Keep decimal result columns as decimals")]
    no_coerce_float: bool,

    #[arg(long, help = "Use row-wise inserts even when bulk copy is available")]
    no_fast_path: bool,
}

#[derive(Args, Debug)]
struct InsertCmd {
    #[command(flatten)]
    target: TargetArgs,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = StageConfig::load(cli.config.as_deref())?;
    let filter = cli.log.as_deref().unwrap_or(&config.logging.filter);
    init_logging(filter)?;

    match cli.command {
        Command::Query(cmd) => {
            let engine = open_engine(&cmd.target.db)?;
            let datasets = load_tables(&cmd.target.tables)?;
            let options = query_options(&cmd, config.query_options())?;
            let request = datasets
                .iter()
                .fold(QueryRequest::new(cmd.sql.as_str()), |req, ds| req.dataset(ds))
                .params(cmd.params.iter().map(|raw| parse_param(raw)))
                .options(options);
            emit_result(engine.as_ref(), &request, cli.format)?;
        }
        Command::Insert(cmd) => {
            let engine = open_engine(&cmd.target.db)?;
            let datasets = load_tables(&cmd.target.tables)?;
            if datasets.is_empty() {
                return Err("insert needs at least one --table".into());
            }
            let rows: usize = datasets.iter().map(TabularDataset::num_rows).sum();
            insert_with_options(
                engine.as_ref(),
                datasets.iter().map(Argument::Dataset),
                config.query_options(),
            )?;
            eprintln!("inserted {rows} rows into {} relations", datasets.len());
        }
    }
    Ok(())
}

fn parse_table_arg(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=FILE, got '{raw}'")),
    }
}

fn parse_param(raw: &str) -> Value {
    if let Ok(v) = raw.parse::<i64>() {
        Value::Int(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        Value::Float(v)
    } else {
        Value::Text(raw.to_string())
    }
}

fn open_engine(db: &str) -> Result<Box<dyn Engine>, Box<dyn Error>> {
    if db.starts_with("postgres://") || db.starts_with("postgresql://") {
        return open_postgres(db);
    }
    Ok(Box::new(SqliteEngine::open(db)))
}

#[cfg(feature = "postgres")]
fn open_postgres(url: &str) -> Result<Box<dyn Engine>, Box<dyn Error>> {
    Ok(Box::new(sqlstage::PostgresEngine::new(url)))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_url: &str) -> Result<Box<dyn Engine>, Box<dyn Error>> {
    Err("this build has no postgres support; rebuild with --features postgres".into())
}

fn load_tables(tables: &[(String, PathBuf)]) -> Result<Vec<TabularDataset>, Box<dyn Error>> {
    tables
        .iter()
        .map(|(name, path)| {
            TabularDataset::from_csv_path(path)
                .map(|ds| ds.with_name(name.as_str()))
                .map_err(|err| format!("failed to read {}: {err}", path.display()).into())
        })
        .collect()
}

fn query_options(cmd: &QueryCmd, mut options: QueryOptions) -> Result<QueryOptions, Box<dyn Error>> {
    if let Some(schema) = &cmd.schema {
        options.schema = Some(schema.parse::<SchemaTarget>()?);
    }
    if let Some(policy) = &cmd.if_exists {
        options.existence_policy = policy.parse::<ExistencePolicy>()?;
    }
    options.keep |= cmd.keep;
    options.create &= !cmd.no_create;
    options.index |= cmd.index;
    if cmd.index_label.is_some() {
        options.index_label = cmd.index_label.clone();
    }
    options.index_column = cmd.index_column.clone();
    options.parse_dates = cmd.parse_dates.clone();
    if cmd.chunk_size.is_some() {
        options.chunk_size = cmd.chunk_size;
    }
    options.coerce_float &= !cmd.no_coerce_float;
    options.fast_path &= !cmd.no_fast_path;
    Ok(options)
}

fn emit_result(
    engine: &dyn Engine,
    request: &QueryRequest<'_>,
    format: OutputFormat,
) -> Result<(), Box<dyn Error>> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if request.current_options().chunk_size.is_some() {
        let mut first = true;
        let mut write_error = None;
        run_streaming(engine, request, |chunk| {
            match write_dataset(&mut out, &chunk, format, first) {
                Ok(()) => {
                    first = false;
                    ControlFlow::Continue(())
                }
                Err(err) => {
                    write_error = Some(err);
                    ControlFlow::Break(())
                }
            }
        })?;
        if let Some(err) = write_error {
            return Err(err);
        }
    } else {
        match run(engine, request)? {
            QueryResult::Dataset(dataset) => write_dataset(&mut out, &dataset, format, true)?,
            QueryResult::Chunks(chunks) => {
                for (i, chunk) in chunks.iter().enumerate() {
                    write_dataset(&mut out, chunk, format, i == 0)?;
                }
            }
            QueryResult::NoResult => {}
        }
    }
    out.flush()?;
    Ok(())
}

fn write_dataset(
    out: &mut impl Write,
    dataset: &TabularDataset,
    format: OutputFormat,
    first: bool,
) -> Result<(), Box<dyn Error>> {
    match format {
        OutputFormat::Csv => {
            let config = EncoderConfig {
                header: first,
                include_index: dataset.index().is_some(),
                ..EncoderConfig::default()
            };
            for chunk in CsvChunkEncoder::new(dataset, config) {
                out.write_all(&chunk?)?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &dataset_json(dataset))?;
            out.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// `{"columns": [...], "rows": [[...], ...]}`, index first when present.
fn dataset_json(dataset: &TabularDataset) -> serde_json::Value {
    let with_index = dataset.index().is_some();
    let columns: Vec<serde_json::Value> = dataset
        .staging_fields(with_index, None)
        .into_iter()
        .map(|f| serde_json::Value::String(f.name))
        .collect();
    let rows: Vec<serde_json::Value> = dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut cells = Vec::with_capacity(row.len() + 1);
            if with_index {
                cells.push(json_cell(&dataset.index_value(i)));
            }
            cells.extend(row.iter().map(json_cell));
            serde_json::Value::Array(cells)
        })
        .collect();
    serde_json::json!({ "columns": columns, "rows": rows })
}

fn json_cell(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::Bool(*v),
        Value::Int(v) => Json::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(value.to_string())),
        Value::Text(v) | Value::Decimal(v) => Json::String(v.clone()),
        Value::Bytes(_) => Json::String(value.to_string()),
        Value::Date(v) => Json::String(format_date(*v)),
        Value::Timestamp(v) => Json::String(format_timestamp(*v)),
    }
}
