//! Command-line front end: index entity documents, compile queries to SQL
//! and run them against a SQLite index.
#![forbid(unsafe_code)]

mod ui;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use entity_query::config::EngineConfig;
use entity_query::logging::init_logging;
use entity_query::query::QuerySpec;
use entity_query::sql::{
    CompiledQuery, Dialect, IndexingState, ResultShape, SqlEntityFinder, SqlIndexer,
    SqlQueryParser,
};
use entity_query::{Error, Query, Result, TypeModel, Value};

use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "entity-query",
    version,
    about = "Compile entity queries to SQL and run them against a SQLite index",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "Config file (else $ENTITY_QUERY_CONFIG, else the per-user config)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Schema prefix of index tables")]
    schema: Option<String>,

    #[arg(long, global = true, value_enum, help = "Compound rendering dialect")]
    dialect: Option<DialectArg>,

    #[arg(
        long,
        global = true,
        value_name = "DIRECTIVE",
        help = "tracing filter, e.g. entity_query::sql=debug"
    )]
    log_filter: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(long, global = true, help = "Disable colored output")]
    plain: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ModelArgs {
    #[arg(long, value_name = "FILE", help = "TOML type model")]
    model: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(flatten)]
    model: ModelArgs,

    #[arg(long, value_name = "FILE", help = "JSON query description")]
    query: PathBuf,
}

#[derive(Args, Debug)]
struct DatabaseArgs {
    #[arg(long, value_name = "FILE", help = "SQLite index database")]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create index tables and write entities from a JSON document.
    Index {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        database: DatabaseArgs,
        #[arg(long, value_name = "FILE", help = "JSON entity document")]
        data: PathBuf,
    },
    /// Print the SQL a query compiles to, with its bind values.
    Compile {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long, help = "Compile the counting form")]
        count: bool,
    },
    /// Print identities of matching entities.
    Find {
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        database: DatabaseArgs,
        #[arg(long, help = "Print only the first match")]
        one: bool,
    },
    /// Print the number of matching entities.
    Count {
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        database: DatabaseArgs,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DialectArg {
    Ansi,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(value: DialectArg) -> Self {
        match value {
            DialectArg::Ansi => Dialect::Ansi,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompileReport<'a> {
    sql: &'a str,
    values: &'a [Value],
    shape: &'static str,
    first_result: Option<u64>,
}

impl<'a> From<&'a CompiledQuery> for CompileReport<'a> {
    fn from(compiled: &'a CompiledQuery) -> Self {
        let (shape, first_result) = match compiled.shape {
            ResultShape::Count => ("count", None),
            ResultShape::Scrollable { first_result } => ("scrollable", Some(first_result)),
            ResultShape::ForwardOnly => ("forwardOnly", None),
        };
        CompileReport {
            sql: &compiled.sql,
            values: &compiled.values,
            shape,
            first_result,
        }
    }
}

#[derive(Serialize)]
struct FindReport {
    identities: Vec<String>,
}

#[derive(Serialize)]
struct CountReport {
    count: u64,
}

#[derive(Serialize)]
struct IndexReport {
    indexed: usize,
}

/// Settings after layering command-line overrides on the config file.
struct Session {
    config: EngineConfig,
    ui: Ui,
    format: OutputFormat,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let mut config = EngineConfig::load(cli.config.as_deref())?;
        if let Some(schema) = &cli.schema {
            config.schema = schema.clone();
        }
        if let Some(dialect) = cli.dialect {
            config.dialect = dialect.into();
        }
        if let Some(filter) = &cli.log_filter {
            config.log_filter = filter.clone();
        }
        init_logging(&config.log_filter)?;
        let theme = if cli.plain { Theme::Plain } else { Theme::Auto };
        Ok(Session {
            config,
            ui: Ui::new(theme),
            format: cli.format,
        })
    }

    fn model(&self, args: &ModelArgs) -> Result<TypeModel> {
        let path = args
            .model
            .as_deref()
            .or(self.config.model.as_deref())
            .ok_or_else(|| Error::InvalidArgument("no --model given and none configured".into()))?;
        Ok(TypeModel::from_toml(&fs::read_to_string(path)?)?)
    }

    fn database(&self, args: &DatabaseArgs) -> Result<Connection> {
        let path = args
            .database
            .as_deref()
            .or(self.config.database.as_deref())
            .ok_or_else(|| {
                Error::InvalidArgument("no --database given and none configured".into())
            })?;
        info!(path = %path.display(), "opening index database");
        Ok(Connection::open(path)?)
    }

    fn layout(&self, model: &TypeModel) -> Arc<IndexingState> {
        Arc::new(IndexingState::from_model(model, self.config.schema.as_str()))
    }

    fn parser(&self, model: &TypeModel) -> SqlQueryParser {
        SqlQueryParser::new(self.layout(model), self.config.dialect)
    }

    fn query(&self, args: &QueryArgs) -> Result<(TypeModel, Query)> {
        let model = self.model(&args.model)?;
        let query = read_query(&args.query, &model)?;
        Ok((model, query))
    }

    fn finder(&self, args: &QueryArgs, database: &DatabaseArgs) -> Result<(SqlEntityFinder, Query)> {
        let (model, query) = self.query(args)?;
        let connection = self.database(database)?;
        let finder = SqlEntityFinder::new(Arc::new(Mutex::new(connection)), self.parser(&model));
        Ok((finder, query))
    }

    fn emit<T, F>(&self, value: &T, printer: F) -> Result<()>
    where
        T: Serialize,
        F: Fn(&Ui),
    {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(value)
                    .map_err(|e| Error::InvalidArgument(format!("cannot encode output: {e}")))?;
                println!("{json}");
            }
            OutputFormat::Text => printer(&self.ui),
        }
        Ok(())
    }
}

fn read_query(path: &Path, model: &TypeModel) -> Result<Query> {
    let text = fs::read_to_string(path)?;
    Ok(QuerySpec::from_json(&text)?.into_query(model)?)
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error[{}]: {err}", err.code());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let session = Session::open(&cli)?;

    match &cli.command {
        Command::Index {
            model,
            database,
            data,
        } => {
            let model = session.model(model)?;
            let entities = model.load_entities(&fs::read_to_string(data)?)?;
            let mut connection = session.database(database)?;
            let indexer = SqlIndexer::new(session.layout(&model));
            indexer.create_schema(&connection)?;
            let indexed = indexer.index(&mut connection, &entities)?;
            session.emit(&IndexReport { indexed }, |ui| {
                ui.success(&format!("indexed {indexed} entities"))
            })?;
        }
        Command::Compile { query, count } => {
            let (model, query) = session.query(query)?;
            let compiled = session.parser(&model).compile(&query, *count)?;
            let report = CompileReport::from(&compiled);
            session.emit(&report, |ui| {
                ui.sql(&compiled.sql);
                ui.section(
                    "Binds",
                    compiled
                        .values
                        .iter()
                        .enumerate()
                        .map(|(i, value)| (format!("?{}", i + 1), value)),
                );
                ui.section("Shape", [("kind", report.shape)]);
            })?;
        }
        Command::Find {
            query,
            database,
            one,
        } => {
            let (finder, query) = session.finder(query, database)?;
            let found: Vec<_> = if *one {
                query.find_one(&finder)?.into_iter().collect()
            } else {
                query.find(&finder)?
            };
            let identities: Vec<String> = found
                .iter()
                .map(|reference| reference.identity().to_owned())
                .collect();
            session.emit(
                &FindReport {
                    identities: identities.clone(),
                },
                |ui| ui.identities(identities.iter().cloned()),
            )?;
        }
        Command::Count { query, database } => {
            let (finder, query) = session.finder(query, database)?;
            let count = query.count(&finder)?;
            session.emit(&CountReport { count }, |_| println!("{count}"))?;
        }
    }
    Ok(())
}
