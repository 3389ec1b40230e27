use crate::backup::action::host::Host;
use crate::backup::action::Artifact;
use crate::backup::command::CommandLine;
use crate::backup::context::RunContext;
use crate::backup::result_error::error::{ConfigError, Error};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use derive_more::Display;
use flate2::write::GzEncoder;
use getset::{CopyGetters, Getters};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum DbEngine {
    #[display("mysql")]
    MySql,
    #[display("postgres")]
    Postgres,
    #[display("mongo")]
    Mongo,
}

impl DbEngine {
    pub fn title(&self) -> &'static str {
        match self {
            DbEngine::MySql => "MySql",
            DbEngine::Postgres => "Postgres",
            DbEngine::Mongo => "MongoDb",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DbEngine::MySql | DbEngine::Postgres => "sql.gz",
            DbEngine::Mongo => "mongo.gz",
        }
    }
}

impl FromStr for DbEngine {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(DbEngine::MySql),
            "postgres" => Ok(DbEngine::Postgres),
            "mongo" => Ok(DbEngine::Mongo),
            other => Err(ConfigError::invalid(format!(
                "Unknown database type {other}, expected mysql, postgres or mongo"
            ))),
        }
    }
}

/// A database dumped through its engine's own client tools.
#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct DatabaseSource {
    #[getset(get_copy = "pub")]
    engine: DbEngine,
    #[getset(get = "pub")]
    user: Option<String>,
    /// For postgres, `name#schema` restricts the backup to one schema.
    #[getset(get = "pub")]
    database: String,
    #[getset(get_copy = "pub")]
    port: u16,
}

impl DatabaseSource {
    pub fn new(engine: DbEngine, user: Option<String>, database: impl Into<String>, port: u16) -> Self {
        Self {
            engine,
            user,
            database: database.into(),
            port,
        }
    }

    pub fn describe(&self, host: &Host) -> String {
        format!("{} {} database on {}", self.database, self.engine, host.server())
    }

    fn name_and_schema(&self) -> (&str, Option<&str>) {
        match self.database.split_once('#') {
            Some((name, schema)) => (name, Some(schema)),
            None => (self.database.as_str(), None),
        }
    }

    fn user_args(&self, flag: &str) -> Vec<String> {
        self.user
            .iter()
            .flat_map(|user| [flag.to_string(), user.clone()])
            .collect()
    }

    fn mysql(&self, query: &str) -> CommandLine {
        CommandLine::new("mysql")
            .args(["--batch", "-D", self.database.as_str(), "-b", "-s", "-N", "-P"])
            .arg(self.port.to_string())
            .args(self.user_args("-u"))
            .args(["-e", query])
    }

    fn psql(&self, query: &str) -> CommandLine {
        CommandLine::new("psql")
            .args(["-p".to_string(), self.port.to_string()])
            .args(self.user_args("-U"))
            .args(["-d", self.name_and_schema().0, "-t", "-c", query])
    }

    fn tables_query(&self) -> CommandLine {
        match self.engine {
            DbEngine::MySql => self.mysql("SHOW TABLES"),
            DbEngine::Postgres => {
                let filter = match self.name_and_schema().1 {
                    Some(schema) => format!("schemaname = '{schema}'"),
                    None => "schemaname != 'pg_catalog' AND schemaname != 'information_schema'".to_string(),
                };
                self.psql(&format!(
                    "SELECT schemaname || '#!#' || tablename FROM pg_catalog.pg_tables WHERE {filter};"
                ))
            }
            DbEngine::Mongo => CommandLine::new("mongo")
                .args(["--port".to_string(), self.port.to_string()])
                .args([self.database.as_str(), "--eval", "printjson(db.getCollectionNames())"]),
        }
    }

    /// Query reading one row of `table`, with its display name.
    fn sample_query(&self, table: &str) -> Option<(String, CommandLine)> {
        match self.engine {
            DbEngine::MySql => Some((
                table.to_string(),
                self.mysql(&format!("SELECT * FROM `{table}` LIMIT 1")),
            )),
            DbEngine::Postgres => {
                let parts: Vec<&str> = table.splitn(2, "#!#").collect();
                let quoted = parts.iter().map(|p| format!("\"{p}\"")).collect::<Vec<_>>().join(".");
                Some((
                    parts.join("."),
                    self.psql(&format!("SELECT * FROM {quoted} LIMIT 1")),
                ))
            }
            DbEngine::Mongo => None,
        }
    }

    pub fn check_access(&self, ctx: &RunContext, host: &Host) -> Vec<String> {
        let tables = match ctx.runner().output(&host.wrap(self.tables_query())) {
            Ok(out) => out,
            Err(e) => {
                return vec![format!(
                    "Unable to connect to {} database {} on {}: {e}",
                    self.engine,
                    self.database,
                    host.description()
                )]
            }
        };
        tables
            .lines()
            .map(str::trim)
            .filter(|table| !table.is_empty())
            .filter_map(|table| self.sample_query(table))
            .filter_map(|(table, query)| {
                ctx.runner().output(&host.wrap(query)).err().map(|e| {
                    format!(
                        "Unable to read {} table {}.{table} on {}: {e}",
                        self.engine,
                        self.name_and_schema().0,
                        host.description()
                    )
                })
            })
            .collect()
    }

    fn dump_command(&self) -> CommandLine {
        match self.engine {
            DbEngine::MySql => CommandLine::new("mysqldump")
                .args(self.user_args("-u"))
                .args(["-h", "localhost"])
                .arg(format!("--port={}", self.port))
                .args(["--databases", self.database.as_str()]),
            DbEngine::Postgres => {
                let (name, schema) = self.name_and_schema();
                let dump = CommandLine::new("pg_dump")
                    .args(["-h", "localhost", "-p"])
                    .arg(self.port.to_string())
                    .args(self.user_args("-U"))
                    .args(["-d", name]);
                match schema {
                    Some(schema) => dump.args(["-n", schema]),
                    None => dump,
                }
            }
            DbEngine::Mongo => CommandLine::new("mongodump")
                .args(["--archive", "--gzip", "--host", "localhost"])
                .arg(format!("--port={}", self.port))
                .args(["--db", self.database.as_str()]),
        }
    }

    /// Dumps run on the database host; sql output is gzipped here so that a
    /// failing dump fails the step.
    fn dump_to(&self, ctx: &RunContext, host: &Host, dest: &Path) -> Result<()> {
        let dump = host.wrap(self.dump_command());
        let mut file = BufWriter::new(File::create(dest)?);
        match self.engine {
            DbEngine::Mongo => ctx.runner().stream(&dump, &mut file)?,
            DbEngine::MySql | DbEngine::Postgres => {
                let mut encoder = GzEncoder::new(&mut file, flate2::Compression::default());
                ctx.runner().stream(&dump, &mut encoder)?;
                encoder.finish()?;
            }
        }
        file.flush()?;
        Ok(())
    }

    pub fn fetch(&self, ctx: &RunContext, host: &Host, staging: &Path, full_name: &str) -> Result<Artifact> {
        std::fs::create_dir_all(staging)
            .map_err(Error::from)
            .add_msg(format!("Unable to create staging folder {:?}", staging))?;
        let dest = staging.join(format!("{full_name}.{}", self.engine.extension()));
        self.dump_to(ctx, host, &dest)?;
        tracing::info!("{}:   data fetched", self.describe(host));
        Ok(Artifact::kept(dest, self.engine.extension()))
    }

    pub fn details(&self) -> String {
        format!(
            "database name: {}\ndatabase port: {}\ndatabase user: {}",
            self.database,
            self.port,
            self.user.as_deref().unwrap_or("Default")
        )
    }
}
