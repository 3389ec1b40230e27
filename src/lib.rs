//! # backuper
//!
//! Backup orchestration for a fleet of servers.
//!
//! ## Features
//!
//! - **Declarative configuration**: YAML with includes and deep-merge of common settings
//! - **Multiple sources**: remote folders through rsync, MySQL, PostgreSQL and MongoDB dumps
//! - **Multiple storages**: local history folders and AWS Glacier vaults
//! - **Retention management**: day, week, month and year tiers per storage
//! - **Reports**: email, syslog, file and webhook delivery of each run outcome
//! - **Checks**: parallel probing of every source and destination
//!
//! ## Quick Start
//!
//! ```no_run
//! use backuper::backup::config::BackupConfig;
//! use backuper::backup::context::RunContext;
//! use backuper::backup::interrupt::Interrupt;
//! use backuper::backup::orchestrator::Orchestrator;
//!
//! let config = BackupConfig::load("/etc/backuper/backup.config")?;
//! let orchestrator = Orchestrator::new(config, RunContext::system(), Interrupt::new());
//! let report = orchestrator.run(&["web*"])?;
//! println!("{} errors", report.issue_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
