//! The user facing commands, run over a loaded configuration.

use crate::backup::action::Action;
use crate::backup::config::BackupConfig;
use crate::backup::context::RunContext;
use crate::backup::function_path;
use crate::backup::interrupt::Interrupt;
use crate::backup::report::Report;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::selector::select;
use crate::backup::storage::{ArchiveStore, Storage};
use function_name::named;
use itertools::Itertools;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{error, info, warn};

pub struct Orchestrator {
    config: BackupConfig,
    ctx: RunContext,
    interrupt: Interrupt,
}

impl Orchestrator {
    pub fn new(config: BackupConfig, ctx: RunContext, interrupt: Interrupt) -> Self {
        Self {
            config,
            ctx,
            interrupt,
        }
    }

    fn select<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<&Action>> {
        select(self.config.actions(), targets, true)
    }

    /// Backs up every selected action then delivers the report, even when
    /// interrupted halfway.
    pub fn run<S: AsRef<str>>(&self, targets: &[S]) -> Result<Report> {
        let actions = self.select(targets)?;
        let mut report = Report::new();
        for action in actions {
            if self.interrupt.is_requested() {
                warn!("Backup aborted. Sending reports...");
                break;
            }
            self.backup(action, &mut report);
        }
        self.send_report(&report);
        Ok(report)
    }

    /// Cleaning then saving; either failure is one issue for the action.
    fn backup(&self, action: &Action, report: &mut Report) {
        let descr = action.describe();
        let saved = self
            .clean_action(action)
            .and_then(|_| action.run_backup(&self.ctx));
        match saved {
            Ok(()) => report.add_success(
                action.server_name(),
                format!("{descr} have been successfully backed up"),
            ),
            Err(e) => {
                error!("Unable to save data for {descr}: {e}");
                report.add_issue(
                    action.server_name(),
                    format!("Unable to save data for {descr}: {e}"),
                );
            }
        }
    }

    fn send_report(&self, report: &Report) {
        for target in self.config.report_targets() {
            if let Err(e) = target.deliver(report) {
                error!("Unable to send backup report: {e}");
            }
        }
    }

    /// Description of the selected actions and of every report target.
    pub fn config<S: AsRef<str>>(&self, targets: &[S]) -> Result<String> {
        let actions = self.select(targets)?;
        let shown = self.config.show(&actions);
        info!("{shown}");
        Ok(shown)
    }

    /// Probes source and destination access of the selected actions;
    /// returns the number of problems found.
    #[named]
    pub fn check<S: AsRef<str>>(&self, targets: &[S]) -> Result<usize> {
        let actions = self.select(targets)?;
        let pool = ThreadPoolBuilder::new()
            .build()
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        let problems: Vec<Vec<String>> = pool.install(|| {
            actions
                .par_iter()
                .map(|action| {
                    let mut problems = action.check_src_access(&self.ctx);
                    problems.extend(action.check_dest_access(&self.ctx));
                    problems
                })
                .collect()
        });

        let mut count = 0;
        let by_server = actions
            .iter()
            .zip(problems)
            .filter(|(_, problems)| !problems.is_empty())
            .into_group_map_by(|(action, _)| action.server_name().to_string());
        for server in self.config.servers() {
            let Some(failures) = by_server.get(server) else {
                continue;
            };
            let lines = failures
                .iter()
                .flat_map(|(action, problems)| {
                    problems
                        .iter()
                        .map(move |problem| format!("{}: {problem}", action.name()))
                })
                .collect_vec();
            count += lines.len();
            error!("{server}:\n{}", indent::indent_all_with("  ", lines.join("\n")).trim_end());
        }

        if count > 0 {
            error!("{count} error detected.");
        } else {
            info!("Connectivity check completed successfully.");
        }
        Ok(count)
    }

    /// Sends a single warning through every report target.
    pub fn check_reports(&self) -> Report {
        let mut report = Report::new();
        report.add_warning("local", "Backup a test");
        self.send_report(&report);
        info!("Test report sent to {} targets", self.config.report_targets().len());
        report
    }

    /// Archives of the selected actions, marked when out of retention.
    pub fn list<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<String>> {
        let mut lines = vec![];
        for action in self.select(targets)? {
            for storage in action.storages() {
                let descr = storage.describe();
                for archive in storage.list_archives(&self.ctx, Some(&action.full_name()))? {
                    let line = if storage.should_keep(&self.ctx, &archive) {
                        format!("{archive}: {descr}")
                    } else {
                        format!("{archive} [old]: {descr}")
                    };
                    info!("{line}");
                    lines.push(line);
                }
            }
        }
        Ok(lines)
    }

    /// Removes the out of retention archives of the selected actions.
    pub fn clean<S: AsRef<str>>(&self, targets: &[S]) -> Result<usize> {
        let (counts, errors): (Vec<usize>, Vec<Error>) = self
            .select(targets)?
            .into_iter()
            .map(|action| self.clean_action(action))
            .partition_result();
        convert_error_vec(errors)?;
        Ok(counts.into_iter().sum())
    }

    /// Every storage is cleaned, failures are gathered.
    fn clean_action(&self, action: &Action) -> Result<usize> {
        let full_name = action.full_name();
        let (counts, errors): (Vec<usize>, Vec<Error>) = action
            .storages()
            .iter()
            .map(|storage| {
                self.clean_storage(storage, &full_name)
                    .add_msg(format!("Unable to clean {}", storage.describe()))
            })
            .partition_result();
        convert_error_vec(errors)?;
        Ok(counts.into_iter().sum())
    }

    fn clean_storage(&self, storage: &Storage, full_name: &str) -> Result<usize> {
        let mut removed = 0;
        for archive in storage.list_archives(&self.ctx, Some(full_name))? {
            if !storage.should_keep(&self.ctx, &archive) {
                storage.remove(&self.ctx, &archive)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
