//! Resolution of user supplied target identifiers.
//!
//! An identifier is either one glob matched against every name an action is
//! known by, or `server:target` where the first glob selects the server (or
//! prefix) and the second the action within it. `*` crosses `/`.

use crate::backup::action::{Action, ActionKind};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use globset::{GlobBuilder, GlobMatcher};
use itertools::Itertools;

fn matcher(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(Error::from)
        .add_msg(format!("Invalid target pattern {pattern:?}"))
}

/// Names of the backed up data itself: folder, or database name and engine.
fn source_names(action: &Action) -> Vec<String> {
    match action.kind() {
        ActionKind::File(source) => vec![source.folder().clone()],
        ActionKind::Database(source) => {
            vec![source.database().clone(), source.engine().to_string()]
        }
    }
}

fn is_match(matcher: &GlobMatcher, candidates: &[String]) -> bool {
    candidates.iter().any(|candidate| matcher.is_match(candidate))
}

/// Whether `action` is designated by `identifier`.
pub fn matches(action: &Action, identifier: &str) -> Result<bool> {
    let sources = source_names(action);
    match identifier.split_once(':') {
        Some((scope, target)) => {
            let scope = matcher(scope)?;
            let target = matcher(target)?;
            let scopes = [action.server_name().to_string(), action.prefix().clone()];
            let targets = [action.name().clone(), action.full_name()]
                .into_iter()
                .chain(sources)
                .collect_vec();
            Ok(is_match(&scope, &scopes) && is_match(&target, &targets))
        }
        None => {
            let glob = matcher(identifier)?;
            let candidates = [
                action.server_name().to_string(),
                action.name().clone(),
                action.full_name(),
                action.prefix().clone(),
            ]
            .into_iter()
            .chain(sources)
            .collect_vec();
            Ok(is_match(&glob, &candidates))
        }
    }
}

/// Actions designated by `identifiers`, without duplicates, in registry order.
///
/// No identifier selects every action when `all_on_empty` is set. An
/// identifier matching nothing is an error.
pub fn select<'a, S: AsRef<str>>(
    actions: &'a [Action],
    identifiers: &[S],
    all_on_empty: bool,
) -> Result<Vec<&'a Action>> {
    if identifiers.is_empty() {
        return Ok(if all_on_empty {
            actions.iter().collect()
        } else {
            vec![]
        });
    }

    let mut selected = vec![false; actions.len()];
    for identifier in identifiers {
        let identifier = identifier.as_ref();
        let mut found = false;
        for (index, action) in actions.iter().enumerate() {
            if matches(action, identifier)? {
                selected[index] = true;
                found = true;
            }
        }
        if !found {
            return Err(Error::UnknownTarget(identifier.to_string()));
        }
    }
    Ok(actions
        .iter()
        .zip(selected)
        .filter_map(|(action, selected)| selected.then_some(action))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::action::database::{DatabaseSource, DbEngine};
    use crate::backup::action::file::FileSource;
    use crate::backup::action::host::Host;

    fn action(server: &str, name: &str, kind: impl Into<ActionKind>) -> Action {
        Action::builder()
            .prefix(server.to_string())
            .name(name.to_string())
            .host(Host::new(server, None, None))
            .dest_folder("/srv/staging".into())
            .kind(kind)
            .build()
    }

    fn registry() -> Vec<Action> {
        vec![
            action("web1", "var_www", FileSource::new("/var/www", vec![])),
            action("web1", "db", DatabaseSource::new(DbEngine::MySql, None, "shop", 3306)),
            action("api1", "db", DatabaseSource::new(DbEngine::Postgres, None, "crm", 5432)),
            action("web2", "etc", FileSource::new("/etc", vec![])),
        ]
    }

    fn names(selected: Vec<&Action>) -> Vec<String> {
        selected.iter().map(|a| a.full_name()).collect()
    }

    #[test]
    fn test_scoped_identifier() {
        let actions = registry();
        assert_eq!(names(select(&actions, &["web*:db"], true).unwrap()), vec!["web1_db"]);
        assert_eq!(
            names(select(&actions, &["*:postgres"], true).unwrap()),
            vec!["api1_db"]
        );
    }

    #[test]
    fn test_plain_identifier_matches_every_name() {
        let actions = registry();
        assert_eq!(
            names(select(&actions, &["web1"], true).unwrap()),
            vec!["web1_var_www", "web1_db"]
        );
        assert_eq!(names(select(&actions, &["shop"], true).unwrap()), vec!["web1_db"]);
        assert_eq!(names(select(&actions, &["/var/*"], true).unwrap()), vec!["web1_var_www"]);
        assert_eq!(names(select(&actions, &["*www"], true).unwrap()), vec!["web1_var_www"]);
    }

    #[test]
    fn test_duplicates_removed_in_registry_order() {
        let actions = registry();
        assert_eq!(
            names(select(&actions, &["web2", "web1", "*_db"], true).unwrap()),
            vec!["web1_var_www", "web1_db", "api1_db", "web2_etc"]
        );
    }

    #[test]
    fn test_empty_identifiers() {
        let actions = registry();
        assert_eq!(select::<&str>(&actions, &[], true).unwrap().len(), 4);
        assert!(select::<&str>(&actions, &[], false).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_target() {
        let actions = registry();
        let error = select(&actions, &["web1", "mail*"], true).unwrap_err();
        assert_eq!(error.to_string(), "Unknown target mail*");
    }
}
