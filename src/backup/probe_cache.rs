use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of something a storage writes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProbeKey {
    Folder(PathBuf),
    Vault(String),
}

impl Display for ProbeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeKey::Folder(path) => write!(f, "folder {}", path.display()),
            ProbeKey::Vault(vault) => write!(f, "vault {vault}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Untested,
    Success,
    Failure,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Passed,
    /// The probe ran during this call and failed.
    Failed(Error),
    /// An earlier call already failed for the same key.
    PreviouslyFailed,
}

/// Remembers write probe outcomes for the lifetime of one run.
///
/// Each key owns its own slot so that probes on distinct keys run in
/// parallel while callers racing on the same key wait for the first probe
/// and reuse its outcome.
#[derive(Debug, Default)]
pub struct WriteProbeCache {
    slots: Mutex<HashMap<ProbeKey, Arc<Mutex<Option<bool>>>>>,
}

impl WriteProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: ProbeKey) -> Arc<Mutex<Option<bool>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    /// Runs `probe` unless `key` was already probed, recording its outcome.
    pub fn probe<F>(&self, key: ProbeKey, probe: F) -> ProbeOutcome
    where
        F: FnOnce() -> Result<()>,
    {
        let slot = self.slot(key);
        let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            Some(true) => ProbeOutcome::Passed,
            Some(false) => ProbeOutcome::PreviouslyFailed,
            None => {
                let result = probe();
                *state = Some(result.is_ok());
                match result {
                    Ok(()) => ProbeOutcome::Passed,
                    Err(e) => ProbeOutcome::Failed(e),
                }
            }
        }
    }

    pub fn state(&self, key: &ProbeKey) -> ProbeState {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        match slot.and_then(|s| *s.lock().unwrap_or_else(PoisonError::into_inner)) {
            None => ProbeState::Untested,
            Some(true) => ProbeState::Success,
            Some(false) => ProbeState::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_probe_runs_once_per_key() {
        let cache = WriteProbeCache::new();
        let calls = AtomicUsize::new(0);
        let key = ProbeKey::Folder("/srv/backup".into());

        for _ in 0..3 {
            let outcome = cache.probe(key.clone(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            assert!(matches!(outcome, ProbeOutcome::Passed));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(&key), ProbeState::Success);
    }

    #[test]
    fn test_failure_is_remembered() {
        let cache = WriteProbeCache::new();
        let key = ProbeKey::Vault("eu-west-1:archives".into());

        let first = cache.probe(key.clone(), || Err(Error::Operation("denied".into())));
        assert!(matches!(first, ProbeOutcome::Failed(_)));

        let second = cache.probe(key.clone(), || panic!("must not probe again"));
        assert!(matches!(second, ProbeOutcome::PreviouslyFailed));
        assert_eq!(cache.state(&key), ProbeState::Failure);
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = WriteProbeCache::new();
        let a = ProbeKey::Folder("/a".into());
        let b = ProbeKey::Folder("/b".into());
        cache.probe(a.clone(), || Err(Error::Operation("nope".into())));
        assert_eq!(cache.state(&a), ProbeState::Failure);
        assert_eq!(cache.state(&b), ProbeState::Untested);
    }

    #[test]
    fn test_concurrent_callers_share_one_probe() {
        let cache = WriteProbeCache::new();
        let calls = AtomicUsize::new(0);
        (0..16).into_par_iter().for_each(|_| {
            cache.probe(ProbeKey::Folder("/shared".into()), || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                Ok(())
            });
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
