//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use schwab_auth::{BearerToken, CredentialStore, RefreshOutcome};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::transport::TransportFactory;

/// Counts builds; optionally fails every build after the first `ok_builds`.
#[derive(Default)]
pub struct CountingFactory {
    builds: AtomicUsize,
    ok_builds: Option<usize>,
}

impl CountingFactory {
    pub fn failing_after(ok_builds: usize) -> Self {
        Self {
            builds: AtomicUsize::new(0),
            ok_builds: Some(ok_builds),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl TransportFactory for CountingFactory {
    fn build(&self, timeout: Duration) -> Result<reqwest::Client> {
        let n = self.builds.fetch_add(1, Ordering::SeqCst);
        if self.ok_builds.is_some_and(|ok| n >= ok) {
            return Err(Error::TransportBuild("factory disabled for test".into()));
        }
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::TransportBuild(e.to_string()))
    }
}

/// One scripted `refresh_if_needed` result.
pub enum Step {
    Skip,
    Rotate,
    Fail,
}

/// Credential store that replays a script, then answers `NoActionNeeded`.
///
/// The current token is `at_<n>` after `n` scripted rotations.
///
/// With a gate installed, each call signals `entered` and then waits for the
/// gate before returning, so tests can cancel mid-refresh.
#[derive(Default)]
pub struct ScriptedStore {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
    rotations: AtomicUsize,
    gate: Option<Gate>,
}

pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

impl ScriptedStore {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn gated(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            gate: Some(Gate {
                entered: Notify::new(),
                release: Notify::new(),
            }),
            ..Self::new(steps)
        }
    }

    pub fn gate(&self) -> &Gate {
        self.gate.as_ref().expect("store has no gate")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl CredentialStore for ScriptedStore {
    fn refresh_if_needed(&self) -> Pin<Box<dyn Future<Output = RefreshOutcome> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            let step = self.script.lock().unwrap().pop_front();
            self.completed.fetch_add(1, Ordering::SeqCst);
            match step {
                Some(Step::Rotate) => {
                    self.rotations.fetch_add(1, Ordering::SeqCst);
                    RefreshOutcome::Rotated
                }
                Some(Step::Fail) => RefreshOutcome::Failed(schwab_auth::Error::Http(
                    "token endpoint unreachable".into(),
                )),
                Some(Step::Skip) | None => RefreshOutcome::NoActionNeeded,
            }
        })
    }

    fn current_token(&self) -> BearerToken {
        BearerToken::new(
            format!("at_{}", self.rotations.load(Ordering::SeqCst)),
            u64::MAX,
        )
    }
}
