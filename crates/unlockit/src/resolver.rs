//! Overwrite-conflict resolution.
//!
//! A conflict is a destination path that already exists before an entry is
//! written. Resolution consults, in order: the decision remembered for the
//! current job, the decision remembered for the rest of the run, and finally
//! the configured policy. The prompt path is a request/response message: the
//! worker sends a [`ConflictPrompt`] and blocks until the consumer replies,
//! which is a genuine suspension point for that worker.

use crate::config::OverwritePolicy;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// A conflict choice that may be remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictDecision {
    #[default]
    Unspecified,
    Skip,
    Overwrite,
    Rename,
}

/// Action selected for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Skip,
    Overwrite,
    Rename,
}

impl From<ConflictAction> for ConflictDecision {
    fn from(action: ConflictAction) -> Self {
        match action {
            ConflictAction::Skip => ConflictDecision::Skip,
            ConflictAction::Overwrite => ConflictDecision::Overwrite,
            ConflictAction::Rename => ConflictDecision::Rename,
        }
    }
}

/// How far a prompted choice should stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionScope {
    ThisEntry,
    ThisJob,
    RestOfRun,
}

/// One side of a conflict, as shown to whoever answers the prompt.
#[derive(Debug, Clone)]
pub struct FileDesc {
    pub path: PathBuf,
    pub size: u64,
}

/// Request sent to the prompt consumer. Dropping `reply` without answering
/// resolves the conflict as Skip.
#[derive(Debug)]
pub struct ConflictPrompt {
    pub job: usize,
    pub existing: FileDesc,
    pub incoming: FileDesc,
    pub reply: oneshot::Sender<ConflictReply>,
}

/// Answer to a [`ConflictPrompt`].
#[derive(Debug, Clone, Copy)]
pub struct ConflictReply {
    pub action: ConflictAction,
    pub scope: DecisionScope,
}

/// Final word on one colliding entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Write(PathBuf),
    Skip,
}

/// Resolver shared by all workers of one run.
pub struct ConflictResolver {
    policy: OverwritePolicy,
    remembered: Mutex<ConflictDecision>,
    prompts: Option<mpsc::Sender<ConflictPrompt>>,
}

impl ConflictResolver {
    /// `prompts` is only consulted under [`OverwritePolicy::Prompt`]; pass
    /// `None` to resolve unanswerable prompts as Skip.
    pub fn new(policy: OverwritePolicy, prompts: Option<mpsc::Sender<ConflictPrompt>>) -> Self {
        Self {
            policy,
            remembered: Mutex::new(ConflictDecision::Unspecified),
            prompts,
        }
    }

    /// Resolve one conflict. Only called when `dest` already exists.
    ///
    /// `job_decision` is the per-job remembered cell; a prompted
    /// apply-to-this-job reply sets it at most once. Blocks on the prompt
    /// reply under [`OverwritePolicy::Prompt`].
    pub fn resolve(
        &self,
        job: usize,
        job_decision: &mut ConflictDecision,
        dest: &Path,
        existing: FileDesc,
        incoming: FileDesc,
    ) -> Resolution {
        if *job_decision != ConflictDecision::Unspecified {
            return apply(*job_decision, dest);
        }

        let remembered = *self.remembered.lock();
        if remembered != ConflictDecision::Unspecified {
            return apply(remembered, dest);
        }

        match self.policy {
            OverwritePolicy::Overwrite => Resolution::Write(dest.to_path_buf()),
            OverwritePolicy::Rename => Resolution::Write(uniquify(dest)),
            OverwritePolicy::Prompt => {
                let reply = self.ask(job, existing, incoming);
                match reply.scope {
                    DecisionScope::ThisEntry => {}
                    DecisionScope::ThisJob => {
                        if *job_decision == ConflictDecision::Unspecified {
                            *job_decision = reply.action.into();
                        }
                    }
                    DecisionScope::RestOfRun => {
                        // First responder wins; a later reply falls back to
                        // its entry-scoped action.
                        let mut cell = self.remembered.lock();
                        if *cell == ConflictDecision::Unspecified {
                            *cell = reply.action.into();
                        }
                    }
                }
                apply(reply.action.into(), dest)
            }
        }
    }

    fn ask(&self, job: usize, existing: FileDesc, incoming: FileDesc) -> ConflictReply {
        const GIVE_UP: ConflictReply = ConflictReply {
            action: ConflictAction::Skip,
            scope: DecisionScope::ThisEntry,
        };

        let Some(prompts) = &self.prompts else {
            return GIVE_UP;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ConflictPrompt {
            job,
            existing,
            incoming,
            reply: reply_tx,
        };
        if prompts.blocking_send(request).is_err() {
            debug!(job, "prompt channel closed, skipping conflicting entry");
            return GIVE_UP;
        }
        reply_rx.blocking_recv().unwrap_or(GIVE_UP)
    }
}

fn apply(decision: ConflictDecision, dest: &Path) -> Resolution {
    match decision {
        ConflictDecision::Skip | ConflictDecision::Unspecified => Resolution::Skip,
        ConflictDecision::Overwrite => Resolution::Write(dest.to_path_buf()),
        ConflictDecision::Rename => Resolution::Write(uniquify(dest)),
    }
}

/// Smallest-indexed `_n` variant of `path` that does not currently exist.
///
/// `a.txt` becomes `a_1.txt`, then `a_2.txt`, and so on; the extension is
/// preserved. Returns `path` itself when it is free.
pub fn uniquify(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for i in 1u32.. {
        let candidate = parent.join(format!("{stem}_{i}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("ran out of rename indices");
}
