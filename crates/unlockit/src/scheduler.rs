//! Bounded-concurrency job scheduling.
//!
//! The scheduler admits pending jobs into an active set of at most N
//! workers, collects completions over a results channel, and selects on
//! (completion received, abort requested). Workers run on the blocking pool;
//! abort is cooperative and is observed at every sink callback, so an
//! in-flight write is finished but nothing further is started.

use crate::archive::{Archive, ArchiveOpener, ExtractPlan, ExtractSink, Verdict};
use crate::config::{ListPolicy, RunConfig, SuccessAction};
use crate::cracker::{self, CrackError};
use crate::error::{ExtractError, JobError};
use crate::job::{Job, JobEvent, JobEventKind, JobStatus};
use crate::passwords::PasswordStore;
use crate::planner::{self, JunkFilter};
use crate::resolver::{self, ConflictResolver, FileDesc, Resolution};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Channel end workers report display events on.
pub type EventSender = mpsc::UnboundedSender<JobEvent>;

/// Drives one run over a batch of jobs.
pub struct Scheduler {
    config: Arc<RunConfig>,
    opener: Arc<dyn ArchiveOpener>,
    passwords: Arc<PasswordStore>,
    resolver: Arc<ConflictResolver>,
    junk: Arc<JunkFilter>,
    cancel: CancellationToken,
    events: Option<EventSender>,
}

impl Scheduler {
    pub fn new(
        config: RunConfig,
        opener: Arc<dyn ArchiveOpener>,
        passwords: Arc<PasswordStore>,
        resolver: Arc<ConflictResolver>,
    ) -> Self {
        let junk = Arc::new(JunkFilter::from_config(&config.skip_patterns));
        Self {
            config: Arc::new(config),
            opener,
            passwords,
            resolver,
            junk,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    /// Attach a display event channel.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Token that requests a cooperative abort when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the batch to completion and return it, statuses finalized,
    /// original order preserved.
    ///
    /// At any instant at most `concurrency` jobs are Running. Completion
    /// order is first-to-finish. No job failure stops the run; once an abort
    /// is requested no further job is admitted, running workers drain
    /// naturally, and jobs never admitted stay Pending.
    pub async fn run(&self, jobs: Vec<Job>) -> Vec<Job> {
        let limit = self.config.concurrency.max(1);
        let total = jobs.len();
        let mut slots: Vec<Option<Job>> = jobs.into_iter().map(Some).collect();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<(usize, Job, Result<(), JobError>)>();

        let mut next = 0usize;
        let mut active = 0usize;

        loop {
            while active < limit && next < total && !self.cancel.is_cancelled() {
                let idx = next;
                next += 1;

                let Some(job) = slots[idx].as_mut() else {
                    continue;
                };
                if job.status() != JobStatus::Pending {
                    continue;
                }
                if !job.path.exists() {
                    job.result_message = JobError::FileNotFound(job.path.clone()).to_string();
                    job.set_status(JobStatus::Error);
                    self.emit(idx, JobEventKind::Finished(JobStatus::Error));
                    continue;
                }

                let Some(mut job) = slots[idx].take() else {
                    continue;
                };
                job.set_status(JobStatus::Running);
                self.emit(idx, JobEventKind::Started);
                active += 1;

                let ctx = WorkerCtx {
                    opener: Arc::clone(&self.opener),
                    passwords: Arc::clone(&self.passwords),
                    resolver: Arc::clone(&self.resolver),
                    config: Arc::clone(&self.config),
                    junk: Arc::clone(&self.junk),
                    cancel: self.cancel.clone(),
                    events: self.events.clone(),
                };
                let done_tx = done_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_job(idx, &mut job, &ctx)
                    }));
                    let result = match caught {
                        Ok(result) => result,
                        Err(payload) => Err(JobError::Other(panic_text(payload))),
                    };
                    let _ = done_tx.send((idx, job, result));
                });
            }

            if active == 0 {
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled(), if !self.cancel.is_cancelled() => {
                    info!("abort requested, no further jobs will be admitted");
                }
                completion = done_rx.recv() => {
                    let Some((idx, mut job, result)) = completion else {
                        break;
                    };
                    active -= 1;
                    self.finalize(idx, &mut job, result);
                    slots[idx] = Some(job);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    fn finalize(&self, idx: usize, job: &mut Job, result: Result<(), JobError>) {
        if self.cancel.is_cancelled() {
            // Abort overrides whatever the worker came back with.
            if let Err(e) = result {
                job.result_message = e.to_string();
            }
            job.set_status(JobStatus::Aborted);
            self.emit(idx, JobEventKind::Finished(JobStatus::Aborted));
            return;
        }

        match result {
            Ok(()) => {
                self.run_success_action(job);
                job.set_status(JobStatus::Done);
                info!(
                    archive = %job.path.display(),
                    files = job.extracted_files,
                    bytes = job.extracted_bytes,
                    "job done"
                );
            }
            Err(e) => {
                job.result_message = e.to_string();
                job.set_status(JobStatus::Error);
                warn!(archive = %job.path.display(), "job failed: {e}");
            }
        }
        self.emit(idx, JobEventKind::Finished(job.status()));
    }

    /// Post-success handling of the archive file itself. Failures here do
    /// not demote the job, the extraction already happened.
    fn run_success_action(&self, job: &Job) {
        match self.config.on_success {
            SuccessAction::None => {}
            SuccessAction::Rename => {
                let file_name = job
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let target = resolver::uniquify(&job.path.with_file_name(format!("extracted_{file_name}")));
                if let Err(e) = fs::rename(&job.path, &target) {
                    warn!("could not move {} aside: {e}", job.path.display());
                }
            }
            SuccessAction::Delete => {
                if let Err(e) = fs::remove_file(&job.path) {
                    warn!("could not delete {}: {e}", job.path.display());
                }
            }
        }
    }

    fn emit(&self, job: usize, kind: JobEventKind) {
        if let Some(tx) = &self.events {
            let _ = tx.send(JobEvent { job, kind });
        }
    }
}

/// Everything a worker needs, bundled for the move onto the blocking pool.
struct WorkerCtx {
    opener: Arc<dyn ArchiveOpener>,
    passwords: Arc<PasswordStore>,
    resolver: Arc<ConflictResolver>,
    config: Arc<RunConfig>,
    junk: Arc<JunkFilter>,
    cancel: CancellationToken,
    events: Option<EventSender>,
}

/// Sink wiring archive callbacks to events, counters and the abort check.
struct WorkerSink<'a> {
    job: usize,
    cancel: &'a CancellationToken,
    events: Option<&'a EventSender>,
    files: u64,
    bytes: u64,
}

impl WorkerSink<'_> {
    fn verdict(&self) -> Verdict {
        if self.cancel.is_cancelled() {
            Verdict::Stop
        } else {
            Verdict::Continue
        }
    }

    fn emit(&self, kind: JobEventKind) {
        if let Some(tx) = self.events {
            let _ = tx.send(JobEvent { job: self.job, kind });
        }
    }
}

impl ExtractSink for WorkerSink<'_> {
    fn password_tried(&mut self, candidate: &str) -> Verdict {
        self.emit(JobEventKind::PasswordTried(candidate.to_owned()));
        self.verdict()
    }

    fn entry_done(&mut self, name: &str, size: u64) -> Verdict {
        self.files += 1;
        self.bytes += size;
        self.emit(JobEventKind::EntryExtracted {
            name: name.to_owned(),
            size,
        });
        self.verdict()
    }
}

/// One job, start to finish: crack, plan, route conflicts, extract.
fn run_job(idx: usize, job: &mut Job, ctx: &WorkerCtx) -> Result<(), JobError> {
    let mut archive = ctx
        .opener
        .open(job.kind, &job.path)
        .map_err(JobError::ArchiveOpen)?;
    let mut sink = WorkerSink {
        job: idx,
        cancel: &ctx.cancel,
        events: ctx.events.as_ref(),
        files: 0,
        bytes: 0,
    };

    let crack = cracker::crack(archive.as_mut(), &ctx.passwords, &mut sink).map_err(|e| match e {
        CrackError::Exhausted { attempts } => JobError::PasswordExhausted { attempts },
        CrackError::Stopped => JobError::Stopped,
        CrackError::Open(open) => JobError::ArchiveOpen(open),
    })?;
    job.password = crack.password;

    let entries = archive.entries().to_vec();
    let archive_name = job
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = planner::plan_base_dir(
        &entries,
        ctx.config.own_dir_threshold,
        &archive_name,
        &ctx.junk,
    );
    let dest_root = match &base {
        Some(dir) => ctx.config.destination.join(dir),
        None => ctx.config.destination.clone(),
    };

    let mut plan: ExtractPlan = Vec::with_capacity(entries.len());
    for entry in &entries {
        if ctx.cancel.is_cancelled() {
            return Err(JobError::Stopped);
        }

        let relative = if entry.is_dir || ctx.junk.is_junk(&entry.name) {
            None
        } else {
            planner::safe_relative(&entry.name)
        };
        let Some(relative) = relative else {
            plan.push(None);
            continue;
        };

        let dest = dest_root.join(relative);
        let planned = if dest.exists() {
            let existing = FileDesc {
                path: dest.clone(),
                size: fs::metadata(&dest).map(|m| m.len()).unwrap_or(0),
            };
            let incoming = FileDesc {
                path: PathBuf::from(&entry.name),
                size: entry.size,
            };
            match ctx
                .resolver
                .resolve(idx, &mut job.conflict_decision, &dest, existing, incoming)
            {
                Resolution::Write(path) => Some(path),
                Resolution::Skip => None,
            }
        } else {
            Some(dest)
        };
        plan.push(planned);
    }

    let outcome = archive.extract(&plan, &mut sink);
    job.extracted_files = sink.files;
    job.extracted_bytes = sink.bytes;
    match outcome {
        Ok(()) => Ok(()),
        Err(ExtractError::Stopped) => Err(JobError::Stopped),
        Err(ExtractError::Io(e)) => Err(JobError::Extraction(e)),
        Err(ExtractError::Archive(msg)) => Err(JobError::Other(msg)),
    }
}

fn panic_text(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

/// Which jobs stay on the list after a completed (non-aborted) run.
pub fn apply_list_policy(jobs: Vec<Job>, policy: ListPolicy) -> Vec<Job> {
    match policy {
        ListPolicy::KeepAll => jobs,
        ListPolicy::ClearAll => Vec::new(),
        ListPolicy::ClearSuccessfulOnly => jobs
            .into_iter()
            .filter(|j| j.status() != JobStatus::Done)
            .collect(),
    }
}
