//! One scheduled archive and its tracked outcome.

use crate::archive::ArchiveKind;
use crate::resolver::ConflictDecision;
use serde::Serialize;
use std::path::PathBuf;

/// Lifecycle of a job. Transitions are monotone:
/// Pending -> Running -> one of {Done, Error, Aborted}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Aborted)
    }

    fn can_advance_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(next, JobStatus::Running | JobStatus::Error),
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// One archive scheduled for extraction.
#[derive(Debug)]
pub struct Job {
    pub path: PathBuf,
    pub kind: ArchiveKind,
    pub size_bytes: u64,

    status: JobStatus,

    /// Files written by this job so far
    pub extracted_files: u64,
    /// Bytes written by this job so far
    pub extracted_bytes: u64,
    /// Password that opened the archive, when one was needed
    pub password: Option<String>,
    /// Empty on success, failure text otherwise
    pub result_message: String,

    /// Conflict decision remembered for this job only
    pub(crate) conflict_decision: ConflictDecision,
}

impl Job {
    pub fn new(path: PathBuf, kind: ArchiveKind, size_bytes: u64) -> Self {
        Self {
            path,
            kind,
            size_bytes,
            status: JobStatus::Pending,
            extracted_files: 0,
            extracted_bytes: 0,
            password: None,
            result_message: String::new(),
            conflict_decision: ConflictDecision::Unspecified,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_advance_to(next),
            "illegal status transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }

    /// Manual requeue: reset a finished job back to Pending so a later run
    /// picks it up again. Returns false for jobs that are not terminal.
    pub fn requeue(&mut self) -> bool {
        if !self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Pending;
        self.extracted_files = 0;
        self.extracted_bytes = 0;
        self.password = None;
        self.result_message.clear();
        self.conflict_decision = ConflictDecision::Unspecified;
        true
    }
}

/// Display event emitted by a worker.
#[derive(Debug, Clone)]
pub struct JobEvent {
    /// Index of the job in the submitted batch
    pub job: usize,
    pub kind: JobEventKind,
}

#[derive(Debug, Clone)]
pub enum JobEventKind {
    /// Worker launched, archive about to be opened
    Started,
    /// One candidate password about to be tried
    PasswordTried(String),
    /// One entry finished extracting
    EntryExtracted { name: String, size: u64 },
    /// Job reached a terminal status
    Finished(JobStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(PathBuf::from("/tmp/a.zip"), ArchiveKind::Zip, 42)
    }

    #[test]
    fn test_normal_lifecycle() {
        let mut j = job();
        assert_eq!(j.status(), JobStatus::Pending);
        j.set_status(JobStatus::Running);
        j.set_status(JobStatus::Done);
        assert!(j.status().is_terminal());
    }

    #[test]
    fn test_requeue_resets_outcome() {
        let mut j = job();
        j.set_status(JobStatus::Running);
        j.set_status(JobStatus::Error);
        j.result_message = "boom".into();
        j.extracted_files = 3;

        assert!(j.requeue());
        assert_eq!(j.status(), JobStatus::Pending);
        assert!(j.result_message.is_empty());
        assert_eq!(j.extracted_files, 0);
    }

    #[test]
    fn test_requeue_refuses_non_terminal() {
        let mut j = job();
        assert!(!j.requeue());
        j.set_status(JobStatus::Running);
        assert!(!j.requeue());
    }

    #[test]
    #[should_panic(expected = "illegal status transition")]
    #[cfg(debug_assertions)]
    fn test_terminal_is_sticky() {
        let mut j = job();
        j.set_status(JobStatus::Running);
        j.set_status(JobStatus::Done);
        j.set_status(JobStatus::Running);
    }
}
