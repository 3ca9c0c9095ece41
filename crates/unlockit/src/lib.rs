//! # unlockit
//!
//! Batch extraction of password-protected archives.
//!
//! A batch of RAR/ZIP jobs runs through a bounded worker pool. Each worker
//! cracks its archive's password from a shared candidate list, plans the
//! destination tree (synthesizing a container directory for archives that
//! would spill loose files), routes collisions through a conflict resolver
//! that can remember answers per job or for the rest of the run, and
//! extracts. Abort is cooperative and never interrupts a write in flight.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use unlockit::archive::{ArchiveKind, FsOpener};
//! use unlockit::config::RunConfig;
//! use unlockit::job::Job;
//! use unlockit::passwords::PasswordStore;
//! use unlockit::resolver::ConflictResolver;
//! use unlockit::scheduler::Scheduler;
//!
//! # async fn run() {
//! let config = RunConfig {
//!     destination: PathBuf::from("out"),
//!     ..RunConfig::default()
//! };
//! let passwords = Arc::new(PasswordStore::new());
//! passwords.add("letmein");
//!
//! let resolver = Arc::new(ConflictResolver::new(config.overwrite, None));
//! let scheduler = Scheduler::new(config, Arc::new(FsOpener), passwords, resolver);
//!
//! let jobs = vec![Job::new(PathBuf::from("backup.zip"), ArchiveKind::Zip, 0)];
//! for job in scheduler.run(jobs).await {
//!     println!("{}: {:?} {}", job.path.display(), job.status(), job.result_message);
//! }
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod cracker;
pub mod error;
pub mod job;
pub mod passwords;
pub mod planner;
pub mod resolver;
pub mod scheduler;

// Re-export main types
pub use archive::{Archive, ArchiveEntry, ArchiveKind, ArchiveOpener, FsOpener};
pub use config::{ListPolicy, OverwritePolicy, RunConfig, SuccessAction};
pub use cracker::{crack, CrackError, CrackResult};
pub use error::{ExtractError, JobError, OpenError};
pub use job::{Job, JobEvent, JobEventKind, JobStatus};
pub use passwords::PasswordStore;
pub use resolver::{ConflictPrompt, ConflictReply, ConflictResolver, Resolution};
pub use scheduler::{apply_list_policy, EventSender, Scheduler};
