//! End-to-end runs over real ZIP fixtures.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use unlockit::archive::{ArchiveKind, FsOpener};
use unlockit::config::{OverwritePolicy, RunConfig};
use unlockit::job::{Job, JobStatus};
use unlockit::passwords::PasswordStore;
use unlockit::resolver::{ConflictAction, ConflictPrompt, ConflictReply, ConflictResolver, DecisionScope};
use unlockit::scheduler::Scheduler;
use zip::unstable::write::FileOptionsExt;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Helper to create a test ZIP archive from (name, contents) pairs.
fn create_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    for (name, contents) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

/// Helper to create a password-protected test ZIP archive.
#[allow(deprecated)]
fn create_encrypted_zip(path: &Path, password: &str, files: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().with_deprecated_encryption(password.as_bytes());
    for (name, contents) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap();
}

fn job_for(path: &Path) -> Job {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    Job::new(path.to_path_buf(), ArchiveKind::Zip, size)
}

fn config_for(tmp: &TempDir) -> RunConfig {
    RunConfig {
        destination: tmp.path().join("out"),
        ..RunConfig::default()
    }
}

fn scheduler_for(config: RunConfig, passwords: Arc<PasswordStore>) -> Scheduler {
    let resolver = Arc::new(ConflictResolver::new(config.overwrite, None));
    Scheduler::new(config, Arc::new(FsOpener), passwords, resolver)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_of_plain_archives() {
    let tmp = TempDir::new().unwrap();
    let first = tmp.path().join("first.zip");
    let second = tmp.path().join("second.zip");
    create_zip(&first, &[("docs/readme.txt", b"hello"), ("docs/deep/data.bin", b"12345")]);
    create_zip(&second, &[("music/track.mp3", b"not really audio")]);

    let config = config_for(&tmp);
    let out = config.destination.clone();
    let scheduler = scheduler_for(config, Arc::new(PasswordStore::new()));
    let jobs = scheduler.run(vec![job_for(&first), job_for(&second)]).await;

    for job in &jobs {
        assert_eq!(job.status(), JobStatus::Done);
        assert!(job.result_message.is_empty());
        assert_eq!(job.password, None);
    }
    assert_eq!(jobs[0].extracted_files, 2);
    assert_eq!(jobs[0].extracted_bytes, 10);

    assert_eq!(fs::read_to_string(out.join("docs/readme.txt")).unwrap(), "hello");
    assert!(out.join("docs/deep/data.bin").exists());
    assert!(out.join("music/track.mp3").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_password_cracked_from_shared_list() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("locked.zip");
    create_encrypted_zip(&archive, "secret", &[("hidden.txt", b"found me")]);

    let passwords = Arc::new(PasswordStore::new());
    passwords.add("wrong1");
    passwords.add("wrong2");
    passwords.add("secret");

    let config = config_for(&tmp);
    let out = config.destination.clone();
    let scheduler = scheduler_for(config, Arc::clone(&passwords));
    let jobs = scheduler.run(vec![job_for(&archive)]).await;

    assert_eq!(jobs[0].status(), JobStatus::Done);
    assert_eq!(jobs[0].password.as_deref(), Some("secret"));
    assert_eq!(fs::read_to_string(out.join("hidden.txt")).unwrap(), "found me");
    assert!(passwords.snapshot().contains(&"secret".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exhausted_candidates_fail_the_job_only() {
    let tmp = TempDir::new().unwrap();
    let locked = tmp.path().join("locked.zip");
    let plain = tmp.path().join("plain.zip");
    create_encrypted_zip(&locked, "unguessed", &[("x.txt", b"x")]);
    create_zip(&plain, &[("y.txt", b"y")]);

    let passwords = Arc::new(PasswordStore::new());
    passwords.add("wrong");

    let scheduler = scheduler_for(config_for(&tmp), passwords);
    let jobs = scheduler.run(vec![job_for(&locked), job_for(&plain)]).await;

    assert_eq!(jobs[0].status(), JobStatus::Error);
    assert!(jobs[0].result_message.contains("No password matched after 1"));
    assert_eq!(jobs[1].status(), JobStatus::Done);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_loose_files_get_their_own_directory() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("bundle.part1.zip");
    create_zip(
        &archive,
        &[("a.txt", b"a"), ("b.txt", b"b"), ("c.txt", b"c")],
    );

    let mut config = config_for(&tmp);
    config.own_dir_threshold = 3;
    let out = config.destination.clone();
    let scheduler = scheduler_for(config, Arc::new(PasswordStore::new()));
    let jobs = scheduler.run(vec![job_for(&archive)]).await;

    assert_eq!(jobs[0].status(), JobStatus::Done);
    assert!(out.join("bundle/a.txt").exists());
    assert!(out.join("bundle/b.txt").exists());
    assert!(out.join("bundle/c.txt").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contained_archive_keeps_its_own_tree() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("neat.zip");
    create_zip(
        &archive,
        &[("album/one.txt", b"1"), ("album/two.txt", b"2"), ("album/three.txt", b"3")],
    );

    let mut config = config_for(&tmp);
    config.own_dir_threshold = 3;
    let out = config.destination.clone();
    let scheduler = scheduler_for(config, Arc::new(PasswordStore::new()));
    scheduler.run(vec![job_for(&archive)]).await;

    // All entries share album/, so no container directory is synthesized.
    assert!(out.join("album/one.txt").exists());
    assert!(!out.join("neat").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_junk_entries_are_never_extracted() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("mixed.zip");
    create_zip(
        &archive,
        &[("keep.txt", b"keep"), ("Thumbs.db", b"junk"), ("__MACOSX/._keep.txt", b"junk")],
    );

    let config = config_for(&tmp);
    let out = config.destination.clone();
    let scheduler = scheduler_for(config, Arc::new(PasswordStore::new()));
    let jobs = scheduler.run(vec![job_for(&archive)]).await;

    assert_eq!(jobs[0].status(), JobStatus::Done);
    assert_eq!(jobs[0].extracted_files, 1);
    assert!(out.join("keep.txt").exists());
    assert!(!out.join("Thumbs.db").exists());
    assert!(!out.join("__MACOSX").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rename_policy_keeps_both_files() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("again.zip");
    create_zip(&archive, &[("report.txt", b"new version")]);

    let config = config_for(&tmp);
    let out = config.destination.clone();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("report.txt"), b"old version").unwrap();

    let scheduler = scheduler_for(config, Arc::new(PasswordStore::new()));
    let jobs = scheduler.run(vec![job_for(&archive)]).await;

    assert_eq!(jobs[0].status(), JobStatus::Done);
    assert_eq!(fs::read_to_string(out.join("report.txt")).unwrap(), "old version");
    assert_eq!(fs::read_to_string(out.join("report_1.txt")).unwrap(), "new version");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_prompted_overwrite_replaces_file() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("again.zip");
    create_zip(&archive, &[("report.txt", b"new version")]);

    let mut config = config_for(&tmp);
    config.overwrite = OverwritePolicy::Prompt;
    let out = config.destination.clone();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("report.txt"), b"old version").unwrap();

    let (tx, mut rx) = mpsc::channel::<ConflictPrompt>(4);
    let responder = tokio::spawn(async move {
        let mut prompts: Vec<(PathBuf, PathBuf)> = Vec::new();
        while let Some(prompt) = rx.recv().await {
            prompts.push((prompt.existing.path.clone(), prompt.incoming.path.clone()));
            let _ = prompt.reply.send(ConflictReply {
                action: ConflictAction::Overwrite,
                scope: DecisionScope::ThisEntry,
            });
        }
        prompts
    });

    let resolver = Arc::new(ConflictResolver::new(config.overwrite, Some(tx)));
    let scheduler = Scheduler::new(
        config,
        Arc::new(FsOpener),
        Arc::new(PasswordStore::new()),
        resolver,
    );
    let jobs = scheduler.run(vec![job_for(&archive)]).await;
    drop(scheduler);

    assert_eq!(jobs[0].status(), JobStatus::Done);
    assert_eq!(fs::read_to_string(out.join("report.txt")).unwrap(), "new version");

    let prompts = responder.await.unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].0, out.join("report.txt"));
}
