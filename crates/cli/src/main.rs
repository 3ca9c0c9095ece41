//! Command-line interface for batch password-cracking extraction.
//!
//! Feeds archives into the `unlockit` scheduler, answers conflict prompts on
//! stdin, renders worker events on a progress bar and turns Ctrl-C into a
//! cooperative abort.

mod intake;

use clap::{Parser, Subcommand};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use unlockit::archive::{Archive, ArchiveKind, ArchiveOpener, FsOpener, NullSink};
use unlockit::config::{ListPolicy, OverwritePolicy, RunConfig, SuccessAction};
use unlockit::job::{Job, JobEvent, JobEventKind, JobStatus};
use unlockit::passwords::PasswordStore;
use unlockit::resolver::{
    ConflictAction, ConflictPrompt, ConflictReply, ConflictResolver, DecisionScope, FileDesc,
};
use unlockit::scheduler::{apply_list_policy, Scheduler};

#[derive(Parser)]
#[command(name = "unlockit")]
#[command(version, about = "Batch-extract password-protected archives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract archives, cracking passwords from a shared candidate list
    Extract {
        /// Archive files, or directories to scan for archives
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Destination root directory
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Password list file, loaded before and saved back after the run
        #[arg(short, long)]
        passwords: Option<PathBuf>,

        /// JSON config file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum number of archives processed at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Loose-file count at which an archive gets its own directory
        #[arg(long)]
        own_dir_threshold: Option<usize>,

        /// Conflict handling: overwrite, prompt, rename
        #[arg(long)]
        overwrite: Option<String>,

        /// Archive handling after success: none, rename, delete
        #[arg(long)]
        on_success: Option<String>,

        /// List handling after the run: keep, clear, clear-done
        #[arg(long)]
        when_done: Option<String>,

        /// Never prompt; conflicting entries are skipped
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Open one archive (cracking its password) and list the entries
    Probe {
        /// Archive file to probe
        archive: PathBuf,

        /// Password list file
        #[arg(short, long)]
        passwords: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            paths,
            dest,
            passwords,
            config,
            concurrency,
            own_dir_threshold,
            overwrite,
            on_success,
            when_done,
            yes,
        } => {
            let config = build_config(
                config,
                dest,
                concurrency,
                own_dir_threshold,
                overwrite,
                on_success,
                when_done,
            );
            handle_extract(paths, passwords, config, yes).await
        }
        Commands::Probe {
            archive,
            passwords,
            json,
        } => handle_probe(archive, passwords, json).await,
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

type CliError = Box<dyn std::error::Error + Send + Sync>;

fn build_config(
    config_file: Option<PathBuf>,
    dest: Option<PathBuf>,
    concurrency: Option<usize>,
    own_dir_threshold: Option<usize>,
    overwrite: Option<String>,
    on_success: Option<String>,
    when_done: Option<String>,
) -> RunConfig {
    let mut config = match config_file {
        Some(path) => RunConfig::load(&path),
        None => RunConfig::default(),
    };

    if let Some(dest) = dest {
        config.destination = dest;
    }
    if let Some(n) = concurrency {
        config.concurrency = n;
    }
    if let Some(n) = own_dir_threshold {
        config.own_dir_threshold = n;
    }
    if let Some(policy) = overwrite {
        config.overwrite = match policy.as_str() {
            "overwrite" => OverwritePolicy::Overwrite,
            "prompt" => OverwritePolicy::Prompt,
            _ => OverwritePolicy::Rename,
        };
    }
    if let Some(action) = on_success {
        config.on_success = match action.as_str() {
            "rename" => SuccessAction::Rename,
            "delete" => SuccessAction::Delete,
            _ => SuccessAction::None,
        };
    }
    if let Some(policy) = when_done {
        config.when_done = match policy.as_str() {
            "clear" => ListPolicy::ClearAll,
            "clear-done" => ListPolicy::ClearSuccessfulOnly,
            _ => ListPolicy::KeepAll,
        };
    }

    config
}

async fn handle_extract(
    paths: Vec<PathBuf>,
    password_file: Option<PathBuf>,
    config: RunConfig,
    yes: bool,
) -> Result<i32, CliError> {
    if config.destination.as_os_str().is_empty() {
        return Err("no destination directory; pass --dest or set it in the config file".into());
    }

    let jobs = intake::collect_jobs(&paths);
    if jobs.is_empty() {
        return Err("no archives found in the given paths".into());
    }

    let passwords = Arc::new(match &password_file {
        Some(path) if path.exists() => PasswordStore::load(path)?,
        _ => PasswordStore::new(),
    });
    println!(
        "{} archives, {} candidate passwords, extracting to {}",
        jobs.len(),
        passwords.len(),
        config.destination.display()
    );

    let progress = ProgressBar::new(jobs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:30} {pos}/{len} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    // Conflict prompts, consumed one at a time on stdin.
    let prompt_tx = if config.overwrite == OverwritePolicy::Prompt && !yes {
        let (tx, rx) = mpsc::channel::<ConflictPrompt>(1);
        spawn_prompt_consumer(rx, progress.clone());
        Some(tx)
    } else {
        None
    };

    let resolver = Arc::new(ConflictResolver::new(config.overwrite, prompt_tx));
    let (event_tx, event_rx) = mpsc::unbounded_channel::<JobEvent>();
    let job_names: Vec<String> = jobs
        .iter()
        .map(|j| {
            j.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| j.path.display().to_string())
        })
        .collect();
    spawn_event_renderer(event_rx, progress.clone(), job_names);

    let when_done = config.when_done;
    let scheduler =
        Scheduler::new(config, Arc::new(FsOpener), Arc::clone(&passwords), resolver)
            .with_events(event_tx);

    // First Ctrl-C aborts cooperatively, the second one exits.
    let cancel = scheduler.cancel_token();
    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            process::exit(130);
        }
        eprintln!("\nAborting; running jobs finish first (Ctrl-C again to exit now)");
        cancel.cancel();
    })?;

    let aborted = scheduler.cancel_token();
    let jobs = scheduler.run(jobs).await;
    progress.finish_and_clear();

    summarize(&jobs);

    if let Some(path) = password_file {
        if let Err(e) = passwords.save(&path) {
            warn!("could not save password list: {e}");
        }
    }

    if !aborted.is_cancelled() {
        let code = exit_code(&jobs);
        let remaining = apply_list_policy(jobs, when_done);
        report_remaining(&remaining);
        Ok(code)
    } else {
        Ok(1)
    }
}

fn summarize(jobs: &[Job]) {
    println!();
    for job in jobs {
        let name = job.path.display();
        match job.status() {
            JobStatus::Done => {
                let password = job
                    .password
                    .as_deref()
                    .map(|p| format!(", password: {p}"))
                    .unwrap_or_default();
                println!(
                    "done     {name} ({} files, {}{password})",
                    job.extracted_files,
                    HumanBytes(job.extracted_bytes)
                );
            }
            JobStatus::Error => println!("error    {name} ({})", job.result_message),
            JobStatus::Aborted => println!("aborted  {name}"),
            JobStatus::Pending => println!("waiting  {name} (not started)"),
            JobStatus::Running => {}
        }
    }
}

fn exit_code(jobs: &[Job]) -> i32 {
    if jobs.iter().all(|j| j.status() == JobStatus::Done) {
        0
    } else {
        1
    }
}

fn report_remaining(remaining: &[Job]) {
    if remaining.is_empty() {
        return;
    }
    println!();
    println!("Still on the list:");
    for job in remaining {
        println!("  {}", job.path.display());
    }
}

fn spawn_prompt_consumer(mut rx: mpsc::Receiver<ConflictPrompt>, progress: ProgressBar) {
    tokio::spawn(async move {
        while let Some(prompt) = rx.recv().await {
            let progress = progress.clone();
            // stdin is blocking; the asking worker is blocked on the reply
            // anyway, so prompts are answered one at a time.
            let _ = tokio::task::spawn_blocking(move || {
                let reply = progress.suspend(|| ask_on_stdin(&prompt.existing, &prompt.incoming));
                let _ = prompt.reply.send(reply);
            })
            .await;
        }
    });
}

fn ask_on_stdin(existing: &FileDesc, incoming: &FileDesc) -> ConflictReply {
    const SKIP_ONCE: ConflictReply = ConflictReply {
        action: ConflictAction::Skip,
        scope: DecisionScope::ThisEntry,
    };

    println!();
    println!(
        "File exists: {} ({})",
        existing.path.display(),
        HumanBytes(existing.size)
    );
    println!(
        "   incoming: {} ({})",
        incoming.path.display(),
        HumanBytes(incoming.size)
    );
    println!("[o]verwrite, [r]ename or [s]kip; append !job or !all to remember (e.g. r!all)");

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => return SKIP_ONCE,
            Ok(_) => {}
        }
        let answer = line.trim().to_lowercase();
        let (action, scope) = match answer.split_once('!') {
            Some((action, scope)) => (action, Some(scope)),
            None => (answer.as_str(), None),
        };

        let action = match action {
            "o" | "overwrite" => ConflictAction::Overwrite,
            "r" | "rename" => ConflictAction::Rename,
            "s" | "skip" => ConflictAction::Skip,
            _ => {
                println!("Please answer o, r or s.");
                continue;
            }
        };
        let scope = match scope {
            None => DecisionScope::ThisEntry,
            Some("job") => DecisionScope::ThisJob,
            Some("all") => DecisionScope::RestOfRun,
            Some(_) => {
                println!("Scope must be !job or !all.");
                continue;
            }
        };
        return ConflictReply { action, scope };
    }
}

fn spawn_event_renderer(
    mut rx: mpsc::UnboundedReceiver<JobEvent>,
    progress: ProgressBar,
    names: Vec<String>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let name = names
                .get(event.job)
                .map(String::as_str)
                .unwrap_or("?")
                .to_string();
            match event.kind {
                JobEventKind::Started => progress.set_message(format!("{name}: opening")),
                JobEventKind::PasswordTried(pw) => {
                    progress.set_message(format!("{name}: trying password {pw}"))
                }
                JobEventKind::EntryExtracted { name: entry, .. } => {
                    progress.set_message(format!("{name}: {entry}"))
                }
                JobEventKind::Finished(_) => progress.inc(1),
            }
        }
    });
}

#[derive(Serialize)]
struct ProbeReport {
    kind: ArchiveKind,
    password: Option<String>,
    entries: Vec<ProbeEntry>,
    total_bytes: u64,
}

#[derive(Serialize)]
struct ProbeEntry {
    name: String,
    size: u64,
    is_dir: bool,
}

async fn handle_probe(
    archive: PathBuf,
    password_file: Option<PathBuf>,
    json: bool,
) -> Result<i32, CliError> {
    let kind = ArchiveKind::from_path(&archive)
        .ok_or_else(|| format!("not a recognized archive name: {}", archive.display()))?;

    let passwords = match &password_file {
        Some(path) if path.exists() => PasswordStore::load(path)?,
        _ => PasswordStore::new(),
    };

    let report = tokio::task::spawn_blocking(move || -> Result<ProbeReport, CliError> {
        let mut container = FsOpener.open(kind, &archive)?;
        let crack = unlockit::cracker::crack(container.as_mut(), &passwords, &mut NullSink)?;
        let entries: Vec<ProbeEntry> = container
            .entries()
            .iter()
            .map(|e| ProbeEntry {
                name: e.name.clone(),
                size: e.size,
                is_dir: e.is_dir,
            })
            .collect();
        let total_bytes = entries.iter().map(|e| e.size).sum();
        Ok(ProbeReport {
            kind,
            password: crack.password,
            entries,
            total_bytes,
        })
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for entry in &report.entries {
            let marker = if entry.is_dir { "/" } else { "" };
            println!("{:>10}  {}{marker}", HumanBytes(entry.size).to_string(), entry.name);
        }
        println!(
            "{} entries, {}{}",
            report.entries.len(),
            HumanBytes(report.total_bytes),
            report
                .password
                .as_deref()
                .map(|p| format!(", password: {p}"))
                .unwrap_or_default()
        );
    }

    Ok(0)
}
