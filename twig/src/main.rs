mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::{
    AddOutput, BranchOutput, CheckoutOutput, CommitInfo, CommitOutput, ConfigOutput, FindOutput,
    InitOutput, LogOutput, MergeOutput, OutputWriter, ReflogEntryInfo, ReflogOutput, ResetOutput,
    RmBranchOutput, RmOutput, StatusOutput,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use twig_core::{MergeOutcome, Repository, Session};

/// Twig - a small local version-control system
#[derive(Parser)]
#[command(name = "twig")]
#[command(about = "Local version control on a BLAKE3 content-addressed store", long_about = None)]
#[command(version)]
struct Cli {
    /// Work directory (defaults to TWIG_DIR env var or the current directory)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository in the work directory
    Init,

    /// Stage a file for the next commit
    Add {
        /// Path relative to the work directory
        path: String,
    },

    /// Record the staged changes
    Commit {
        /// Commit message
        message: String,
    },

    /// Unstage a file, and stop tracking it if it is tracked
    Rm {
        /// Path relative to the work directory
        path: String,
    },

    /// Show the current branch's history
    Log,

    /// Show every commit ever made
    GlobalLog,

    /// Print the ids of commits whose message contains the given text
    Find {
        /// Text to look for in commit messages
        message: String,
    },

    /// Show branches, staged files and working directory changes
    Status,

    /// Switch branches, or restore a file with `checkout [<commit>] -- <file>`
    Checkout {
        /// Branch to switch to, or commit to restore the file from
        #[arg(required_unless_present = "file")]
        target: Option<String>,

        /// File to restore
        #[arg(last = true)]
        file: Option<String>,
    },

    /// Create a branch at the current head
    Branch {
        /// Branch name
        name: String,
    },

    /// Delete a branch pointer
    RmBranch {
        /// Branch name
        name: String,
    },

    /// Move the branch head to a commit and check it out
    Reset {
        /// Commit id or unique prefix
        commit: String,
    },

    /// Merge a branch into the current branch
    Merge {
        /// Branch to merge in
        #[arg(required_unless_present = "abort")]
        branch: Option<String>,

        /// Abandon the merge in progress
        #[arg(long, conflicts_with = "branch")]
        abort: bool,
    },

    /// Show recent branch-pointer updates
    Reflog {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Set user.name or user.email
    Config {
        /// Configuration key
        key: String,

        /// New value
        value: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let output = OutputWriter::new(cli.json);

    // Determine work dir: CLI arg > TWIG_DIR env var > current directory
    let work_dir = cli
        .dir
        .or_else(|| std::env::var("TWIG_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    match run(&work_dir, cli.command, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // User errors print as the bare one-line message; faults keep their context chain.
            let (message, code) = match err.downcast_ref::<twig_core::Error>() {
                Some(core) if core.is_user_error() => (core.to_string(), 1),
                _ => (format!("Error: {:#}", err), 2),
            };
            output.write_error(&message, code);
            ExitCode::from(code)
        }
    }
}

fn run(work_dir: &Path, command: Commands, output: &OutputWriter) -> Result<()> {
    match command {
        Commands::Init => cmd_init(work_dir, output),
        Commands::Add { path } => cmd_add(work_dir, &path, output),
        Commands::Commit { message } => cmd_commit(work_dir, &message, output),
        Commands::Rm { path } => cmd_rm(work_dir, &path, output),
        Commands::Log => cmd_log(work_dir, false, output),
        Commands::GlobalLog => cmd_log(work_dir, true, output),
        Commands::Find { message } => cmd_find(work_dir, &message, output),
        Commands::Status => cmd_status(work_dir, output),
        Commands::Checkout { target, file } => cmd_checkout(work_dir, target, file, output),
        Commands::Branch { name } => cmd_branch(work_dir, &name, output),
        Commands::RmBranch { name } => cmd_rm_branch(work_dir, &name, output),
        Commands::Reset { commit } => cmd_reset(work_dir, &commit, output),
        Commands::Merge { branch, abort } => cmd_merge(work_dir, branch, abort, output),
        Commands::Reflog { limit } => cmd_reflog(work_dir, limit, output),
        Commands::Config { key, value } => cmd_config(work_dir, &key, &value, output),
    }
}

/// Open the repository and load its session.
fn open(work_dir: &Path) -> Result<(Repository, Session)> {
    let repo = Repository::open(work_dir)
        .with_context(|| format!("Failed to open repository in {}", work_dir.display()))?;
    let session = repo.load_session().context("Failed to load session")?;
    Ok((repo, session))
}

fn save(repo: &Repository, session: &Session) -> Result<()> {
    repo.save_session(session).context("Failed to save session")
}

fn cmd_init(work_dir: &Path, output: &OutputWriter) -> Result<()> {
    let (repo, session) = Repository::init(work_dir)
        .with_context(|| format!("Failed to initialize repository in {}", work_dir.display()))?;
    let initial = repo.store().branches().load(&session.branch)?.head();

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: repo.store().root().display().to_string(),
        branch: session.branch.clone(),
        initial_commit: initial,
    };
    output.write(&data, || {
        format!(
            "Initialized twig repository in {}\nBranch: {}\n",
            data.root, data.branch
        )
    })
}

fn cmd_add(work_dir: &Path, path: &str, output: &OutputWriter) -> Result<()> {
    let (repo, session) = open(work_dir)?;
    let staged = repo
        .add(&session, path)
        .with_context(|| format!("Failed to add {}", path))?;

    let data = AddOutput {
        success: true,
        result_code: 0,
        path: path.to_string(),
        staged,
    };
    output.write(&data, String::new)
}

fn cmd_commit(work_dir: &Path, message: &str, output: &OutputWriter) -> Result<()> {
    let (repo, mut session) = open(work_dir)?;
    let commit = repo
        .commit(&mut session, message)
        .context("Failed to commit")?;
    save(&repo, &session)?;

    let data = CommitOutput {
        success: true,
        result_code: 0,
        branch: session.branch.clone(),
        commit: CommitInfo::from(&commit),
    };
    output.write(&data, || {
        format!("[{} {}] {}\n", data.branch, commit.id().short(), message)
    })
}

fn cmd_rm(work_dir: &Path, path: &str, output: &OutputWriter) -> Result<()> {
    let (repo, session) = open(work_dir)?;
    repo.remove(&session, path)
        .with_context(|| format!("Failed to remove {}", path))?;

    let data = RmOutput {
        success: true,
        result_code: 0,
        path: path.to_string(),
    };
    output.write(&data, String::new)
}

fn cmd_log(work_dir: &Path, global: bool, output: &OutputWriter) -> Result<()> {
    let (repo, session) = open(work_dir)?;
    let commits = if global {
        repo.global_log()
    } else {
        repo.log(&session)
    }
    .context("Failed to read history")?;

    let data = LogOutput {
        success: true,
        result_code: 0,
        commits: commits.iter().map(CommitInfo::from).collect(),
    };
    output.write(&data, || data.commits.iter().map(CommitInfo::render).collect())
}

fn cmd_find(work_dir: &Path, message: &str, output: &OutputWriter) -> Result<()> {
    let (repo, _session) = open(work_dir)?;
    let ids = repo.find(message).context("Failed to search commits")?;

    let data = FindOutput {
        success: true,
        result_code: 0,
        message: message.to_string(),
        ids,
    };
    output.write(&data, || {
        data.ids.iter().map(|id| format!("{}\n", id)).collect()
    })
}

fn cmd_status(work_dir: &Path, output: &OutputWriter) -> Result<()> {
    let (repo, session) = open(work_dir)?;
    let status = repo.status(&session).context("Failed to compute status")?;

    let data = StatusOutput::from(status);
    output.write(&data, || data.render())
}

fn cmd_checkout(
    work_dir: &Path,
    target: Option<String>,
    file: Option<String>,
    output: &OutputWriter,
) -> Result<()> {
    let (repo, mut session) = open(work_dir)?;

    let data = match (target, file) {
        (commit, Some(file)) => {
            repo.checkout_file(&session, commit.as_deref(), &file)
                .with_context(|| format!("Failed to check out {}", file))?;
            CheckoutOutput {
                success: true,
                result_code: 0,
                branch: None,
                file: Some(file),
            }
        }
        (Some(branch), None) => {
            repo.checkout_branch(&mut session, &branch)
                .with_context(|| format!("Failed to check out branch {}", branch))?;
            save(&repo, &session)?;
            CheckoutOutput {
                success: true,
                result_code: 0,
                branch: Some(branch),
                file: None,
            }
        }
        (None, None) => anyhow::bail!("Incorrect operands: give a branch, or `-- <file>`."),
    };

    output.write(&data, || match &data.branch {
        Some(branch) => format!("Switched to branch '{}'\n", branch),
        None => String::new(),
    })
}

fn cmd_branch(work_dir: &Path, name: &str, output: &OutputWriter) -> Result<()> {
    let (repo, session) = open(work_dir)?;
    let branch = repo
        .branch(&session, name)
        .with_context(|| format!("Failed to create branch {}", name))?;

    let data = BranchOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
        head: branch.head(),
    };
    output.write(&data, String::new)
}

fn cmd_rm_branch(work_dir: &Path, name: &str, output: &OutputWriter) -> Result<()> {
    let (repo, session) = open(work_dir)?;
    repo.remove_branch(&session, name)
        .with_context(|| format!("Failed to remove branch {}", name))?;

    let data = RmBranchOutput {
        success: true,
        result_code: 0,
        name: name.to_string(),
    };
    output.write(&data, String::new)
}

fn cmd_reset(work_dir: &Path, commit: &str, output: &OutputWriter) -> Result<()> {
    let (repo, mut session) = open(work_dir)?;
    let target = repo
        .reset(&mut session, commit)
        .with_context(|| format!("Failed to reset to {}", commit))?;
    save(&repo, &session)?;

    let data = ResetOutput {
        success: true,
        result_code: 0,
        branch: session.branch.clone(),
        commit: target.id(),
    };
    output.write(&data, String::new)
}

fn cmd_merge(
    work_dir: &Path,
    branch: Option<String>,
    abort: bool,
    output: &OutputWriter,
) -> Result<()> {
    let (repo, mut session) = open(work_dir)?;

    let data = match branch {
        Some(other) if !abort => {
            let outcome = repo
                .merge(&mut session, &other)
                .with_context(|| format!("Failed to merge {}", other))?;
            save(&repo, &session)?;

            let (name, commit, conflicts) = match outcome {
                MergeOutcome::Ancestor => ("ancestor", None, Vec::new()),
                MergeOutcome::FastForward { head } => ("fast-forward", Some(head), Vec::new()),
                MergeOutcome::Merged { commit } => ("merged", Some(commit), Vec::new()),
                MergeOutcome::Conflicted { conflicts } => ("conflicted", None, conflicts),
            };
            MergeOutput {
                success: true,
                result_code: 0,
                branch: other,
                outcome: name.to_string(),
                commit,
                conflicts,
            }
        }
        _ => {
            let state = repo
                .abort_merge(&mut session)
                .context("Failed to abort merge")?;
            save(&repo, &session)?;
            MergeOutput {
                success: true,
                result_code: 0,
                branch: state.branch,
                outcome: "aborted".to_string(),
                commit: None,
                conflicts: state.conflicts,
            }
        }
    };

    output.write(&data, || match data.outcome.as_str() {
        "ancestor" => "Given branch is an ancestor of the current branch.\n".to_string(),
        "fast-forward" => "Current branch fast-forwarded.\n".to_string(),
        "conflicted" => "Encountered a merge conflict.\n".to_string(),
        "aborted" => format!("Aborted merge with {}.\n", data.branch),
        _ => String::new(),
    })
}

fn cmd_reflog(work_dir: &Path, limit: usize, output: &OutputWriter) -> Result<()> {
    let (repo, _session) = open(work_dir)?;
    let entries = repo.reflog(limit).context("Failed to read reflog")?;

    let data = ReflogOutput {
        success: true,
        result_code: 0,
        entries: entries.into_iter().map(ReflogEntryInfo::from).collect(),
    };
    output.write(&data, || {
        data.entries
            .iter()
            .map(|e| {
                format!(
                    "{} {}: {}: {}\n",
                    e.new.short(),
                    e.branch,
                    e.action,
                    e.message
                )
            })
            .collect()
    })
}

fn cmd_config(work_dir: &Path, key: &str, value: &str, output: &OutputWriter) -> Result<()> {
    let (repo, mut session) = open(work_dir)?;
    repo.set_identity(&mut session, key, value)
        .with_context(|| format!("Failed to set {}", key))?;
    save(&repo, &session)?;

    let data = ConfigOutput {
        success: true,
        result_code: 0,
        key: key.to_string(),
        value: value.to_string(),
    };
    output.write(&data, String::new)
}
