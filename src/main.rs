//! git-source - dump the content a secret scanner would see
//!
//! # Usage
//! ```bash
//! git-source . --commit-messages --commit-files --commit-count 20
//! git-source git@github.com:acme/widget.git --staged-files
//! RUST_LOG=info git-source /path/to/repo --commit-files
//! ```

use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use git_source::models::options::{
    ACCEPT_ANY_HOST_KEY, CLONE_TIMEOUT, COMMIT_COUNT, COMMIT_FILES, COMMIT_MESSAGES, SSH_CONFIG,
    STAGED_FILES, STRICT_TREE_WALK,
};
use git_source::{LoadOptions, Metadata, Object, Origin, SOURCE_TYPE, SourceRegistry};

/// Extract file blobs and commit messages from a git repository
#[derive(Parser)]
#[command(name = "git-source")]
#[command(about = "Extract candidate content from a git repository", long_about = None)]
struct Cli {
    /// Local path or remote URI (https://, git://, ssh://, git@host:org/repo.git)
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Include the files of every visited commit
    #[arg(long)]
    commit_files: bool,

    /// Include the message of every visited commit
    #[arg(long)]
    commit_messages: bool,

    /// Include files staged in the index
    #[arg(long)]
    staged_files: bool,

    /// Visit only the N most recent commits (0 = all)
    #[arg(long, default_value = "0", value_name = "N")]
    commit_count: i64,

    /// Accept any server certificate or host key when cloning
    #[arg(long)]
    accept_any_host_key: bool,

    /// Abort a clone that takes longer than this
    #[arg(long, value_name = "SECS")]
    clone_timeout: Option<u64>,

    /// SSH client configuration to read keys from (default ~/.ssh/config)
    #[arg(long, value_name = "PATH")]
    ssh_config: Option<PathBuf>,

    /// Fail instead of skipping commits whose tree cannot be read
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::new();
        options.insert(COMMIT_FILES.into(), Value::Bool(self.commit_files));
        options.insert(COMMIT_MESSAGES.into(), Value::Bool(self.commit_messages));
        options.insert(STAGED_FILES.into(), Value::Bool(self.staged_files));
        options.insert(COMMIT_COUNT.into(), self.commit_count.into());
        options.insert(ACCEPT_ANY_HOST_KEY.into(), Value::Bool(self.accept_any_host_key));
        options.insert(STRICT_TREE_WALK.into(), Value::Bool(self.strict));
        if let Some(secs) = self.clone_timeout {
            options.insert(CLONE_TIMEOUT.into(), secs.into());
        }
        if let Some(path) = &self.ssh_config {
            options.insert(SSH_CONFIG.into(), path.to_string_lossy().into_owned().into());
        }
        options
    }
}

/// One output line per object
#[derive(Serialize)]
struct ObjectLine<'a> {
    id: &'a str,
    origin: Origin,
    size: usize,
    metadata: &'a Metadata,
    content: Cow<'a, str>,
}

impl<'a> From<&'a Object> for ObjectLine<'a> {
    fn from(o: &'a Object) -> Self {
        Self {
            id: &o.id,
            origin: o.origin,
            size: o.content.len(),
            metadata: &o.metadata,
            content: String::from_utf8_lossy(&o.content),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut registry = SourceRegistry::new();
    git_source::register(&mut registry);

    let source = registry
        .get(SOURCE_TYPE)
        .ok_or_else(|| anyhow::anyhow!("source {} is not registered", SOURCE_TYPE))?;

    let objects = match source.load_objects(&cli.source, &cli.load_options()) {
        Ok(objects) => objects,
        Err(e) => {
            eprintln!("✗ Failed to load objects: {}", e);
            eprintln!("  Source: {}", cli.source);
            std::process::exit(1);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for object in &objects {
        serde_json::to_writer(&mut out, &ObjectLine::from(object))?;
        writeln!(out)?;
    }

    tracing::info!("Wrote {} objects", objects.len());

    Ok(())
}
