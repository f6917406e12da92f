//! Command line and environment configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::bus::Subjects;

/// lbsync worker
#[derive(Parser, Debug, Clone)]
#[command(name = "lbsync-worker", version, about)]
pub struct Config {
    /// Request subject; results go to `<subject>.done` and `<subject>.error`
    #[arg(long, env = "LBSYNC_SUBJECT", default_value = "elb.update.aws")]
    pub subject: String,

    /// JSON fleet file seeding the in-memory provider
    #[arg(long, env = "LBSYNC_FLEET")]
    pub fleet: Option<PathBuf>,

    /// Compute and log plans without applying them
    #[arg(long, env = "LBSYNC_DRY_RUN")]
    pub dry_run: bool,
}

impl Config {
    pub fn subjects(&self) -> Subjects {
        Subjects::from_request(&self.subject)
    }
}
