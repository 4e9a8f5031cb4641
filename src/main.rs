// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;

use trellis::daemon::{
    Daemon, DaemonAutoTester, DaemonModule, DaemonSchedule, StaticDaemonModule,
};
use trellis::demo::{CreateDirectory, PublishDailyReport, Sandbox, Settings};
use trellis::locker::DirectoryLocker;
use trellis::qualifiers::DiscreteDateTime;
use trellis::storage::SledStorage;
use trellis::task::TaskRef;

/// The demo workflow-management daemon.
#[derive(Parser, Debug)]
#[command(name = "trellis", about = "A distributed workflow-management daemon")]
struct Arguments {
    /// Log at the debug level
    #[arg(long)]
    debug: bool,

    /// Auto-test the main module's workflows
    #[arg(long)]
    test: bool,

    /// Make the demo download fail on purpose
    #[arg(long)]
    fail: bool,

    /// Artificial pause inside demo tasks, in seconds
    #[arg(long, default_value_t = 0)]
    sleep: u64,

    /// Working directory for storages and lock files
    #[arg(long, default_value = "./trellis-home")]
    root: PathBuf,

    /// Optional settings file (YAML)
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// The main module: one report per day, rebuilt continuously.
struct DailyReports {
    sandbox: Sandbox,
    settings: Settings,
    schedule: DaemonSchedule,
    pause: Duration,
    broken: bool,
}

impl DaemonModule for DailyReports {
    fn scheduling(&self) -> HashMap<Option<String>, DaemonSchedule> {
        HashMap::from([
            (None, self.schedule.clone()),
            (Some("focus".to_string()), self.schedule.clone()),
        ])
    }

    fn seed(&self, now: DateTime<Utc>) -> TaskRef {
        // one bucket per day, aligned to midnight
        let daily = DiscreteDateTime::with_offset(
            Duration::from_secs(86_400),
            Duration::ZERO,
        );
        let date = daily.quantize(now).format("%Y-%m-%d").to_string();
        TaskRef::new(PublishDailyReport {
            sandbox: self.sandbox.clone(),
            date,
            salt: self.settings.salt.clone(),
            pause: self.pause,
            broken: self.broken,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let arguments = Arguments::parse();
    let level = if arguments.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    let settings = match &arguments.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let schedule = settings.schedule()?;
    let sandbox = Sandbox::new();

    std::fs::create_dir_all(&arguments.root)?;
    let cache = Arc::new(SledStorage::open(arguments.root.join("cache"))?);
    let monitor = Arc::new(SledStorage::open(arguments.root.join("monitor"))?);
    let locker = Arc::new(DirectoryLocker::new(arguments.root.join("locks")));

    let main_module = Arc::new(DailyReports {
        sandbox: sandbox.clone(),
        settings,
        schedule,
        pause: Duration::from_secs(arguments.sleep),
        broken: arguments.fail,
    });
    // the data root must exist before any daily report is attempted
    let prelude = Arc::new(StaticDaemonModule::new(TaskRef::new(CreateDirectory {
        sandbox,
        path: "data".into(),
        pause: Duration::ZERO,
    })));

    let mut daemon = Daemon::new(main_module)
        .with_prelude(prelude)
        .with_cache(cache.clone())
        .with_locker(locker)
        .with_monitor(monitor);
    if arguments.test {
        daemon = daemon.with_autotester(DaemonAutoTester::new(cache));
    }
    daemon.run().await?;
    Ok(())
}
