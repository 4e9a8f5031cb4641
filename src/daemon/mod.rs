// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The daemon: build and execute workflows on a regular basis, forever.
//!
//! A daemon runs up to three modules. The optional *prelude* runs once and
//! must finish successfully before the *main* module starts; *main* runs
//! persistently; the optional *support* module runs in parallel with both.
//! Each module splits into one branch per tag of its scheduling; a branch
//! keeps one builder worker (rebuilding the workflow into a shared box on
//! its building delay) and N executor workers (peeking the box and running
//! what they find on their execution delay).
//!
//! Above the launchers sit the monitoring consumer and the watcher. SIGINT
//! and SIGTERM cancel the root context; cancellation cascades down the
//! invoker tree, with interruption timeouts shrinking at every level so
//! inner layers wind down before outer layers give up and kill.

mod autotester;
mod module;
mod schedule;

pub use autotester::DaemonAutoTester;
pub use module::{DaemonModule, StaticDaemonModule};
pub use schedule::DaemonSchedule;

use std::sync::Arc;
use std::time::Duration;

use crate::consumer::QueueConsumer;
use crate::errors::Result;
use crate::helpers::{now, Flag, SharedBox};
use crate::locker::Locker;
use crate::managers::{CascadeManager, Manager};
use crate::monitoring::{MonitorWatcher, MonitoringAgent};
use crate::runtime::{action, Action, Context, MasterSlaveInvoker, PersistentInvoker};
use crate::storage::Storage;
use crate::workflow::executors::{BasicExecutor, ManagedExecutor, MonitoringExecutor};
use crate::workflow::processors::{
    TagFilter, TargetCacher, TargetLocker, TargetPostChecker, TaskFreezer, TaskRanker,
    WorkflowNormalizer, WorkflowTrimmer,
};
use crate::workflow::{Workflow, WorkflowBuilder, WorkflowExecutor, WorkflowProcessor};

const CONSUMER_CAPACITY: usize = 4096;
const CONSUMER_BACKOFF: Duration = Duration::from_secs(1);
const WATCHER_DELAY: Duration = Duration::from_secs(3);

/// A workflow-management daemon.
#[derive(Clone)]
pub struct Daemon {
    main: Arc<dyn DaemonModule>,
    prelude: Option<Arc<dyn DaemonModule>>,
    support: Option<Arc<dyn DaemonModule>>,
    cache: Option<Arc<dyn Storage>>,
    locker: Option<Arc<dyn Locker>>,
    monitor: Option<Arc<dyn Storage>>,
    consumer: Option<Arc<QueueConsumer>>,
    autotester: Option<Arc<DaemonAutoTester>>,
    manager: Arc<dyn Manager>,
    interruption_timeout: Duration,
}

impl Daemon {
    pub fn new(main: Arc<dyn DaemonModule>) -> Self {
        Self {
            main,
            prelude: None,
            support: None,
            cache: None,
            locker: None,
            monitor: None,
            consumer: None,
            autotester: None,
            manager: Arc::new(CascadeManager::default()),
            interruption_timeout: Duration::from_secs(60),
        }
    }

    /// Run this module once before the main module starts.
    pub fn with_prelude(mut self, prelude: Arc<dyn DaemonModule>) -> Self {
        self.prelude = Some(prelude);
        self
    }

    /// Run this module in parallel with everything else.
    pub fn with_support(mut self, support: Arc<dyn DaemonModule>) -> Self {
        self.support = Some(support);
        self
    }

    /// Cache true targets in this storage.
    pub fn with_cache(mut self, cache: Arc<dyn Storage>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Deduplicate task execution with this locker.
    pub fn with_locker(mut self, locker: Arc<dyn Locker>) -> Self {
        self.locker = Some(locker);
        self
    }

    /// Report progress into this storage (and run the watcher over it).
    pub fn with_monitor(mut self, monitor: Arc<dyn Storage>) -> Self {
        let sink = monitor.clone();
        self.consumer = Some(Arc::new(QueueConsumer::new(
            move |(key, value): (String, String)| {
                sink.put(&key, &value)?;
                Ok(())
            },
            CONSUMER_CAPACITY,
            CONSUMER_BACKOFF,
        )));
        self.monitor = Some(monitor);
        self
    }

    /// Auto-test the main module's workflows.
    pub fn with_autotester(mut self, autotester: DaemonAutoTester) -> Self {
        self.autotester = Some(Arc::new(autotester));
        self
    }

    /// Enclose building and execution in this manager.
    pub fn with_manager(mut self, manager: Arc<dyn Manager>) -> Self {
        self.manager = manager;
        self
    }

    /// Give interrupted workers this long before killing them. Outer
    /// supervision layers get twice as much.
    pub fn with_interruption_timeout(mut self, timeout: Duration) -> Self {
        self.interruption_timeout = timeout;
        self
    }

    /// Start the daemon and run until a signal stops it.
    pub async fn run(&self) -> Result<()> {
        let context = Context::root();
        install_signal_handlers(&context);
        tracing::info!("daemon starting");
        match self.supervise(&context).await {
            Err(error) if error.is_interruption() => {
                tracing::info!("daemon stopped: {error}");
                Ok(())
            }
            outcome => outcome,
        }
    }

    /// The top-level supervision tree, driven by the given context. Exposed
    /// for embedding the daemon into an existing runtime.
    pub async fn supervise(&self, context: &Context) -> Result<()> {
        let mut children: Vec<(String, Action)> = Vec::new();
        if let (Some(monitor), Some(consumer)) = (&self.monitor, &self.consumer) {
            let consumer = consumer.clone();
            children.push((
                "consumer".into(),
                action(move |context: Context| {
                    let consumer = consumer.clone();
                    async move { consumer.consume(&context).await }
                }),
            ));
            let monitor = monitor.clone();
            children.push((
                "watcher".into(),
                action(move |context: Context| {
                    let monitor = monitor.clone();
                    async move {
                        let watcher = Arc::new(MonitorWatcher::new(monitor));
                        let cycle = action(move |context: Context| {
                            let watcher = watcher.clone();
                            async move { watcher.run(&context, WATCHER_DELAY).await }
                        });
                        PersistentInvoker::new(cycle, WATCHER_DELAY)
                            .invoke(&context)
                            .await
                    }
                }),
            ));
        }
        if let Some(support) = &self.support {
            let daemon = self.clone();
            let support = support.clone();
            children.push((
                "launcher#support".into(),
                action(move |context: Context| {
                    let daemon = daemon.clone();
                    let support = support.clone();
                    async move {
                        daemon
                            .run_module("support", support, true, false, &context)
                            .await
                    }
                }),
            ));
        }
        let daemon = self.clone();
        children.push((
            "launcher#main".into(),
            action(move |context: Context| {
                let daemon = daemon.clone();
                async move {
                    if let Some(prelude) = &daemon.prelude {
                        daemon
                            .run_module("prelude", prelude.clone(), false, false, &context)
                            .await?;
                    }
                    daemon
                        .run_module("main", daemon.main.clone(), true, true, &context)
                        .await
                }
            }),
        ));
        MasterSlaveInvoker::new(children)
            .with_interruption_timeout(2 * self.interruption_timeout)
            .invoke(context)
            .await
    }

    async fn run_module(
        &self,
        name: &str,
        module: Arc<dyn DaemonModule>,
        sustain: bool,
        testable: bool,
        context: &Context,
    ) -> Result<()> {
        let mut branches: Vec<(String, Action)> = Vec::new();
        for (tag, schedule) in module.scheduling() {
            let label = match &tag {
                None => name.to_string(),
                Some(tag) => format!("{name}#{tag}"),
            };
            let daemon = self.clone();
            let module = module.clone();
            let branch_label = label.clone();
            branches.push((
                label,
                action(move |context: Context| {
                    let daemon = daemon.clone();
                    let module = module.clone();
                    let tag = tag.clone();
                    let schedule = schedule.clone();
                    let branch_label = branch_label.clone();
                    async move {
                        daemon
                            .run_module_branch(
                                &branch_label,
                                module,
                                tag,
                                schedule,
                                sustain,
                                testable,
                                &context,
                            )
                            .await
                    }
                }),
            ));
        }
        MasterSlaveInvoker::new(branches)
            .with_interruption_timeout(2 * self.interruption_timeout)
            .invoke(context)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_module_branch(
        &self,
        label: &str,
        module: Arc<dyn DaemonModule>,
        tag: Option<String>,
        schedule: DaemonSchedule,
        sustain: bool,
        testable: bool,
        context: &Context,
    ) -> Result<()> {
        let shelf: SharedBox<Arc<Workflow>> = SharedBox::new();
        let completion = Flag::new();
        let builder = {
            let daemon = self.clone();
            let module = module.clone();
            let tag = tag.clone();
            let shelf = shelf.clone();
            action(move |context: Context| {
                let daemon = daemon.clone();
                let module = module.clone();
                let tag = tag.clone();
                let shelf = shelf.clone();
                async move {
                    daemon
                        .build(module.as_ref(), tag, testable, &shelf, &context)
                        .await
                }
            })
        };
        let mut workers: Vec<(String, Action)> = Vec::new();
        {
            let delay = schedule.building_delay;
            workers.push((
                "builder".into(),
                action(move |context: Context| {
                    let builder = builder.clone();
                    async move {
                        PersistentInvoker::new(builder, delay).invoke(&context).await
                    }
                }),
            ));
        }
        let mut runners: Vec<(String, Action)> = Vec::new();
        for index in 0..schedule.executor_count {
            let worker_label = format!("executor-{}", index + 1);
            let executor = self.executor(&format!("{label}:{worker_label}"));
            let shelf = shelf.clone();
            let completion = completion.clone();
            let delay = schedule.execution_delay;
            runners.push((
                worker_label,
                action(move |context: Context| {
                    let executor = executor.clone();
                    let shelf = shelf.clone();
                    let completion = completion.clone();
                    async move {
                        let attempt = {
                            let executor = executor.clone();
                            let shelf = shelf.clone();
                            let completion = completion.clone();
                            action(move |context: Context| {
                                let executor = executor.clone();
                                let shelf = shelf.clone();
                                let completion = completion.clone();
                                async move {
                                    if !sustain && completion.raised() {
                                        return Ok(());
                                    }
                                    let Some(workflow) = shelf.peek() else {
                                        return Ok(());
                                    };
                                    executor.execute(&workflow, &context).await?;
                                    if !sustain {
                                        completion.up();
                                    }
                                    Ok(())
                                }
                            })
                        };
                        PersistentInvoker::new(attempt, delay).invoke(&context).await
                    }
                }),
            ));
        }
        {
            let timeout = self.interruption_timeout;
            workers.push((
                "executor".into(),
                action(move |context: Context| {
                    let runners = runners.clone();
                    async move {
                        MasterSlaveInvoker::new(runners)
                            .with_interruption_timeout(timeout)
                            .invoke(&context)
                            .await
                    }
                }),
            ));
        }
        // a local scope lets the branch retire itself upon completion
        let local = context.child();
        if !sustain {
            let completion = completion.clone();
            let scope = local.clone();
            tokio::spawn(async move {
                loop {
                    if completion.raised() {
                        scope.cancel();
                        return;
                    }
                    if scope.is_cancelled() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            });
        }
        let outcome = MasterSlaveInvoker::new(workers)
            .with_interruption_timeout(2 * self.interruption_timeout)
            .invoke(&local)
            .await;
        if !sustain && completion.raised() {
            tracing::info!("branch `{label}` finished successfully");
            return Ok(());
        }
        outcome
    }

    async fn build(
        &self,
        module: &dyn DaemonModule,
        tag: Option<String>,
        testable: bool,
        shelf: &SharedBox<Arc<Workflow>>,
        context: &Context,
    ) -> Result<()> {
        let root = module.seed(now());
        let mut workflow = WorkflowBuilder::new().build(root)?;
        self.manager.acquire().await?;
        let outcome = self.process(&mut workflow, tag, testable, context).await;
        let parting = self.manager.release().await;
        outcome.and(parting)?;
        shelf.put(Arc::new(workflow));
        Ok(())
    }

    async fn process(
        &self,
        workflow: &mut Workflow,
        tag: Option<String>,
        testable: bool,
        context: &Context,
    ) -> Result<()> {
        if testable {
            if let Some(autotester) = &self.autotester {
                autotester.testify(workflow, context).await?;
            }
        }
        TaskFreezer.process(workflow, context).await?;
        WorkflowNormalizer.process(workflow, context).await?;
        TagFilter::new(tag).process(workflow, context).await?;
        if let Some(cache) = &self.cache {
            TargetCacher::new(cache.clone())
                .process(workflow, context)
                .await?;
        }
        WorkflowTrimmer.process(workflow, context).await?;
        TargetPostChecker.process(workflow, context).await?;
        if let Some(locker) = &self.locker {
            TargetLocker::new(locker.clone())
                .process(workflow, context)
                .await?;
        }
        TaskRanker.process(workflow, context).await
    }

    fn executor(&self, worker: &str) -> Arc<dyn WorkflowExecutor> {
        let mut result: Arc<dyn WorkflowExecutor> = Arc::new(BasicExecutor);
        if let (Some(monitor), Some(consumer)) = (&self.monitor, &self.consumer) {
            let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".into());
            let agent_name = format!("{host}:{}:{worker}", std::process::id());
            let agent = MonitoringAgent::new(&agent_name, monitor.clone())
                .with_consumer(consumer.clone());
            result = Arc::new(MonitoringExecutor::new(result, agent));
        }
        Arc::new(ManagedExecutor::new(result, self.manager.clone()))
    }
}

fn install_signal_handlers(context: &Context) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let trigger = context.clone();
        tokio::spawn(async move {
            let mut interrupt = match signal(SignalKind::interrupt()) {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!("cannot listen for SIGINT: {error}");
                    return;
                }
            };
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!("cannot listen for SIGTERM: {error}");
                    return;
                }
            };
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            tracing::info!("SIGINT/SIGTERM received");
            trigger.cancel();
        });
    }
    #[cfg(not(unix))]
    {
        let trigger = context.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::testkit::Constant;
    use crate::storage::InMemoryStorage;
    use crate::task::testkit::{journal, Probe};
    use std::collections::HashMap;

    fn quick_schedule() -> DaemonSchedule {
        DaemonSchedule {
            building_delay: Duration::from_millis(20),
            execution_delay: Duration::from_millis(10),
            executor_count: 1,
        }
    }

    #[tokio::test]
    async fn test_prelude_branch_retires_after_success() {
        let log = journal();
        let task = Probe::active("PreludeWork", &log).build();
        let module = Arc::new(
            StaticDaemonModule::new(task)
                .with_scheduling(HashMap::from([(None, quick_schedule())])),
        );
        let daemon = Daemon::new(module.clone());
        let context = Context::root();
        daemon
            .run_module("prelude", module, false, false, &context)
            .await
            .unwrap();
        assert!(!log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_supervise_stops_on_cancellation() {
        let log = journal();
        let task = Probe::active("MainWork", &log).build();
        let module = Arc::new(
            StaticDaemonModule::new(task)
                .with_scheduling(HashMap::from([(None, quick_schedule())])),
        );
        let monitor: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let daemon = Daemon::new(module)
            .with_monitor(monitor.clone())
            .with_interruption_timeout(Duration::from_millis(300));
        let context = Context::root();
        let trigger = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            trigger.cancel();
        });
        let error = daemon.supervise(&context).await.unwrap_err();
        assert!(error.is_interruption());
        // the main branch had time to run the workflow at least once
        assert!(!log.lock().unwrap().is_empty());
        // and the agent left a registration behind
        assert!(!monitor.get("agent", None, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_pipeline_fills_the_box() {
        let done = Constant::of("daemon/Done", true);
        let pending = Constant::of("daemon/Pending", false);
        let head = Probe::phony("Head").aiming(&done).build();
        let tail = Probe::phony("Tail").after(&head).aiming(&pending).build();
        let module = Arc::new(StaticDaemonModule::new(tail.clone()));
        let daemon = Daemon::new(module.clone());
        let shelf = SharedBox::new();
        daemon
            .build(module.as_ref(), None, false, &shelf, &Context::root())
            .await
            .unwrap();
        let workflow = shelf.peek().unwrap();
        // ranked and ready for the executors
        for task in workflow.items() {
            assert!(workflow.node(task).annotation.rank.is_some());
        }
    }
}
