// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::condition::{Condition, ConditionRef};
use crate::demo::sandbox::{dirname, Sandbox};
use crate::errors::{Error, Result};
use crate::helpers::sha1_hex;
use crate::monitoring::sink;
use crate::qualifiers::format_name;
use crate::runtime::Context;
use crate::task::{Annotation, Requisite, Task, TaskRef};
use crate::testing::{DefaultScenario, Scenario, ScenarioRef};

/// The classic "this path exists" condition.
///
/// The invariant ties it to its parent: a path cannot exist unless its
/// directory does. That is what gives the normalizer and the trimmer
/// something to reason with.
pub struct PathExists {
    pub sandbox: Sandbox,
    pub path: String,
}

#[async_trait]
impl Condition for PathExists {
    fn name(&self) -> String {
        format_name("PathExists", &[("path", format!("{:?}", self.path))])
    }

    async fn check(&self, _context: &Context) -> Result<bool> {
        Ok(self.sandbox.check(&self.path))
    }

    fn invariants(&self) -> Vec<ConditionRef> {
        if self.path.is_empty() {
            return Vec::new();
        }
        let this = ConditionRef::new(PathExists {
            sandbox: self.sandbox.clone(),
            path: self.path.clone(),
        });
        let parent = ConditionRef::new(PathExists {
            sandbox: self.sandbox.clone(),
            path: dirname(&self.path).to_string(),
        });
        vec![this.implies(&parent)]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Create a directory (and, recursively, its parents).
pub struct CreateDirectory {
    pub sandbox: Sandbox,
    pub path: String,
    pub pause: Duration,
}

impl CreateDirectory {
    fn parent(&self) -> Option<TaskRef> {
        let parent = dirname(&self.path);
        if parent.is_empty() {
            return None;
        }
        Some(TaskRef::new(CreateDirectory {
            sandbox: self.sandbox.clone(),
            path: parent.to_string(),
            pause: self.pause,
        }))
    }
}

#[async_trait]
impl Task for CreateDirectory {
    fn name(&self) -> String {
        format_name("CreateDirectory", &[("path", format!("{:?}", self.path))])
    }

    fn requisite(&self) -> Requisite {
        let mut requisites = vec![Requisite::Annotate(Annotation::Tests(vec![
            ScenarioRef::new(DefaultScenario),
        ]))];
        if let Some(parent) = self.parent() {
            requisites.push(Requisite::Follow(parent));
        }
        Requisite::SatisfyAll(requisites)
    }

    fn target(&self) -> Option<ConditionRef> {
        Some(ConditionRef::new(PathExists {
            sandbox: self.sandbox.clone(),
            path: self.path.clone(),
        }))
    }

    fn phony(&self) -> bool {
        false
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        context.sleep(self.pause).await?;
        self.sandbox.ensure(&self.path);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// "Download" a file into the sandbox.
pub struct DownloadFile {
    pub sandbox: Sandbox,
    pub path: String,
    pub pause: Duration,
    /// Fail on purpose, to light up the monitoring views.
    pub broken: bool,
}

pub const DOWNLOADED_DATA: &str = "real\ndata\n";

#[async_trait]
impl Task for DownloadFile {
    fn name(&self) -> String {
        format_name("DownloadFile", &[("path", format!("{:?}", self.path))])
    }

    fn requisite(&self) -> Requisite {
        Requisite::SatisfyAll(vec![
            Requisite::Follow(TaskRef::new(CreateDirectory {
                sandbox: self.sandbox.clone(),
                path: dirname(&self.path).to_string(),
                pause: self.pause,
            })),
            Requisite::Annotate(Annotation::Tests(vec![ScenarioRef::new(
                ValidateDownload {
                    sandbox: self.sandbox.clone(),
                },
            )])),
        ])
    }

    fn target(&self) -> Option<ConditionRef> {
        Some(ConditionRef::new(PathExists {
            sandbox: self.sandbox.clone(),
            path: self.path.clone(),
        }))
    }

    fn phony(&self) -> bool {
        false
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        context.sleep(self.pause).await?;
        if self.broken {
            return Err(Error::Other(anyhow::anyhow!("the upstream is gone")));
        }
        // imagine we actually download some stuff here
        self.sandbox.create(&self.path, DOWNLOADED_DATA);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Check that a real download leaves real data behind.
pub struct ValidateDownload {
    pub sandbox: Sandbox,
}

#[async_trait]
impl Scenario for ValidateDownload {
    fn name(&self) -> String {
        "ValidateDownload".into()
    }

    async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()> {
        DefaultScenario.run(subject, context).await?;
        let original = subject.unwrap_fully();
        let download = original
            .as_any()
            .downcast_ref::<DownloadFile>()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("not a download task")))?;
        let contents = self.sandbox.read(&download.path);
        if contents.as_deref() != Some(DOWNLOADED_DATA) {
            return Err(Error::Other(anyhow::anyhow!("downloaded garbage")));
        }
        Ok(())
    }

    fn stub(
        &self,
        _subject: &TaskRef,
        dependencies: &HashSet<TaskRef>,
    ) -> HashMap<TaskRef, ScenarioRef> {
        DefaultScenario.stub(_subject, dependencies)
    }
}

/// Pretend a file was downloaded by planting fixture data.
pub struct MockDownload {
    pub sandbox: Sandbox,
    pub data: String,
}

#[async_trait]
impl Scenario for MockDownload {
    fn name(&self) -> String {
        format_name("MockDownload", &[("data", format!("{:?}", self.data))])
    }

    async fn run(&self, subject: &TaskRef, _context: &Context) -> Result<()> {
        let original = subject.unwrap_fully();
        let download = original
            .as_any()
            .downcast_ref::<DownloadFile>()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("not a download task")))?;
        self.sandbox.create(&download.path, &self.data);
        Ok(())
    }

    fn stub(
        &self,
        _subject: &TaskRef,
        _dependencies: &HashSet<TaskRef>,
    ) -> HashMap<TaskRef, ScenarioRef> {
        HashMap::new()
    }
}

/// Hash every line of the input file with a salt.
pub struct HashEachLine {
    pub sandbox: Sandbox,
    pub input_file: String,
    pub output_file: String,
    pub salt: String,
    pub pause: Duration,
}

#[async_trait]
impl Task for HashEachLine {
    fn name(&self) -> String {
        format_name(
            "HashEachLine",
            &[
                ("input_file", format!("{:?}", self.input_file)),
                ("output_file", format!("{:?}", self.output_file)),
                ("salt", format!("{:?}", self.salt)),
            ],
        )
    }

    fn requisite(&self) -> Requisite {
        Requisite::SatisfyAll(vec![
            Requisite::Follow(TaskRef::new(CreateDirectory {
                sandbox: self.sandbox.clone(),
                path: dirname(&self.output_file).to_string(),
                pause: self.pause,
            })),
            Requisite::Annotate(Annotation::Tests(vec![ScenarioRef::new(
                ValidateHashes {
                    sandbox: self.sandbox.clone(),
                },
            )])),
        ])
    }

    fn target(&self) -> Option<ConditionRef> {
        Some(ConditionRef::new(PathExists {
            sandbox: self.sandbox.clone(),
            path: self.output_file.clone(),
        }))
    }

    fn phony(&self) -> bool {
        false
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        sink::log("hashing each input line");
        context.sleep(self.pause).await?;
        let input = self
            .sandbox
            .read(&self.input_file)
            .ok_or_else(|| Error::Other(anyhow::anyhow!("no input to hash")))?;
        let output: String = input
            .lines()
            .map(|line| format!("{}\n", sha1_hex(&format!("{}{}", self.salt, line))))
            .collect();
        self.sandbox.create(&self.output_file, &output);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Feed the hasher fixture data and check the shape of the digest list.
pub struct ValidateHashes {
    pub sandbox: Sandbox,
}

pub const FIXTURE_DATA: &str = "fake\ndata\n";

#[async_trait]
impl Scenario for ValidateHashes {
    fn name(&self) -> String {
        "ValidateHashes".into()
    }

    async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()> {
        DefaultScenario.run(subject, context).await?;
        let original = subject.unwrap_fully();
        let hasher = original
            .as_any()
            .downcast_ref::<HashEachLine>()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("not a hashing task")))?;
        let output = self
            .sandbox
            .read(&hasher.output_file)
            .ok_or_else(|| Error::Other(anyhow::anyhow!("no output")))?;
        let lines: Vec<&str> = output.lines().collect();
        if lines.len() != 2 || lines.iter().any(|line| line.len() != 40) {
            return Err(Error::Other(anyhow::anyhow!("hashes look wrong")));
        }
        Ok(())
    }

    fn stub(
        &self,
        subject: &TaskRef,
        dependencies: &HashSet<TaskRef>,
    ) -> HashMap<TaskRef, ScenarioRef> {
        let mut stubs = DefaultScenario.stub(subject, dependencies);
        for dependency in dependencies {
            if dependency.name().starts_with("DownloadFile(") {
                stubs.insert(
                    dependency.clone(),
                    ScenarioRef::new(MockDownload {
                        sandbox: self.sandbox.clone(),
                        data: FIXTURE_DATA.into(),
                    }),
                );
            }
        }
        stubs
    }
}

/// Pick the first letter of every line. Runs on the "focus" tag.
pub struct PickFirstLetters {
    pub sandbox: Sandbox,
    pub input_file: String,
    pub output_file: String,
    pub pause: Duration,
}

#[async_trait]
impl Task for PickFirstLetters {
    fn name(&self) -> String {
        format_name(
            "PickFirstLetters",
            &[
                ("input_file", format!("{:?}", self.input_file)),
                ("output_file", format!("{:?}", self.output_file)),
            ],
        )
    }

    fn requisite(&self) -> Requisite {
        Requisite::SatisfyAll(vec![
            Requisite::Annotate(Annotation::Tag("focus".into())),
            Requisite::Follow(TaskRef::new(CreateDirectory {
                sandbox: self.sandbox.clone(),
                path: dirname(&self.output_file).to_string(),
                pause: self.pause,
            })),
            Requisite::Annotate(Annotation::Tests(vec![ScenarioRef::new(
                ValidateFirstLetters {
                    sandbox: self.sandbox.clone(),
                },
            )])),
        ])
    }

    fn target(&self) -> Option<ConditionRef> {
        Some(ConditionRef::new(PathExists {
            sandbox: self.sandbox.clone(),
            path: self.output_file.clone(),
        }))
    }

    fn phony(&self) -> bool {
        false
    }

    async fn execute(&self, context: &Context) -> Result<()> {
        context.sleep(self.pause).await?;
        let input = self
            .sandbox
            .read(&self.input_file)
            .ok_or_else(|| Error::Other(anyhow::anyhow!("no input to pick from")))?;
        let output: String = input
            .lines()
            .filter_map(|line| line.chars().next())
            .collect();
        self.sandbox.create(&self.output_file, &output);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Check the picker against fixture data.
pub struct ValidateFirstLetters {
    pub sandbox: Sandbox,
}

#[async_trait]
impl Scenario for ValidateFirstLetters {
    fn name(&self) -> String {
        "ValidateFirstLetters".into()
    }

    async fn run(&self, subject: &TaskRef, context: &Context) -> Result<()> {
        DefaultScenario.run(subject, context).await?;
        let original = subject.unwrap_fully();
        let picker = original
            .as_any()
            .downcast_ref::<PickFirstLetters>()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("not a picking task")))?;
        let output = self
            .sandbox
            .read(&picker.output_file)
            .ok_or_else(|| Error::Other(anyhow::anyhow!("no output")))?;
        if output != "fd" {
            return Err(Error::Other(anyhow::anyhow!("picked the wrong letters")));
        }
        Ok(())
    }

    fn stub(
        &self,
        subject: &TaskRef,
        dependencies: &HashSet<TaskRef>,
    ) -> HashMap<TaskRef, ScenarioRef> {
        let mut stubs = DefaultScenario.stub(subject, dependencies);
        for dependency in dependencies {
            if dependency.name().starts_with("DownloadFile(") {
                stubs.insert(
                    dependency.clone(),
                    ScenarioRef::new(MockDownload {
                        sandbox: self.sandbox.clone(),
                        data: FIXTURE_DATA.into(),
                    }),
                );
            }
        }
        stubs
    }
}

/// The per-day root: aggregates the day's artifacts and wires the chain.
pub struct PublishDailyReport {
    pub sandbox: Sandbox,
    pub date: String,
    pub salt: String,
    pub pause: Duration,
    pub broken: bool,
}

impl PublishDailyReport {
    fn download(&self) -> TaskRef {
        TaskRef::new(DownloadFile {
            sandbox: self.sandbox.clone(),
            path: format!("data/{}/input", self.date),
            pause: self.pause,
            broken: self.broken,
        })
    }

    fn hasher(&self) -> TaskRef {
        TaskRef::new(HashEachLine {
            sandbox: self.sandbox.clone(),
            input_file: format!("data/{}/input", self.date),
            output_file: format!("data/{}/hashes", self.date),
            salt: self.salt.clone(),
            pause: self.pause,
        })
    }

    fn picker(&self) -> TaskRef {
        TaskRef::new(PickFirstLetters {
            sandbox: self.sandbox.clone(),
            input_file: format!("data/{}/input", self.date),
            output_file: format!("data/{}/letters", self.date),
            pause: self.pause,
        })
    }
}

#[async_trait]
impl Task for PublishDailyReport {
    fn name(&self) -> String {
        format_name(
            "PublishDailyReport",
            &[("date", format!("{:?}", self.date))],
        )
    }

    fn requisite(&self) -> Requisite {
        let download = self.download();
        let hasher = self.hasher();
        let picker = self.picker();
        Requisite::SatisfyAll(vec![
            Requisite::Follow(hasher.clone()),
            Requisite::Follow(picker.clone()),
            Requisite::Assign(hasher, Box::new(Requisite::Follow(download.clone()))),
            Requisite::Assign(picker, Box::new(Requisite::Follow(download))),
            Requisite::Annotate(Annotation::Baggage(HashMap::from([(
                "date".to_string(),
                self.date.clone(),
            )]))),
        ])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
