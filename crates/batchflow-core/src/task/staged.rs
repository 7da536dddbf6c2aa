//! Staged task engine.
//!
//! `StagedTask<W>` owns the generic state machine: it builds each stage's
//! sub-tasks through its [`Workflow`], aggregates their statuses, advances,
//! restarts or finishes, and writes the YAML report. The workflow only says
//! what to run and what the results mean.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::{JobTask, Task};
use crate::domain::{
    ChildReport, Decision, Job, Observables, RelaxationSettings, StageReport, Step, TaskId,
    TaskReport, TaskStatus, Traverse,
};
use crate::error::{BatchflowError, Result};
use crate::impls::JsonResultReader;
use crate::ports::OutputReader;

/// Every sub-task ever created, indexed by stage.
///
/// A skipped stage keeps an empty slot; a restarted stage has its slot
/// replaced.
#[derive(Default)]
pub struct History {
    stages: Vec<Vec<Box<dyn Task>>>,
}

impl History {
    pub fn stage(&self, stage: usize) -> &[Box<dyn Task>] {
        self.stages.get(stage).map(Vec::as_slice).unwrap_or_default()
    }

    fn stage_mut(&mut self, stage: usize) -> &mut [Box<dyn Task>] {
        self.stages
            .get_mut(stage)
            .map(Vec::as_mut_slice)
            .unwrap_or_default()
    }

    /// Observables of the `index`-th sub-task of `stage`.
    pub fn observables(&self, stage: usize, index: usize) -> Option<&Observables> {
        self.stage(stage).get(index)?.observables()
    }

    /// Observables of the sub-task named `name` in `stage`.
    pub fn observables_of(&self, stage: usize, name: &str) -> Option<&Observables> {
        self.stage(stage)
            .iter()
            .find(|task| task.name() == name)?
            .observables()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn replace(&mut self, stage: usize, tasks: Vec<Box<dyn Task>>) {
        if self.stages.len() <= stage {
            self.stages.resize_with(stage + 1, Vec::new);
        }
        self.stages[stage] = tasks;
    }
}

/// What a workflow needs to create sub-tasks for one stage.
pub struct StageContext<'a> {
    pub stage: usize,
    dir: &'a Path,
    name: &'a str,
    job: &'a Job,
    traverse: Traverse,
    reader: &'a Arc<dyn OutputReader>,
}

impl StageContext<'_> {
    /// Directory of the task whose stage is being built.
    pub fn dir(&self) -> &Path {
        self.dir
    }

    pub fn traverse(&self) -> Traverse {
        self.traverse
    }

    /// A leaf running the bound job in `<dir>/<dir_name>`.
    pub fn job_task(&self, dir_name: &str, inputs: serde_json::Value) -> Box<dyn Task> {
        let job = self.job.copy(Some(&format!("{}-{dir_name}", self.name)));
        Box::new(
            JobTask::new(self.dir.join(dir_name), job, inputs)
                .with_traverse(self.traverse)
                .with_reader(Arc::clone(self.reader)),
        )
    }

    /// A nested staged task in `<dir>/<dir_name>`.
    pub fn staged<W: Workflow + 'static>(&self, dir_name: &str, workflow: W) -> Box<dyn Task> {
        Box::new(
            StagedTask::new(self.dir.join(dir_name), workflow)
                .with_job(self.job.copy(None))
                .with_traverse(self.traverse)
                .with_reader(Arc::clone(self.reader)),
        )
    }
}

/// The workflow-specific half of a staged task.
pub trait Workflow: Send {
    fn kind(&self) -> &'static str;

    /// Stages below this one are skipped (e.g. an already relaxed cell).
    fn first_stage(&self) -> usize {
        0
    }

    /// Status shown while `stage` is running.
    fn stage_label(&self, stage: usize) -> String;

    fn build_stage(&self, ctx: &StageContext<'_>, history: &History)
    -> Result<Vec<Box<dyn Task>>>;

    /// Called once every sub-task of `stage` finished without terminating.
    fn decide(&self, stage: usize, history: &History) -> Decision;

    /// Final derivation. Runs once, after the last stage; errors abort the run.
    fn finish(&mut self, history: &History) -> Result<Observables>;

    fn settings(&self) -> Option<&RelaxationSettings> {
        None
    }

    fn report_fields(&self, _history: &History) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }
}

pub struct StagedTask<W: Workflow> {
    id: TaskId,
    name: String,
    work_dir: PathBuf,
    traverse: Traverse,
    status: TaskStatus,
    stage: usize,
    workflow: W,
    job: Option<Job>,
    reader: Arc<dyn OutputReader>,
    history: History,
    result: Option<Observables>,
    begun: bool,
    retired: bool,
}

impl<W: Workflow> StagedTask<W> {
    pub fn new(work_dir: impl Into<PathBuf>, workflow: W) -> Self {
        let work_dir = work_dir.into();
        let name = work_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| work_dir.display().to_string());
        Self {
            id: TaskId::allocate(),
            name,
            work_dir,
            traverse: Traverse::Off,
            status: TaskStatus::Preparing,
            stage: 0,
            workflow,
            job: None,
            reader: Arc::new(JsonResultReader),
            history: History::default(),
            result: None,
            begun: false,
            retired: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bind the job template sub-tasks are created from.
    pub fn with_job(mut self, job: Job) -> Self {
        self.job = Some(job);
        self
    }

    pub fn with_traverse(mut self, traverse: Traverse) -> Self {
        self.traverse = traverse;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn OutputReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn workflow(&self) -> &W {
        &self.workflow
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    fn enter_stage(&mut self) -> Result<Vec<TaskId>> {
        let tasks = {
            let job = self.job.as_ref().ok_or_else(|| {
                BatchflowError::Precondition(format!("{} has no job bound", self.name))
            })?;
            let ctx = StageContext {
                stage: self.stage,
                dir: &self.work_dir,
                name: &self.name,
                job,
                traverse: self.traverse,
                reader: &self.reader,
            };
            self.workflow.build_stage(&ctx, &self.history)?
        };
        let ids = tasks.iter().map(|task| task.id()).collect();
        self.history.replace(self.stage, tasks);
        self.status = TaskStatus::Stage(self.workflow.stage_label(self.stage));
        Ok(ids)
    }

    fn advance(&mut self) -> Result<Step> {
        let step = match self.status.clone() {
            TaskStatus::Next => match self.workflow.decide(self.stage, &self.history) {
                Decision::Advance => {
                    self.stage += 1;
                    let ids = self.enter_stage()?;
                    info!(task = %self.id, name = %self.name, stage = self.stage, status = %self.status, "stage advanced");
                    Step::Continue(ids)
                }
                Decision::Complete => {
                    let result = self.workflow.finish(&self.history)?;
                    self.result = Some(result);
                    self.status = TaskStatus::Done;
                    Step::Terminal(TaskStatus::Done)
                }
                Decision::MaxIteration => {
                    self.status = TaskStatus::MaxIteration;
                    Step::Terminal(TaskStatus::MaxIteration)
                }
                Decision::Terminate { reason } => {
                    info!(task = %self.id, name = %self.name, %reason, "results unusable");
                    self.status = TaskStatus::Terminate;
                    Step::Terminal(TaskStatus::Terminate)
                }
            },
            TaskStatus::Terminate if self.traverse == Traverse::Restart => {
                self.traverse = Traverse::Off;
                let ids = self.enter_stage()?;
                info!(task = %self.id, name = %self.name, stage = self.stage, "stage rebuilt for restart");
                Step::Continue(ids)
            }
            status if status.is_terminal() => Step::Terminal(status),
            status => {
                return Err(BatchflowError::Precondition(format!(
                    "next() on {} while it is {status}",
                    self.id
                )));
            }
        };

        if let Step::Terminal(status) = &step {
            self.retired = true;
            info!(task = %self.id, name = %self.name, kind = self.workflow.kind(), %status, "task finished");
        }
        self.write_report()?;
        Ok(step)
    }

    pub fn report(&self) -> TaskReport {
        let stages = self
            .history
            .stages
            .iter()
            .enumerate()
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(stage, tasks)| StageReport {
                stage,
                tasks: tasks
                    .iter()
                    .map(|task| ChildReport {
                        id: task.id().to_string(),
                        name: task.name().to_string(),
                        status: task.status().to_string(),
                    })
                    .collect(),
            })
            .collect();
        TaskReport {
            task_type: self.workflow.kind().to_string(),
            name: self.name.clone(),
            directory: self.work_dir.clone(),
            stage: self.stage,
            status: self.status.to_string(),
            traverse: self.traverse.to_string(),
            settings: self.workflow.settings().cloned(),
            stages,
            result: self.result.clone(),
            fields: self.workflow.report_fields(&self.history),
            updated_at: Utc::now(),
        }
    }

    fn write_report(&self) -> Result<()> {
        self.report().write()?;
        Ok(())
    }
}

impl<W: Workflow> Task for StagedTask<W> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.workflow.kind()
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn stage(&self) -> usize {
        self.stage
    }

    fn status(&self) -> &TaskStatus {
        &self.status
    }

    fn traverse(&self) -> Traverse {
        self.traverse
    }

    fn has_job_binding(&self) -> bool {
        self.job.is_some()
    }

    fn begin(&mut self) -> Result<()> {
        if self.begun {
            return Err(BatchflowError::Precondition(format!(
                "{} ({}) has already begun",
                self.name, self.id
            )));
        }
        if self.job.is_none() {
            return Err(BatchflowError::Precondition(format!(
                "{} has no job bound; call with_job before begin",
                self.name
            )));
        }
        std::fs::create_dir_all(&self.work_dir)
            .map_err(|e| BatchflowError::io(&self.work_dir, e))?;
        self.stage = self.workflow.first_stage();
        self.enter_stage()?;
        self.begun = true;
        info!(task = %self.id, name = %self.name, kind = self.workflow.kind(), stage = self.stage, "task started");
        self.write_report()
    }

    fn set_status(&mut self) -> Result<()> {
        if !self.begun {
            return Err(BatchflowError::Precondition(format!(
                "{} ({}) has not begun",
                self.name, self.id
            )));
        }
        if self.retired || self.done() {
            return Ok(());
        }
        let tasks = self.history.stage(self.stage);
        if tasks
            .iter()
            .any(|task| *task.status() == TaskStatus::Terminate)
        {
            self.status = TaskStatus::Terminate;
        } else if tasks.iter().all(|task| task.status().is_terminal()) {
            self.status = if tasks
                .iter()
                .any(|task| *task.status() == TaskStatus::MaxIteration)
            {
                TaskStatus::MaxIteration
            } else {
                TaskStatus::Next
            };
        }
        Ok(())
    }

    fn next(&mut self) -> Step {
        match self.advance() {
            Ok(step) => step,
            Err(err) => Step::Failed(err),
        }
    }

    fn active_tasks(&self) -> &[Box<dyn Task>] {
        self.history.stage(self.stage)
    }

    fn active_tasks_mut(&mut self) -> &mut [Box<dyn Task>] {
        self.history.stage_mut(self.stage)
    }

    fn observables(&self) -> Option<&Observables> {
        self.result.as_ref()
    }

    fn is_retired(&self) -> bool {
        self.retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::report_path;
    use crate::testing::{StubWorkflow, settle};

    fn staged(root: &Path, stages: usize, width: usize) -> StagedTask<StubWorkflow> {
        StagedTask::new(root.join("stub"), StubWorkflow::new(stages, width))
            .with_job(Job::new("run", "q").unwrap())
    }

    #[test]
    fn begin_without_job_is_precondition_error() {
        let root = tempfile::tempdir().unwrap();
        let mut task = StagedTask::new(root.path().join("stub"), StubWorkflow::new(1, 1));
        assert!(matches!(
            task.begin(),
            Err(BatchflowError::Precondition(_))
        ));
    }

    #[test]
    fn next_before_begin_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 1, 1);
        assert!(matches!(task.next(), Step::Failed(BatchflowError::Precondition(_))));
        assert!(matches!(
            task.set_status(),
            Err(BatchflowError::Precondition(_))
        ));
    }

    #[test]
    fn begin_builds_first_stage_and_writes_report() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 2, 2);
        task.begin().unwrap();
        assert_eq!(task.stage(), 0);
        assert_eq!(task.status(), &TaskStatus::Stage("stage-0".to_string()));
        assert_eq!(task.active_tasks().len(), 2);
        assert!(report_path(&root.path().join("stub")).exists());
    }

    #[test]
    fn done_and_terminate_aggregate_to_terminate() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 2, 2);
        task.begin().unwrap();
        let scripts = task.workflow().scripts(0);
        scripts[0].finish(TaskStatus::Done);
        scripts[1].finish(TaskStatus::Terminate);
        settle(&mut task);

        assert_eq!(task.status(), &TaskStatus::Terminate);
        assert!(matches!(task.next(), Step::Terminal(TaskStatus::Terminate)));
        assert!(task.is_retired());
        assert_eq!(task.stage(), 0);
    }

    #[test]
    fn any_terminate_wins_even_while_siblings_run() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 1, 2);
        task.begin().unwrap();
        task.workflow().scripts(0)[1].finish(TaskStatus::Terminate);
        settle(&mut task);
        assert_eq!(task.status(), &TaskStatus::Terminate);
    }

    #[test]
    fn stage_does_not_advance_while_a_child_runs() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 2, 2);
        task.begin().unwrap();
        task.workflow().scripts(0)[0].finish(TaskStatus::Done);
        settle(&mut task);

        assert_eq!(task.status(), &TaskStatus::Stage("stage-0".to_string()));
        assert!(!task.done());
        assert!(matches!(task.next(), Step::Failed(_)));
        assert_eq!(task.stage(), 0);
        assert_eq!(task.history().len(), 1);
    }

    #[test]
    fn all_done_advances_to_next_stage() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 2, 2);
        task.begin().unwrap();
        for script in task.workflow().scripts(0) {
            script.finish(TaskStatus::Done);
        }
        settle(&mut task);
        assert_eq!(task.status(), &TaskStatus::Next);

        let Step::Continue(ids) = task.next() else {
            panic!("expected new sub-tasks");
        };
        assert_eq!(ids.len(), 2);
        assert_eq!(task.stage(), 1);
        assert_eq!(task.status(), &TaskStatus::Stage("stage-1".to_string()));
        let active: Vec<TaskId> = task.active_tasks().iter().map(|t| t.id()).collect();
        assert_eq!(active, ids);
        assert_eq!(task.history().stage(0).len(), 2);
    }

    #[test]
    fn final_stage_runs_finish_once() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 1, 1);
        task.begin().unwrap();
        task.workflow().scripts(0)[0].finish(TaskStatus::Done);
        settle(&mut task);

        assert!(matches!(task.next(), Step::Terminal(TaskStatus::Done)));
        assert_eq!(task.workflow().finish_calls(), 1);
        assert_eq!(task.observables().unwrap().energy, Some(1.0));

        settle(&mut task);
        assert!(matches!(task.next(), Step::Terminal(TaskStatus::Done)));
        assert_eq!(task.workflow().finish_calls(), 1);

        let report = std::fs::read_to_string(report_path(&root.path().join("stub"))).unwrap();
        assert!(report.contains("status: done"));
    }

    #[test]
    fn restart_rebuilds_the_same_stage_once() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 1, 2).with_traverse(Traverse::Restart);
        task.begin().unwrap();
        let before: Vec<TaskId> = task.active_tasks().iter().map(|t| t.id()).collect();
        task.workflow().scripts(0)[0].finish(TaskStatus::Terminate);
        settle(&mut task);

        let Step::Continue(after) = task.next() else {
            panic!("expected the stage to be rebuilt");
        };
        assert_eq!(task.stage(), 0);
        assert_eq!(task.traverse(), Traverse::Off);
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|id| !before.contains(id)));
        assert_eq!(task.history().len(), 1);
        assert!(
            task.active_tasks()
                .iter()
                .all(|t| t.traverse() == Traverse::Off)
        );

        task.workflow().scripts(0)[1].finish(TaskStatus::Terminate);
        settle(&mut task);
        assert!(matches!(task.next(), Step::Terminal(TaskStatus::Terminate)));
    }

    #[test]
    fn max_iteration_propagates_when_all_children_finished() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 2, 2);
        task.begin().unwrap();
        let scripts = task.workflow().scripts(0);
        scripts[0].finish(TaskStatus::Done);
        scripts[1].finish(TaskStatus::MaxIteration);
        settle(&mut task);
        assert_eq!(task.status(), &TaskStatus::MaxIteration);
        assert!(matches!(
            task.next(),
            Step::Terminal(TaskStatus::MaxIteration)
        ));
    }

    #[test]
    fn children_inherit_traverse() {
        let root = tempfile::tempdir().unwrap();
        let mut task = staged(root.path(), 1, 2).with_traverse(Traverse::On);
        task.begin().unwrap();
        assert!(
            task.active_tasks()
                .iter()
                .all(|t| t.traverse() == Traverse::On)
        );
    }
}
