//! Test doubles: a scripted batch scheduler and a stub workflow.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{Decision, Observables, Step, TaskId, TaskStatus, Traverse};
use crate::error::{BatchflowError, Result};
use crate::impls::RESULT_FILE;
use crate::ports::{BoxedReader, BoxedWriter, CommandOutput, RemoteShell, Shell};
use crate::task::{History, StageContext, Task, Workflow};

pub(crate) const FIRST_JOB_ID: u64 = 1001;

#[derive(Default)]
struct FakeState {
    next_id: u64,
    listing: BTreeMap<u64, String>,
    job_dirs: BTreeMap<u64, PathBuf>,
    submissions: Vec<PathBuf>,
    calls: Vec<Vec<String>>,
    refuse: bool,
    failing: HashSet<String>,
    responder: Option<Responder>,
}

type Responder = Arc<dyn Fn(&Path) -> String + Send + Sync>;

/// In-process stand-in for `qsub`/`qjobs` and the remote file commands.
///
/// File commands (`mkdir`, `tar`, `rm`, `/bin/ls`) act on the real
/// filesystem, so a temp directory can play the remote host.
#[derive(Clone)]
pub(crate) struct FakeScheduler {
    state: Arc<Mutex<FakeState>>,
}

impl FakeScheduler {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_id: FIRST_JOB_ID,
                ..FakeState::default()
            })),
        }
    }

    /// Directories `qsub` was run from, in order.
    pub(crate) fn submissions(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn set_state(&self, job_id: u64, state: &str) {
        self.state
            .lock()
            .unwrap()
            .listing
            .insert(job_id, state.to_string());
    }

    /// Drop the job from the listing without writing results.
    pub(crate) fn finish(&self, job_id: u64) {
        self.state.lock().unwrap().listing.remove(&job_id);
    }

    /// Write `result` into the job's directory and drop it from the listing.
    pub(crate) fn finish_with(&self, job_id: u64, result: &str) {
        let mut state = self.state.lock().unwrap();
        state.listing.remove(&job_id);
        let dir = state.job_dirs[&job_id].clone();
        std::fs::write(dir.join(RESULT_FILE), result).unwrap();
    }

    /// Every later submission finishes at once; `respond` gives the
    /// `result.json` contents for the submission directory.
    pub(crate) fn auto_finish(&self, respond: impl Fn(&Path) -> String + Send + Sync + 'static) {
        self.state.lock().unwrap().responder = Some(Arc::new(respond));
    }

    pub(crate) fn refuse_submissions(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Make every invocation of `program` exit non-zero.
    pub(crate) fn fail_command(&self, program: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(program.to_string());
    }

    pub(crate) fn heal_command(&self, program: &str) {
        self.state.lock().unwrap().failing.remove(program);
    }

    fn execute(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(argv.to_vec());
        let program = argv.first().map(String::as_str).unwrap_or_default();
        if state.failing.contains(program) {
            return Ok(failure(format!("{program}: simulated failure")));
        }
        match program {
            "qsub" => {
                if state.refuse {
                    return Ok(failure("qsub: queue is closed".to_string()));
                }
                let dir = in_dir(cwd)?.to_path_buf();
                let job_id = state.next_id;
                state.next_id += 1;
                state.submissions.push(dir.clone());
                state.job_dirs.insert(job_id, dir.clone());
                match state.responder.clone() {
                    Some(respond) => std::fs::write(dir.join(RESULT_FILE), respond(&dir)).unwrap(),
                    None => {
                        state.listing.insert(job_id, "PEND".to_string());
                    }
                }
                Ok(success(format!(
                    "Job <{job_id}> is submitted to queue <gr10260f>.\n"
                )))
            }
            "qjobs" => {
                let mut text =
                    "JOBID USER STAT QUEUE FROM_HOST EXEC_HOST JOB_NAME SUBMIT_TIME\n".to_string();
                for (id, code) in &state.listing {
                    text.push_str(&format!(
                        "{id} alice {code} gr10260f login1 node01 step Oct 18 10:00\n"
                    ));
                }
                Ok(success(text))
            }
            "mkdir" => {
                let target = argv.last().map(PathBuf::from).unwrap_or_default();
                std::fs::create_dir_all(target).unwrap();
                Ok(success(String::new()))
            }
            "tar" => {
                let dir = in_dir(cwd)?;
                let archive = dir.join(&argv[2]);
                match argv[1].as_str() {
                    "xvf" => {
                        let file = std::fs::File::open(&archive).unwrap();
                        tar::Archive::new(file).unpack(dir).unwrap();
                    }
                    "cvf" => {
                        let file = std::fs::File::create(&archive).unwrap();
                        let mut builder = tar::Builder::new(file);
                        for name in &argv[3..] {
                            let path = dir.join(name);
                            if path.is_dir() {
                                builder.append_dir_all(name, &path).unwrap();
                            } else {
                                builder.append_path_with_name(&path, name).unwrap();
                            }
                        }
                        builder.finish().unwrap();
                    }
                    other => return Ok(failure(format!("tar: unsupported mode {other}"))),
                }
                Ok(success(String::new()))
            }
            "rm" => {
                std::fs::remove_file(in_dir(cwd)?.join(&argv[1])).unwrap();
                Ok(success(String::new()))
            }
            "/bin/ls" => {
                let mut names: Vec<String> = std::fs::read_dir(in_dir(cwd)?)
                    .unwrap()
                    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                Ok(success(names.join("\n")))
            }
            other => Ok(failure(format!("{other}: command not found"))),
        }
    }
}

fn in_dir(cwd: Option<&Path>) -> Result<&Path> {
    cwd.ok_or_else(|| BatchflowError::Precondition("fake command needs a cwd".to_string()))
}

fn success(output: String) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        output,
    }
}

fn failure(output: String) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(1),
        output,
    }
}

#[async_trait]
impl Shell for FakeScheduler {
    async fn run(&self, argv: &[String], cwd: Option<&Path>) -> Result<CommandOutput> {
        self.execute(argv, cwd)
    }
}

#[async_trait]
impl RemoteShell for FakeScheduler {
    async fn open_read(&self, path: &Path) -> Result<BoxedReader> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| BatchflowError::transport_io(format!("open {}", path.display()), e))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &Path) -> Result<BoxedWriter> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| BatchflowError::transport_io(format!("create {}", path.display()), e))?;
        Ok(Box::new(file))
    }
}

/// Handle a test uses to decide what a [`ScriptedTask`] reports.
#[derive(Clone, Default)]
pub(crate) struct Script(Arc<Mutex<Option<(TaskStatus, Option<Observables>)>>>);

impl Script {
    pub(crate) fn finish(&self, status: TaskStatus) {
        *self.0.lock().unwrap() = Some((status, None));
    }
}

/// Job-less task whose status is set from the test through its [`Script`].
pub(crate) struct ScriptedTask {
    id: TaskId,
    name: String,
    dir: PathBuf,
    traverse: Traverse,
    status: TaskStatus,
    observables: Option<Observables>,
    script: Script,
    retired: bool,
}

impl ScriptedTask {
    pub(crate) fn new(dir: PathBuf, name: String, traverse: Traverse, script: Script) -> Self {
        Self {
            id: TaskId::allocate(),
            name,
            dir,
            traverse,
            status: TaskStatus::Preparing,
            observables: None,
            script,
            retired: false,
        }
    }
}

impl Task for ScriptedTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "scripted"
    }

    fn work_dir(&self) -> &Path {
        &self.dir
    }

    fn stage(&self) -> usize {
        0
    }

    fn status(&self) -> &TaskStatus {
        &self.status
    }

    fn traverse(&self) -> Traverse {
        self.traverse
    }

    fn has_job_binding(&self) -> bool {
        true
    }

    fn begin(&mut self) -> Result<()> {
        self.status = TaskStatus::Stage("running".to_string());
        Ok(())
    }

    fn set_status(&mut self) -> Result<()> {
        if let Some((status, observables)) = self.script.0.lock().unwrap().clone() {
            self.status = status;
            self.observables = observables;
        }
        Ok(())
    }

    fn next(&mut self) -> Step {
        if self.status.is_terminal() {
            self.retired = true;
            Step::Terminal(self.status.clone())
        } else {
            Step::Failed(BatchflowError::Precondition("not done".to_string()))
        }
    }

    fn observables(&self) -> Option<&Observables> {
        self.observables.as_ref()
    }

    fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Workflow with `stages` stages of `width` scripted sub-tasks each.
pub(crate) struct StubWorkflow {
    stages: usize,
    width: usize,
    scripts: Arc<Mutex<Vec<Vec<Script>>>>,
    finishes: Arc<AtomicUsize>,
}

impl StubWorkflow {
    pub(crate) fn new(stages: usize, width: usize) -> Self {
        Self {
            stages,
            width,
            scripts: Arc::default(),
            finishes: Arc::default(),
        }
    }

    /// Scripts of the most recent build of `stage`.
    pub(crate) fn scripts(&self, stage: usize) -> Vec<Script> {
        self.scripts
            .lock()
            .unwrap()
            .get(stage)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn finish_calls(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

impl Workflow for StubWorkflow {
    fn kind(&self) -> &'static str {
        "stub"
    }

    fn stage_label(&self, stage: usize) -> String {
        format!("stage-{stage}")
    }

    fn build_stage(
        &self,
        ctx: &StageContext<'_>,
        _history: &History,
    ) -> Result<Vec<Box<dyn Task>>> {
        let scripts: Vec<Script> = (0..self.width).map(|_| Script::default()).collect();
        let tasks = scripts
            .iter()
            .enumerate()
            .map(|(i, script)| {
                Box::new(ScriptedTask::new(
                    ctx.dir().join(format!("s{}-{i}", ctx.stage)),
                    format!("child-{i}"),
                    ctx.traverse(),
                    script.clone(),
                )) as Box<dyn Task>
            })
            .collect();

        let mut all = self.scripts.lock().unwrap();
        if all.len() <= ctx.stage {
            all.resize_with(ctx.stage + 1, Vec::new);
        }
        all[ctx.stage] = scripts;
        Ok(tasks)
    }

    fn decide(&self, stage: usize, _history: &History) -> Decision {
        if stage + 1 < self.stages {
            Decision::Advance
        } else {
            Decision::Complete
        }
    }

    fn finish(&mut self, _history: &History) -> Result<Observables> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(Observables {
            energy: Some(1.0),
            ..Observables::default()
        })
    }
}

/// One stage of job leaves, one per name.
#[derive(Clone)]
pub(crate) struct LeafStage {
    names: Vec<&'static str>,
}

impl LeafStage {
    pub(crate) fn new(names: &[&'static str]) -> Self {
        Self {
            names: names.to_vec(),
        }
    }
}

impl Workflow for LeafStage {
    fn kind(&self) -> &'static str {
        "leaf_stage"
    }

    fn stage_label(&self, _stage: usize) -> String {
        "leaves".to_string()
    }

    fn build_stage(
        &self,
        ctx: &StageContext<'_>,
        _history: &History,
    ) -> Result<Vec<Box<dyn Task>>> {
        Ok(self
            .names
            .iter()
            .map(|name| ctx.job_task(name, serde_json::json!({})))
            .collect())
    }

    fn decide(&self, _stage: usize, _history: &History) -> Decision {
        Decision::Complete
    }

    fn finish(&mut self, _history: &History) -> Result<Observables> {
        Ok(Observables::default())
    }
}

/// One stage of nested [`LeafStage`] groups.
pub(crate) struct GroupStage {
    groups: Vec<(&'static str, LeafStage)>,
}

impl GroupStage {
    pub(crate) fn new(groups: &[(&'static str, &[&'static str])]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|(dir, names)| (*dir, LeafStage::new(names)))
                .collect(),
        }
    }
}

impl Workflow for GroupStage {
    fn kind(&self) -> &'static str {
        "group_stage"
    }

    fn stage_label(&self, _stage: usize) -> String {
        "groups".to_string()
    }

    fn build_stage(
        &self,
        ctx: &StageContext<'_>,
        _history: &History,
    ) -> Result<Vec<Box<dyn Task>>> {
        Ok(self
            .groups
            .iter()
            .map(|(dir, leaves)| ctx.staged(dir, leaves.clone()))
            .collect())
    }

    fn decide(&self, _stage: usize, _history: &History) -> Decision {
        Decision::Complete
    }

    fn finish(&mut self, _history: &History) -> Result<Observables> {
        Ok(Observables::default())
    }
}

/// Re-aggregate a task tree bottom-up, as one dispatcher pass would.
pub(crate) fn settle(task: &mut dyn Task) {
    for child in task.active_tasks_mut() {
        settle(child.as_mut());
    }
    task.set_status().unwrap();
}

/// Poll until every root retired; panics if that takes unreasonably long.
pub(crate) async fn run_to_end(dispatcher: &mut crate::app::Dispatcher) -> u64 {
    for _ in 0..100 {
        let summary = dispatcher.poll_once().await.unwrap();
        if summary.live_roots == 0 {
            return summary.iteration;
        }
    }
    panic!("dispatcher did not finish within 100 polls");
}
