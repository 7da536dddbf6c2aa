//! TOML run file: one `[queue]`, one `[job]` template and any number of
//! `[[task]]` entries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use batchflow_core::domain::{JobSpec, RelaxationSettings, Tensor3};
use batchflow_core::workflows::{Bias, BornEffectiveCharge, BulkModulus, ModeGruneisen, Relaxation};
use batchflow_core::{Job, QueueConfig, StagedTask, Task, Traverse, Workflow};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    #[serde(default)]
    pub queue: QueueConfig,
    pub job: JobTable,
    /// Seconds between polls; `--interval` wins.
    pub poll_interval: Option<u64>,
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Deserialize)]
pub struct JobTable {
    #[serde(flatten)]
    pub spec: JobSpec,
    /// Read the script body from this file instead of `script`.
    pub script_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    StructureOptimization,
    BulkModulus,
    BornEffectiveCharge,
    ModeGruneisen,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEntry {
    pub kind: TaskKind,
    /// Relative to the run file.
    pub directory: PathBuf,
    pub name: Option<String>,
    #[serde(default)]
    pub traverse: Traverse,
    pub settings: Option<RelaxationSettings>,
    /// Extra keys for every relaxation `input.json`.
    pub inputs: Option<serde_json::Value>,
    /// Volume of an already relaxed cell (bulk modulus).
    pub relaxed_volume: Option<f64>,
    pub strains: Option<Vec<f64>>,
    /// Skip the equilibrium stage (born charge, mode Grüneisen).
    #[serde(default)]
    pub relaxed: bool,
    pub symmetry_tolerance: Option<f64>,
    pub supercell_matrix: Option<[[i64; 3]; 3]>,
    pub primitive_matrix: Option<Tensor3>,
    pub distance: Option<f64>,
    pub delta_strain: Option<f64>,
    pub strain: Option<Tensor3>,
    pub bias: Option<Bias>,
}

/// A parsed run file with paths resolved against its directory.
#[derive(Debug)]
pub struct Run {
    pub base: PathBuf,
    pub file: RunFile,
}

impl Run {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read run file {}", path.display()))?;
        let file: RunFile = toml::from_str(&text)
            .with_context(|| format!("failed to parse run file {}", path.display()))?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { base, file })
    }

    pub fn job(&self) -> Result<Job> {
        let mut spec = self.file.job.spec.clone();
        if let Some(script_file) = &self.file.job.script_file {
            if spec.script.is_some() {
                bail!("[job] sets both script and script_file");
            }
            let path = self.base.join(script_file);
            let body = fs::read_to_string(&path)
                .with_context(|| format!("failed to read job script {}", path.display()))?;
            spec.script = Some(body);
        }
        Job::from_spec(spec).context("invalid [job] table")
    }

    /// Root tasks, each bound to a copy of the job template.
    pub fn tasks(&self, dry_run: bool) -> Result<Vec<Box<dyn Task>>> {
        if self.file.tasks.is_empty() {
            bail!("run file has no [[task]] entries");
        }
        let job = self.job()?;
        self.file
            .tasks
            .iter()
            .map(|entry| entry.build(&self.base, &job, dry_run))
            .collect()
    }
}

impl TaskEntry {
    fn build(&self, base: &Path, job: &Job, dry_run: bool) -> Result<Box<dyn Task>> {
        let settings = self.settings.clone().unwrap_or_default();
        let task: Box<dyn Task> = match self.kind {
            TaskKind::StructureOptimization => {
                let mut workflow = Relaxation::new(settings);
                if let Some(inputs) = &self.inputs {
                    workflow = workflow.with_inputs(inputs.clone());
                }
                self.bind(base, job, dry_run, workflow)
            }
            TaskKind::BulkModulus => {
                let mut workflow = BulkModulus::new(settings);
                if let Some(volume) = self.relaxed_volume {
                    workflow = workflow.with_relaxed_volume(volume);
                }
                if let Some(strains) = &self.strains {
                    workflow = workflow.with_strains(strains.clone());
                }
                self.bind(base, job, dry_run, workflow)
            }
            TaskKind::BornEffectiveCharge => {
                let mut workflow = BornEffectiveCharge::new(settings);
                if self.relaxed {
                    workflow = workflow.relaxed();
                }
                if let Some(tolerance) = self.symmetry_tolerance {
                    workflow = workflow.with_symmetry_tolerance(tolerance);
                }
                self.bind(base, job, dry_run, workflow)
            }
            TaskKind::ModeGruneisen => {
                let Some(supercell) = self.supercell_matrix else {
                    bail!(
                        "task {} needs supercell_matrix for mode_gruneisen",
                        self.directory.display()
                    );
                };
                let mut workflow = ModeGruneisen::new(settings, supercell);
                if self.relaxed {
                    workflow = workflow.relaxed();
                }
                if let Some(matrix) = self.primitive_matrix {
                    workflow = workflow.with_primitive_matrix(matrix);
                }
                if let Some(distance) = self.distance {
                    workflow = workflow.with_distance(distance);
                }
                if let Some(delta) = self.delta_strain {
                    workflow = workflow.with_delta_strain(delta);
                }
                if let Some(strain) = self.strain {
                    workflow = workflow.with_strain(strain);
                }
                if let Some(bias) = self.bias {
                    workflow = workflow.with_bias(bias);
                }
                self.bind(base, job, dry_run, workflow)
            }
        };
        Ok(task)
    }

    fn bind<W: Workflow + 'static>(
        &self,
        base: &Path,
        job: &Job,
        dry_run: bool,
        workflow: W,
    ) -> Box<dyn Task> {
        let traverse = if dry_run { Traverse::On } else { self.traverse };
        let mut task = StagedTask::new(base.join(&self.directory), workflow)
            .with_job(job.copy(None))
            .with_traverse(traverse);
        if let Some(name) = &self.name {
            task = task.with_name(name);
        }
        Box::new(task)
    }
}
