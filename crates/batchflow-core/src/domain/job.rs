//! Job: one batch-submittable unit of work.
//!
//! A Job is immutable apart from its status and the external id the queue
//! assigns to it. Only a queue moves the status forward.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ids::ExternalJobId;
use super::scheduler::SchedulerProfile;
use crate::error::{BatchflowError, Result};

pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_JOB_NAME: &str = "batchflow-job";
pub const DEFAULT_WALLTIME: &str = "24:00";

/// Status of a Job as seen by its queue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobStatus {
    #[default]
    Unset,
    /// Registered with a queue, waiting for a submission slot.
    Preparing,
    Ready,
    Submitted,
    Running,
    Pending,
    /// Scheduler state code we have no mapping for, kept verbatim.
    Scheduler(String),
    Done,
    Terminate,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Terminate)
    }

    /// Map a listing state code to a status.
    pub fn from_scheduler_code(code: &str) -> Self {
        match code {
            "RUN" => JobStatus::Running,
            "PEND" => JobStatus::Pending,
            other => JobStatus::Scheduler(other.to_string()),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Unset => f.write_str("unset"),
            JobStatus::Preparing => f.write_str("preparing"),
            JobStatus::Ready => f.write_str("ready"),
            JobStatus::Submitted => f.write_str("submitted"),
            JobStatus::Running => f.write_str("running"),
            JobStatus::Pending => f.write_str("pending"),
            JobStatus::Scheduler(code) => f.write_str(code),
            JobStatus::Done => f.write_str("done"),
            JobStatus::Terminate => f.write_str("terminate"),
        }
    }
}

/// Job template as written in a run file (`[job]` table).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    pub script: Option<String>,
    pub queue: Option<String>,
    pub shell: Option<String>,
    pub job_name: Option<String>,
    pub walltime: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    script: String,
    shell: String,
    queue: String,
    walltime: String,
    job_name: String,
    stdout: Option<String>,
    stderr: Option<String>,
    status: JobStatus,
    external_id: Option<ExternalJobId>,
}

impl Job {
    /// Build a job from its template. Script and queue are mandatory.
    pub fn from_spec(spec: JobSpec) -> Result<Self> {
        let script = spec
            .script
            .ok_or_else(|| BatchflowError::Configuration("job script is not set".to_string()))?;
        let queue = spec
            .queue
            .ok_or_else(|| BatchflowError::Configuration("queue name is not set".to_string()))?;
        let mut job = Job::new(script, queue)?;
        if let Some(shell) = spec.shell {
            job.shell = shell;
        }
        if let Some(name) = spec.job_name {
            job.job_name = name;
        }
        if let Some(walltime) = spec.walltime {
            job.walltime = walltime;
        }
        job.stdout = spec.stdout;
        job.stderr = spec.stderr;
        Ok(job)
    }

    pub fn new(script: impl Into<String>, queue: impl Into<String>) -> Result<Self> {
        let script = script.into();
        let queue = queue.into();
        if script.trim().is_empty() {
            return Err(BatchflowError::Configuration(
                "job script is empty".to_string(),
            ));
        }
        if queue.trim().is_empty() {
            return Err(BatchflowError::Configuration(
                "queue name is empty".to_string(),
            ));
        }
        Ok(Self {
            script,
            shell: DEFAULT_SHELL.to_string(),
            queue,
            walltime: DEFAULT_WALLTIME.to_string(),
            job_name: DEFAULT_JOB_NAME.to_string(),
            stdout: None,
            stderr: None,
            status: JobStatus::Unset,
            external_id: None,
        })
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = name.into();
        self
    }

    pub fn with_walltime(mut self, walltime: impl Into<String>) -> Self {
        self.walltime = walltime.into();
        self
    }

    pub fn with_stdout(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn with_stderr(mut self, path: impl Into<String>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    /// Independent copy with fresh status, optionally renamed.
    pub fn copy(&self, job_name: Option<&str>) -> Job {
        Job {
            job_name: job_name.map_or_else(|| self.job_name.clone(), str::to_string),
            status: JobStatus::Unset,
            external_id: None,
            ..self.clone()
        }
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn walltime(&self) -> &str {
        &self.walltime
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn external_id(&self) -> Option<ExternalJobId> {
        self.external_id
    }

    pub(crate) fn set_status(&mut self, status: JobStatus, external_id: Option<ExternalJobId>) {
        self.status = status;
        if external_id.is_some() {
            self.external_id = external_id;
        }
    }

    /// Render the submission script: interpreter line, one directive per
    /// option, a blank line, then the script body verbatim.
    pub fn render_script(&self, profile: &SchedulerProfile) -> Result<String> {
        if self.queue.trim().is_empty() {
            return Err(BatchflowError::Configuration(
                "queue name is not set".to_string(),
            ));
        }
        let prefix = &profile.directive_prefix;
        let mut lines = vec![format!("#!{}", self.shell)];
        lines.push(format!("{prefix} {} {}", profile.queue_flag, self.queue));
        lines.push(format!("{prefix} {} {}", profile.walltime_flag, self.walltime));
        for directive in &profile.extra_directives {
            lines.push(format!("{prefix} {directive}"));
        }
        lines.push(format!("{prefix} {} {}", profile.job_name_flag, self.job_name));
        if let Some(stderr) = &self.stderr {
            lines.push(format!("{prefix} {} {stderr}", profile.stderr_flag));
        }
        if let Some(stdout) = &self.stdout {
            lines.push(format!("{prefix} {} {stdout}", profile.stdout_flag));
        }
        lines.push(String::new());
        lines.push(self.script.clone());

        let mut text = lines.join("\n");
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }

    /// Write the rendered script into `dir` and return its path.
    pub fn write_script(&self, dir: &Path, profile: &SchedulerProfile) -> Result<PathBuf> {
        let text = self.render_script(profile)?;
        let path = dir.join(&profile.script_name);
        std::fs::write(&path, text).map_err(|e| BatchflowError::io(&path, e))?;
        Ok(path)
    }
}

/// Options recovered from a rendered script's directive block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDirectives {
    pub queue: Option<String>,
    pub walltime: Option<String>,
    pub job_name: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// Read back the directives of a script rendered with `profile`.
///
/// Only the header is inspected; parsing stops at the first blank line.
pub fn parse_directives(text: &str, profile: &SchedulerProfile) -> JobDirectives {
    let mut directives = JobDirectives::default();
    for line in text.lines().skip_while(|l| l.starts_with("#!")) {
        if line.trim().is_empty() {
            break;
        }
        let Some(rest) = line.strip_prefix(profile.directive_prefix.as_str()) else {
            continue;
        };
        let rest = rest.trim();
        let (flag, value) = match rest.split_once(char::is_whitespace) {
            Some((flag, value)) => (flag, value.trim().to_string()),
            None => (rest, String::new()),
        };
        if flag == profile.queue_flag {
            directives.queue = Some(value);
        } else if flag == profile.walltime_flag {
            directives.walltime = Some(value);
        } else if flag == profile.job_name_flag {
            directives.job_name = Some(value);
        } else if flag == profile.stdout_flag {
            directives.stdout = Some(value);
        } else if flag == profile.stderr_flag {
            directives.stderr = Some(value);
        }
    }
    directives
}
