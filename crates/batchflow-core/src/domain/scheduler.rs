//! Batch scheduler command-line protocol.
//!
//! Everything scheduler specific lives in [`SchedulerProfile`]: how a job is
//! submitted, how the listing is read back, and how directives are spelled in
//! the submission script. The defaults describe a `qsub`/`qjobs` installation.

use serde::{Deserialize, Serialize};

use super::ids::ExternalJobId;
use crate::error::{BatchflowError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerProfile {
    /// Submission command; the script file name is appended as the last argument.
    pub submit_command: String,
    /// Listing command printing one job per line.
    pub list_command: String,
    pub script_name: String,

    pub directive_prefix: String,
    pub queue_flag: String,
    pub walltime_flag: String,
    pub job_name_flag: String,
    pub stdout_flag: String,
    pub stderr_flag: String,
    /// Fixed directives emitted between the wall-clock limit and the job name.
    pub extra_directives: Vec<String>,

    /// Whitespace-separated token of the submit output holding the job id.
    pub job_id_token: usize,
    /// Characters stripped from both ends of that token (`<1234>`).
    pub job_id_trim: String,

    pub listing_header_lines: usize,
    pub listing_min_columns: usize,
    pub listing_state_column: usize,
}

impl Default for SchedulerProfile {
    fn default() -> Self {
        Self {
            submit_command: "qsub".to_string(),
            list_command: "qjobs".to_string(),
            script_name: "job.sh".to_string(),
            directive_prefix: "#QSUB".to_string(),
            queue_flag: "-q".to_string(),
            walltime_flag: "-W".to_string(),
            job_name_flag: "-J".to_string(),
            stdout_flag: "-o".to_string(),
            stderr_flag: "-e".to_string(),
            extra_directives: vec!["-A p=20:t=1:c=1:m=3072M".to_string(), "-rn".to_string()],
            job_id_token: 1,
            job_id_trim: "<>".to_string(),
            listing_header_lines: 1,
            listing_min_columns: 7,
            listing_state_column: 2,
        }
    }
}

/// One row of the scheduler listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub job_id: ExternalJobId,
    pub state: String,
}

impl SchedulerProfile {
    /// argv for submitting `script_name` from the job directory.
    pub fn submit_argv(&self) -> Vec<String> {
        let mut argv: Vec<String> = self
            .submit_command
            .split_whitespace()
            .map(str::to_string)
            .collect();
        argv.push(self.script_name.clone());
        argv
    }

    pub fn list_argv(&self) -> Vec<String> {
        self.list_command
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Extract the job id from the submit command's output.
    pub fn parse_job_id(&self, output: &str) -> Result<ExternalJobId> {
        let token = output
            .split_whitespace()
            .nth(self.job_id_token)
            .ok_or_else(|| BatchflowError::Scheduler(format!("no job id in {output:?}")))?;
        let trimmed = token.trim_matches(|c| self.job_id_trim.contains(c));
        trimmed
            .parse::<u64>()
            .map(ExternalJobId::new)
            .map_err(|_| BatchflowError::Scheduler(format!("job id token {token:?} is not a number")))
    }

    /// Parse the listing output into (job id, state code) rows.
    ///
    /// Header lines are skipped, then any line with too few columns or a
    /// non-numeric first column is ignored.
    pub fn parse_listing(&self, output: &str) -> Vec<ListingEntry> {
        output
            .lines()
            .skip(self.listing_header_lines)
            .filter_map(|line| {
                let columns: Vec<&str> = line.split_whitespace().collect();
                if columns.len() < self.listing_min_columns {
                    return None;
                }
                let job_id = columns[0].parse::<u64>().ok()?;
                let state = columns.get(self.listing_state_column)?;
                Some(ListingEntry {
                    job_id: ExternalJobId::new(job_id),
                    state: (*state).to_string(),
                })
            })
            .collect()
    }
}
