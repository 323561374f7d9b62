use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::sqlite::configure_connection;

use super::models::{Job, JobFilter, JobRequest, JobStage, JobStatus};
use super::{JobError, JobResult};

const JOB_SCHEMA: &str = include_str!("../../../sql/jobs.sql");

pub const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

#[derive(Debug, Clone)]
pub struct SqliteJobStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for SqliteJobStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl SqliteJobStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> JobResult<SqliteJobStore> {
        let path = self.path.ok_or(JobError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(SqliteJobStore { path, flags })
    }
}

/// Job status records. Each call opens its own connection, so clones are cheap
/// and safe to share between the worker and pollers.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteJobStore {
    pub fn builder() -> SqliteJobStoreBuilder {
        SqliteJobStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> JobResult<Self> {
        SqliteJobStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> JobResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            JobError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| JobError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> JobResult<()> {
        let conn = self.open()?;
        conn.execute_batch(JOB_SCHEMA)?;
        Ok(())
    }

    /// Inserts a queued job, or resets a finished one with the same id. A job
    /// that is still queued or rendering is left alone and reported as
    /// `JobError::Active`.
    pub fn insert_job(&self, request: &JobRequest) -> JobResult<Job> {
        let job = Job::from_request(request.clone());
        let conn = self.open()?;
        let now = Utc::now().naive_utc();
        let changed = conn.execute(
            "INSERT INTO jobs (
                job_id, title, script, style, emotions, stage, progress, current_step,
                error, asset_path, remote_location, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, NULL, ?9, ?9)
            ON CONFLICT(job_id) DO UPDATE SET
                title = excluded.title,
                script = excluded.script,
                style = excluded.style,
                emotions = excluded.emotions,
                stage = excluded.stage,
                progress = excluded.progress,
                current_step = excluded.current_step,
                error = NULL,
                asset_path = NULL,
                remote_location = NULL,
                updated_at = excluded.updated_at
            WHERE jobs.stage IN ('complete', 'error')",
            params![
                &job.id,
                &job.title,
                &job.script,
                job.style.as_str(),
                serde_json::to_string(&job.emotions)?,
                job.stage.as_str(),
                i64::from(job.progress),
                &job.current_step,
                now,
            ],
        )?;
        if changed == 0 {
            return Err(JobError::Active { job_id: job.id });
        }
        Ok(job)
    }

    pub fn fetch_job(&self, job_id: &str) -> JobResult<Option<Job>> {
        let conn = self.open()?;
        let job = conn
            .query_row(
                "SELECT * FROM jobs WHERE job_id = ?1",
                [job_id],
                Job::from_row,
            )
            .optional()?;
        Ok(job)
    }

    pub fn fetch_status(&self, job_id: &str) -> JobResult<Option<JobStatus>> {
        let conn = self.open()?;
        let status = conn
            .query_row(
                "SELECT job_id, stage, progress, current_step, error FROM jobs WHERE job_id = ?1",
                [job_id],
                |row| {
                    let stage: String = row.get(1)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        stage,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;
        status
            .map(|(project_id, stage, progress, current_step, error)| {
                Ok(JobStatus {
                    project_id,
                    stage: stage.parse()?,
                    progress: progress.clamp(0, 100) as u8,
                    current_step,
                    error,
                })
            })
            .transpose()
    }

    pub fn update_status(&self, status: &JobStatus) -> JobResult<()> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE jobs SET stage = ?2, progress = ?3, current_step = ?4, error = ?5,
                updated_at = ?6
             WHERE job_id = ?1",
            params![
                &status.project_id,
                status.stage.as_str(),
                i64::from(status.progress),
                &status.current_step,
                &status.error,
                Utc::now().naive_utc(),
            ],
        )?;
        if updated == 0 {
            return Err(JobError::NotFound {
                job_id: status.project_id.clone(),
            });
        }
        Ok(())
    }

    pub fn set_asset(
        &self,
        job_id: &str,
        asset_path: &Path,
        remote_location: Option<&str>,
    ) -> JobResult<()> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE jobs SET asset_path = ?2, remote_location = ?3, updated_at = ?4
             WHERE job_id = ?1",
            params![
                job_id,
                asset_path.to_string_lossy().to_string(),
                remote_location,
                Utc::now().naive_utc(),
            ],
        )?;
        if updated == 0 {
            return Err(JobError::NotFound {
                job_id: job_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn clear_asset(&self, job_id: &str) -> JobResult<()> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE jobs SET asset_path = NULL, updated_at = ?2 WHERE job_id = ?1",
            params![job_id, Utc::now().naive_utc()],
        )?;
        Ok(())
    }

    pub fn list(&self, filter: &JobFilter) -> JobResult<Vec<Job>> {
        let conn = self.open()?;
        let mut query = String::from("SELECT * FROM jobs");
        let mut params: Vec<Value> = Vec::new();
        if let Some(stage) = filter.stage {
            query.push_str(" WHERE stage = ?");
            params.push(Value::Text(stage.as_str().to_string()));
        }
        query.push_str(" ORDER BY created_at DESC, job_id ASC");
        if let Some(limit) = filter.limit {
            query.push_str(" LIMIT ?");
            params.push(Value::Integer(limit as i64));
        }
        let mut stmt = conn.prepare(&query)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(
            params.iter().map(|value| value as &dyn rusqlite::ToSql),
        ))?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next()? {
            jobs.push(Job::from_row(row)?);
        }
        Ok(jobs)
    }

    /// Moves every job left in a non-terminal stage to `error`. Renders are not
    /// resumable, so anything in flight when the process died is lost.
    pub fn mark_interrupted(&self) -> JobResult<usize> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE jobs SET stage = 'error', error = ?1, current_step = ?2, updated_at = ?3
             WHERE stage NOT IN ('complete', 'error')",
            params![
                INTERRUPTED_MESSAGE,
                JobStage::Error.default_step(),
                Utc::now().naive_utc(),
            ],
        )?;
        Ok(updated)
    }
}
