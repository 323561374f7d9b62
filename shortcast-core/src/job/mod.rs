pub mod error;
pub mod models;
pub mod store;

pub use error::{JobError, JobResult};
pub use models::{
    Emotion, EmotionVector, Job, JobFilter, JobRequest, JobStage, JobStatus, VideoStyle,
    MIN_SCRIPT_CHARS,
};
pub use store::{SqliteJobStore, SqliteJobStoreBuilder};
