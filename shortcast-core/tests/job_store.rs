use std::path::Path;

use shortcast_core::job::store::INTERRUPTED_MESSAGE;
use shortcast_core::{
    Emotion, EmotionVector, JobError, JobFilter, JobRequest, JobStage, JobStatus, SqliteJobStore,
    VideoStyle,
};

fn setup_store() -> SqliteJobStore {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.sqlite");
    #[allow(deprecated)]
    let _persist = dir.into_path();
    let store = SqliteJobStore::builder()
        .path(&path)
        .create_if_missing(true)
        .build()
        .unwrap();
    store.initialize().unwrap();
    store
}

fn request(id: &str) -> JobRequest {
    JobRequest::new(id, "Test title", "A short script about rivers and mountains.")
}

#[test]
fn test_insert_and_fetch_round_trip() {
    let store = setup_store();
    let emotions = EmotionVector::default().with(Emotion::Joy, 70);
    let job = store
        .insert_job(
            &request("job-1")
                .with_style(VideoStyle::Emotive)
                .with_emotions(emotions),
        )
        .unwrap();
    assert_eq!(job.stage, JobStage::Queued);

    let fetched = store.fetch_job("job-1").unwrap().unwrap();
    assert_eq!(fetched.title, "Test title");
    assert_eq!(fetched.style, VideoStyle::Emotive);
    assert_eq!(fetched.emotions, emotions);
    assert_eq!(fetched.progress, 0);
    assert!(fetched.created_at.is_some());
    assert!(store.fetch_job("missing").unwrap().is_none());
}

#[test]
fn test_status_updates_are_persisted() {
    let store = setup_store();
    store.insert_job(&request("job-2")).unwrap();
    store
        .update_status(&JobStatus::new("job-2", JobStage::GeneratingMusic))
        .unwrap();
    let status = store.fetch_status("job-2").unwrap().unwrap();
    assert_eq!(status.stage, JobStage::GeneratingMusic);
    assert_eq!(status.progress, 45);
    assert!(status.error.is_none());

    store
        .update_status(&JobStatus::failed("job-2", 45, "music provider timed out"))
        .unwrap();
    let status = store.fetch_status("job-2").unwrap().unwrap();
    assert_eq!(status.stage, JobStage::Error);
    assert_eq!(status.progress, 45);
    assert_eq!(status.error.as_deref(), Some("music provider timed out"));
}

#[test]
fn test_update_unknown_job_is_not_found() {
    let store = setup_store();
    let err = store
        .update_status(&JobStatus::new("ghost", JobStage::Analyzing))
        .unwrap_err();
    assert!(matches!(err, JobError::NotFound { .. }));
}

#[test]
fn test_resubmission_resets_state() {
    let store = setup_store();
    store.insert_job(&request("job-3")).unwrap();
    store
        .update_status(&JobStatus::failed("job-3", 60, "boom"))
        .unwrap();
    store
        .set_asset("job-3", Path::new("/out/job-3_final.mp4"), Some("s3://bucket/x"))
        .unwrap();

    store.insert_job(&request("job-3")).unwrap();
    let job = store.fetch_job("job-3").unwrap().unwrap();
    assert_eq!(job.stage, JobStage::Queued);
    assert!(job.error.is_none());
    assert!(job.asset_path.is_none());
    assert!(job.remote_location.is_none());
}

#[test]
fn test_insert_refuses_to_reset_active_job() {
    let store = setup_store();
    store.insert_job(&request("job-5")).unwrap();
    store
        .update_status(&JobStatus::new("job-5", JobStage::GeneratingTts))
        .unwrap();

    let err = store.insert_job(&request("job-5")).unwrap_err();
    assert!(matches!(err, JobError::Active { ref job_id } if job_id == "job-5"));
    let status = store.fetch_status("job-5").unwrap().unwrap();
    assert_eq!(status.stage, JobStage::GeneratingTts);

    store
        .update_status(&JobStatus::new("job-5", JobStage::Complete))
        .unwrap();
    let job = store.insert_job(&request("job-5")).unwrap();
    assert_eq!(job.stage, JobStage::Queued);
}

#[test]
fn test_asset_set_and_clear() {
    let store = setup_store();
    store.insert_job(&request("job-4")).unwrap();
    store
        .set_asset("job-4", Path::new("/out/job-4_final.mp4"), None)
        .unwrap();
    let job = store.fetch_job("job-4").unwrap().unwrap();
    assert_eq!(
        job.asset_path.as_deref(),
        Some(Path::new("/out/job-4_final.mp4"))
    );
    store.clear_asset("job-4").unwrap();
    assert!(store.fetch_job("job-4").unwrap().unwrap().asset_path.is_none());
}

#[test]
fn test_list_filters_by_stage_and_limit() {
    let store = setup_store();
    for idx in 0..4 {
        store.insert_job(&request(&format!("job-{idx}"))).unwrap();
    }
    store
        .update_status(&JobStatus::new("job-1", JobStage::Complete))
        .unwrap();

    let all = store.list(&JobFilter::default()).unwrap();
    assert_eq!(all.len(), 4);

    let complete = store
        .list(&JobFilter {
            stage: Some(JobStage::Complete),
            limit: None,
        })
        .unwrap();
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].id, "job-1");

    let limited = store
        .list(&JobFilter {
            stage: None,
            limit: Some(2),
        })
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[test]
fn test_mark_interrupted_fails_in_flight_jobs() {
    let store = setup_store();
    for id in ["queued", "rendering", "done"] {
        store.insert_job(&request(id)).unwrap();
    }
    store
        .update_status(&JobStatus::new("rendering", JobStage::GeneratingVideo))
        .unwrap();
    store
        .update_status(&JobStatus::new("done", JobStage::Complete))
        .unwrap();

    assert_eq!(store.mark_interrupted().unwrap(), 2);
    for id in ["queued", "rendering"] {
        let status = store.fetch_status(id).unwrap().unwrap();
        assert_eq!(status.stage, JobStage::Error);
        assert_eq!(status.error.as_deref(), Some(INTERRUPTED_MESSAGE));
    }
    assert_eq!(
        store.fetch_status("done").unwrap().unwrap().stage,
        JobStage::Complete
    );
    assert_eq!(store.mark_interrupted().unwrap(), 0);
}

#[test]
fn test_builder_requires_path() {
    let err = SqliteJobStore::builder().build().unwrap_err();
    assert!(matches!(err, JobError::MissingStore));
}
