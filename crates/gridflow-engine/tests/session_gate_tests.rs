//! Session pause/resume gate behaviour.

mod common;

use common::Harness;
use gridflow_core::{ResultId, TaskId};
use gridflow_engine::error::{Error, Result};
use gridflow_engine::task::{TaskCreationRequest, TaskStatus};

#[tokio::test]
async fn pause_withholds_the_finalize_push() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;
    h.lifecycle.pause_session(&session_id).await?;

    let task_id = TaskId::generate();
    let request = TaskCreationRequest::new(task_id.clone(), ResultId::generate());
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;
    h.lifecycle
        .finalize_task_creation(&session_id, &[request])
        .await?;

    // The status transition happens, the announcement does not.
    assert_eq!(h.task_status(&task_id).await?, TaskStatus::Submitted);
    assert!(h.queue.is_empty()?);

    Ok(())
}

#[tokio::test]
async fn pause_withholds_the_resolution_push() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let (producer_id, produced) = h.submitted_task(&session_id).await?;
    let consumer_id = TaskId::generate();
    let request = TaskCreationRequest::new(consumer_id.clone(), ResultId::generate())
        .with_data_dependencies([produced]);
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;
    h.lifecycle
        .finalize_task_creation(&session_id, &[request])
        .await?;

    h.lifecycle.pause_session(&session_id).await?;
    let before = h.queue.len()?;

    h.complete_result(&produced, &producer_id).await?;
    let promoted = h
        .lifecycle
        .resolve_dependencies(&session_id, &[produced].into())
        .await?;

    assert_eq!(promoted, vec![consumer_id.clone()]);
    assert_eq!(h.task_status(&consumer_id).await?, TaskStatus::Submitted);
    assert_eq!(h.queue.len()?, before, "paused session must not announce");

    Ok(())
}

#[tokio::test]
async fn resume_replays_every_submitted_task_exactly_once() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;
    h.lifecycle.pause_session(&session_id).await?;

    let mut expected = Vec::new();
    for _ in 0..3 {
        let (task_id, _output) = h.submitted_task(&session_id).await?;
        expected.push(task_id);
    }
    assert!(h.queue.is_empty()?);

    let pushed = h.lifecycle.resume_session(&session_id).await?;
    assert_eq!(pushed, 3);
    for task_id in &expected {
        assert_eq!(h.queue.push_count_for(task_id)?, 1);
    }

    Ok(())
}

#[tokio::test]
async fn resume_rewinds_abandoned_processing_tasks() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let (task_id, _output) = h.processing_task(&session_id).await?;
    h.lifecycle.pause_session(&session_id).await?;

    let pushed = h.lifecycle.resume_session(&session_id).await?;
    assert_eq!(pushed, 1);

    let task = h.task(&task_id).await?;
    assert_eq!(task.status, TaskStatus::Submitted);
    assert!(task.owner_pod_id.is_none());
    assert!(task.acquisition_date.is_none());

    Ok(())
}

#[tokio::test]
async fn interrupted_resume_can_be_re_run() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;
    h.lifecycle.pause_session(&session_id).await?;
    let (task_id, _output) = h.submitted_task(&session_id).await?;

    h.lifecycle.resume_session(&session_id).await?;
    // The first resume flipped the status but, say, its push was lost; the
    // operator fires resume again on the now-running session.
    h.lifecycle.resume_session(&session_id).await?;

    assert_eq!(h.queue.push_count_for(&task_id)?, 2);
    Ok(())
}

#[tokio::test]
async fn pausing_twice_is_a_no_op() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;
    h.lifecycle.pause_session(&session_id).await?;
    h.lifecycle.pause_session(&session_id).await?;
    Ok(())
}

#[tokio::test]
async fn terminal_sessions_refuse_the_gate() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;
    h.lifecycle.close_session(&session_id).await?;

    assert!(matches!(
        h.lifecycle.pause_session(&session_id).await,
        Err(Error::PreconditionFailed { .. })
    ));
    assert!(matches!(
        h.lifecycle.resume_session(&session_id).await,
        Err(Error::PreconditionFailed { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn cancel_sweeps_live_tasks() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let (submitted_id, _) = h.submitted_task(&session_id).await?;
    let (processing_id, _) = h.processing_task(&session_id).await?;

    let cancelled = h.lifecycle.cancel_session(&session_id).await?;
    assert_eq!(cancelled, 2);
    assert_eq!(h.task_status(&submitted_id).await?, TaskStatus::Cancelled);
    assert_eq!(h.task_status(&processing_id).await?, TaskStatus::Cancelled);

    Ok(())
}
