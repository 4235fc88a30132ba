//! Two-phase creation behaviour.

mod common;

use std::collections::BTreeSet;

use common::Harness;
use gridflow_core::{ResultId, TaskId};
use gridflow_engine::error::Result;
use gridflow_engine::result::ResultStatus;
use gridflow_engine::store::{ResultStore, TaskStore};
use gridflow_engine::task::{TaskCreationRequest, TaskStatus};

#[tokio::test]
async fn finalize_with_no_dependencies_submits_and_pushes_once() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let task_id = TaskId::generate();
    let request = TaskCreationRequest::new(task_id.clone(), ResultId::generate())
        .with_expected_output_keys(vec![ResultId::generate()]);
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;

    assert_eq!(h.task_status(&task_id).await?, TaskStatus::Creating);
    assert!(h.queue.is_empty()?, "phase 1 must not push");

    h.lifecycle
        .finalize_task_creation(&session_id, &[request])
        .await?;

    assert_eq!(h.task_status(&task_id).await?, TaskStatus::Submitted);
    assert_eq!(h.queue.push_count_for(&task_id)?, 1);

    Ok(())
}

#[tokio::test]
async fn finalize_with_unresolved_dependencies_parks_the_task() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let deps: BTreeSet<ResultId> = [ResultId::generate(), ResultId::generate()].into();
    let task_id = TaskId::generate();
    let request = TaskCreationRequest::new(task_id.clone(), ResultId::generate())
        .with_data_dependencies(deps.clone());
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;
    h.lifecycle
        .finalize_task_creation(&session_id, &[request])
        .await?;

    let task = h.task(&task_id).await?;
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.remaining_data_dependencies, deps);
    assert!(h.queue.is_empty()?, "a pending task must not be announced");

    Ok(())
}

#[tokio::test]
async fn finalize_discharges_already_completed_dependencies() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    // A producer task whose output completes before the consumer finalizes.
    let (producer_id, produced) = h.submitted_task(&session_id).await?;
    h.complete_result(&produced, &producer_id).await?;

    let consumer_id = TaskId::generate();
    let request = TaskCreationRequest::new(consumer_id.clone(), ResultId::generate())
        .with_data_dependencies([produced]);
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;
    h.lifecycle
        .finalize_task_creation(&session_id, &[request])
        .await?;

    // The only dependency was already complete, so finalize submits.
    assert_eq!(h.task_status(&consumer_id).await?, TaskStatus::Submitted);
    assert_eq!(h.queue.push_count_for(&consumer_id)?, 1);

    Ok(())
}

#[tokio::test]
async fn double_finalize_is_a_no_op() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let task_id = TaskId::generate();
    let request = TaskCreationRequest::new(task_id.clone(), ResultId::generate());
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;
    h.lifecycle
        .finalize_task_creation(&session_id, std::slice::from_ref(&request))
        .await?;
    h.lifecycle
        .finalize_task_creation(&session_id, &[request])
        .await?;

    assert_eq!(h.task_status(&task_id).await?, TaskStatus::Submitted);
    assert_eq!(
        h.queue.push_count_for(&task_id)?,
        1,
        "duplicate finalize must not re-push"
    );

    Ok(())
}

#[tokio::test]
async fn repeating_phase_one_does_not_disturb_existing_rows() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let task_id = TaskId::generate();
    let output = ResultId::generate();
    let request = TaskCreationRequest::new(task_id.clone(), ResultId::generate())
        .with_expected_output_keys(vec![output]);

    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;
    h.complete_result(&output, &task_id).await?;

    // The client crashed and re-submits the whole batch.
    h.lifecycle
        .create_tasks(&session_id, None, std::slice::from_ref(&request))
        .await?;

    assert_eq!(h.tasks.task_count()?, 1);
    let row = h.results.get(&output).await?.unwrap();
    assert_eq!(
        row.status,
        ResultStatus::Completed,
        "re-created result row must not clobber completion"
    );

    Ok(())
}

#[tokio::test]
async fn deleting_an_unfinalized_batch_aborts_its_declared_results() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    let creating_id = TaskId::generate();
    let creating_output = ResultId::generate();
    let creating = TaskCreationRequest::new(creating_id.clone(), ResultId::generate())
        .with_expected_output_keys(vec![creating_output]);
    h.lifecycle
        .create_tasks(&session_id, None, &[creating])
        .await?;

    let (finalized_id, finalized_output) = h.submitted_task(&session_id).await?;

    let deleted = h
        .lifecycle
        .delete_tasks(&session_id, &[creating_id.clone(), finalized_id.clone()])
        .await?;

    assert_eq!(deleted, 1, "only the Creating row may be deleted");
    assert!(h.tasks.get(&creating_id).await?.is_none());
    assert_eq!(
        h.results.get(&creating_output).await?.unwrap().status,
        ResultStatus::Aborted
    );

    // The finalized task and its result are untouched.
    assert_eq!(h.task_status(&finalized_id).await?, TaskStatus::Submitted);
    assert_eq!(
        h.results.get(&finalized_output).await?.unwrap().status,
        ResultStatus::Created
    );

    Ok(())
}

#[tokio::test]
async fn deleting_a_delegate_spares_the_parents_output() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;

    // A running parent hands its own declared output to a sub-task.
    let (parent_id, delegated) = h.processing_task(&session_id).await?;

    let child_id = TaskId::generate();
    let child_output = ResultId::generate();
    let child = TaskCreationRequest::new(child_id.clone(), ResultId::generate())
        .with_expected_output_keys(vec![delegated, child_output]);
    h.lifecycle
        .create_tasks(&session_id, Some(&parent_id), &[child])
        .await?;

    let deleted = h.lifecycle.delete_tasks(&session_id, &[child_id]).await?;
    assert_eq!(deleted, 1);

    // Only the result the child itself declared is abandoned. The delegated
    // key still belongs to the parent and stays open for a later attempt.
    assert_eq!(
        h.results.get(&child_output).await?.unwrap().status,
        ResultStatus::Aborted
    );
    assert_eq!(
        h.results.get(&delegated).await?.unwrap().status,
        ResultStatus::Created
    );

    Ok(())
}

#[tokio::test]
async fn submitting_to_a_closed_session_is_rejected() -> Result<()> {
    let h = Harness::new();
    let session_id = h.running_session().await?;
    h.lifecycle.close_session(&session_id).await?;

    let request = TaskCreationRequest::new(TaskId::generate(), ResultId::generate());
    let err = h
        .lifecycle
        .create_tasks(&session_id, None, &[request])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        gridflow_engine::error::Error::PreconditionFailed { .. }
    ));

    Ok(())
}
