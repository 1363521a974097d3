use std::sync::Arc;

use services::{CatalogSyncService, Clock, FlowError, SessionFlowService};
use storage::repository::InMemoryRepository;
use trainer_core::model::{Difficulty, QuestionDraft, SessionId, UserId};
use trainer_core::time::fixed_now;

fn flow(repo: &InMemoryRepository) -> SessionFlowService {
    SessionFlowService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
}

fn sync(repo: &InMemoryRepository) -> CatalogSyncService {
    CatalogSyncService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()))
}

fn draft(code: &str, text: &str) -> QuestionDraft {
    QuestionDraft::new(code, text, None, Difficulty::Basic).unwrap()
}

async fn seed(repo: &InMemoryRepository, suite: &str, questions: &[(&str, &str)]) {
    let records: Vec<QuestionDraft> = questions
        .iter()
        .map(|(code, text)| draft(code, text))
        .collect();
    sync(repo).sync_suite(suite, &records).await.unwrap();
}

#[tokio::test]
async fn walks_a_suite_in_code_order_and_snapshots_answers() {
    let repo = InMemoryRepository::new();
    // Deliberately seeded out of order; the flow must order by code.
    seed(&repo, "mos", &[("mos_002", "Second"), ("mos_001", "First")]).await;

    let flow = flow(&repo);
    let session = flow.start(UserId::new(1), "mos").await.unwrap();

    let q = flow.current_question(session.id()).await.unwrap().unwrap();
    assert_eq!(q.code(), "mos_001");
    assert_eq!(q.text(), "First");

    flow.append_to_draft(session.id(), "a").await.unwrap();
    flow.append_to_draft(session.id(), "b").await.unwrap();

    let next = flow.next(session.id()).await.unwrap().unwrap();
    assert_eq!(next.code(), "mos_002");

    let answers = flow.answers(session.id()).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].answer_text(), "a\nb");
    assert_eq!(answers[0].question_text_snapshot(), "First");
    assert_eq!(answers[0].question_id(), Some(q.id()));

    // Blank transport frame: silent no-op, no snapshot on advance.
    flow.append_to_draft(session.id(), "   \t").await.unwrap();
    assert!(flow.next(session.id()).await.unwrap().is_none());
    assert_eq!(flow.answers(session.id()).await.unwrap().len(), 1);

    // Past the end the user can still leave parting words.
    flow.append_to_draft(session.id(), "afterword").await.unwrap();
    flow.finish(session.id()).await.unwrap();

    let answers = flow.answers(session.id()).await.unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[1].answer_text(), "afterword");
    assert_eq!(answers[1].question_text_snapshot(), "");
    assert_eq!(answers[1].question_id(), None);

    let stored = repo_session(&repo, session.id()).await;
    assert!(!stored.is_in_progress());
    assert_eq!(stored.finished_at(), Some(fixed_now()));
}

#[tokio::test]
async fn closed_sessions_reject_every_mutation() {
    let repo = InMemoryRepository::new();
    seed(&repo, "mos", &[("mos_001", "Q1")]).await;

    let flow = flow(&repo);
    let session = flow.start(UserId::new(1), "mos").await.unwrap();
    flow.finish(session.id()).await.unwrap();

    assert!(matches!(
        flow.finish(session.id()).await,
        Err(FlowError::NotInProgress)
    ));
    assert!(matches!(
        flow.append_to_draft(session.id(), "late").await,
        Err(FlowError::NotInProgress)
    ));
    assert!(matches!(
        flow.next(session.id()).await,
        Err(FlowError::NotInProgress)
    ));
    assert!(matches!(
        flow.current_question(session.id()).await,
        Err(FlowError::NotInProgress)
    ));

    // A failed re-finish must not have duplicated the (empty) snapshot set.
    assert!(flow.answers(session.id()).await.unwrap().is_empty());
}

#[tokio::test]
async fn next_past_the_end_still_snapshots_the_draft() {
    let repo = InMemoryRepository::new();
    seed(&repo, "mos", &[("mos_001", "Only question")]).await;

    let flow = flow(&repo);
    let session = flow.start(UserId::new(1), "mos").await.unwrap();

    // Skip the only question without answering.
    assert!(flow.next(session.id()).await.unwrap().is_none());
    assert!(flow.answers(session.id()).await.unwrap().is_empty());

    // The index already equals the active-question count; a draft typed here
    // is still kept, with nothing to snapshot it against.
    flow.append_to_draft(session.id(), "one more thing").await.unwrap();
    assert!(flow.next(session.id()).await.unwrap().is_none());

    let answers = flow.answers(session.id()).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].answer_text(), "one more thing");
    assert_eq!(answers[0].question_text_snapshot(), "");
    assert_eq!(answers[0].question_id(), None);
}

#[tokio::test]
async fn start_requires_active_questions() {
    let repo = InMemoryRepository::new();
    let flow = flow(&repo);

    assert!(matches!(
        flow.start(UserId::new(1), "mos").await,
        Err(FlowError::NoActiveQuestions { .. })
    ));

    // A suite whose questions were all retired behaves the same.
    seed(&repo, "ed", &[("ed_001", "E1")]).await;
    sync(&repo).sync_suite("ed", &[]).await.unwrap();
    assert!(matches!(
        flow.start(UserId::new(1), "ed").await,
        Err(FlowError::NoActiveQuestions { .. })
    ));
}

#[tokio::test]
async fn starting_again_cancels_the_previous_attempt() {
    let repo = InMemoryRepository::new();
    seed(&repo, "mos", &[("mos_001", "Q1")]).await;
    seed(&repo, "ed", &[("ed_001", "E1")]).await;

    let flow = flow(&repo);
    let first = flow.start(UserId::new(1), "mos").await.unwrap();
    let second = flow.start(UserId::new(1), "ed").await.unwrap();

    let stored_first = repo_session(&repo, first.id()).await;
    assert!(!stored_first.is_in_progress());
    assert!(stored_first.finished_at().is_some());

    // Operations now belong to the new session only.
    assert!(matches!(
        flow.append_to_draft(first.id(), "orphaned").await,
        Err(FlowError::NotInProgress)
    ));
    flow.append_to_draft(second.id(), "fresh").await.unwrap();

    // A different user is unaffected.
    let other = flow.start(UserId::new(2), "mos").await.unwrap();
    assert!(repo_session(&repo, second.id()).await.is_in_progress());
    assert!(repo_session(&repo, other.id()).await.is_in_progress());
}

#[tokio::test]
async fn catalog_sync_mid_session_shifts_the_ordering_but_not_history() {
    let repo = InMemoryRepository::new();
    seed(&repo, "mos", &[("mos_001", "Old wording"), ("mos_002", "Q2")]).await;

    let flow = flow(&repo);
    let session = flow.start(UserId::new(1), "mos").await.unwrap();
    flow.append_to_draft(session.id(), "my answer").await.unwrap();
    flow.next(session.id()).await.unwrap();

    // The source gets reworded and loses mos_002 between two calls.
    seed(&repo, "mos", &[("mos_001", "New wording")]).await;

    // The position now points past the shrunken active set.
    assert!(flow.current_question(session.id()).await.unwrap().is_none());

    // History keeps the wording the user actually saw.
    let answers = flow.answers(session.id()).await.unwrap();
    assert_eq!(answers[0].question_text_snapshot(), "Old wording");
}

#[tokio::test]
async fn unknown_sessions_are_reported_as_missing() {
    let repo = InMemoryRepository::new();
    let flow = flow(&repo);
    let ghost = SessionId::new();

    assert!(matches!(
        flow.current_question(ghost).await,
        Err(FlowError::SessionNotFound)
    ));
    assert!(matches!(
        flow.answers(ghost).await,
        Err(FlowError::SessionNotFound)
    ));
}

async fn repo_session(
    repo: &InMemoryRepository,
    id: SessionId,
) -> trainer_core::model::TrainingSession {
    use storage::repository::SessionRepository;
    repo.get_session(id).await.unwrap().unwrap()
}
