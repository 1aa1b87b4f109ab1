mod support;

use dripline::{application::lifecycle::LifecycleError, domain::types::SendStatus};
use support::{Harness, monday_noon};

#[tokio::test]
async fn stop_all_covers_every_enrollment_of_the_address() {
    let harness = Harness::new();
    let first_journey = harness.store.add_journey("First", false);
    let second_journey = harness.store.add_journey("Second", false);
    harness.store.add_step(first_journey.id, 1, None, 0, None);
    harness.store.add_step(second_journey.id, 1, None, 0, None);

    let first = harness.enroll(first_journey.id, "ada@example.org").await;
    let second = harness.enroll(second_journey.id, "ada@example.org").await;
    let other = harness.enroll(first_journey.id, "bob@example.org").await;

    assert!(harness.lifecycle.stop_all(first.id).await);

    for enrollment in [first.id, second.id] {
        assert!(
            harness
                .store
                .sends_for(enrollment)
                .iter()
                .all(|send| send.status == SendStatus::Stopped)
        );
    }
    assert_eq!(
        harness.store.sends_for(other.id)[0].status,
        SendStatus::Pending
    );
}

#[tokio::test]
async fn stop_all_twice_is_harmless() {
    let harness = Harness::new();
    let journey = harness.store.add_journey("First", false);
    harness.store.add_step(journey.id, 1, None, 0, None);
    harness.store.add_step(journey.id, 2, None, 0, None);
    let enrollment = harness.enroll(journey.id, "ada@example.org").await;

    assert_eq!(harness.lifecycle.try_stop_all(enrollment.id).await.unwrap(), 2);
    assert_eq!(harness.lifecycle.try_stop_all(enrollment.id).await.unwrap(), 0);
    assert!(harness.lifecycle.stop_all(enrollment.id).await);
}

#[tokio::test]
async fn stop_all_reports_unknown_enrollment() {
    let harness = Harness::new();

    assert!(!harness.lifecycle.stop_all(77).await);
    assert!(matches!(
        harness.lifecycle.try_stop_all(77).await,
        Err(LifecycleError::EnrollmentNotFound(77))
    ));
}

#[tokio::test]
async fn stop_single_is_scoped_to_the_step_journey() {
    let harness = Harness::new();
    let journey = harness.store.add_journey("Main", false);
    let other_journey = harness.store.add_journey("Side", false);
    let step_one = harness.store.add_step(journey.id, 1, None, 0, None);
    harness.store.add_step(journey.id, 2, None, 0, None);
    let side_step = harness.store.add_step(other_journey.id, 1, None, 0, None);

    let enrollment = harness.enroll(journey.id, "ada@example.org").await;
    let side_send = harness.store.add_send(
        enrollment.id,
        side_step.id,
        monday_noon(),
        SendStatus::Pending,
    );

    assert_eq!(
        harness
            .lifecycle
            .try_stop_single(enrollment.id, step_one.id)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        harness.store.send(side_send.id).map(|send| send.status),
        Some(SendStatus::Pending)
    );

    // Nothing left to stop; still a success.
    assert!(harness.lifecycle.stop_single(enrollment.id, step_one.id).await);
    assert_eq!(
        harness
            .lifecycle
            .try_stop_single(enrollment.id, step_one.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn stop_single_twice_is_harmless() {
    let harness = Harness::new();
    let journey = harness.store.add_journey("Main", false);
    let step = harness.store.add_step(journey.id, 1, None, 0, None);
    harness.store.add_step(journey.id, 2, None, 0, None);
    let enrollment = harness.enroll(journey.id, "ada@example.org").await;

    assert!(harness.lifecycle.stop_single(enrollment.id, step.id).await);
    let after_first = harness.store.sends_for(enrollment.id);
    assert!(
        after_first
            .iter()
            .all(|send| send.status == SendStatus::Stopped)
    );

    assert!(harness.lifecycle.stop_single(enrollment.id, step.id).await);
    assert_eq!(harness.store.sends_for(enrollment.id), after_first);
    assert_eq!(
        harness
            .lifecycle
            .try_stop_single(enrollment.id, step.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn stop_single_never_touches_other_enrollments() {
    let harness = Harness::new();
    let journey = harness.store.add_journey("Main", false);
    let step = harness.store.add_step(journey.id, 1, None, 0, None);
    let ada = harness.enroll(journey.id, "ada@example.org").await;
    let ada_again = harness.enroll(journey.id, "ada@example.org").await;

    assert!(harness.lifecycle.stop_single(ada.id, step.id).await);

    assert_eq!(harness.store.sends_for(ada.id)[0].status, SendStatus::Stopped);
    assert_eq!(
        harness.store.sends_for(ada_again.id)[0].status,
        SendStatus::Pending
    );
}

#[tokio::test]
async fn stop_single_reports_unknown_step() {
    let harness = Harness::new();
    let journey = harness.store.add_journey("Main", false);
    harness.store.add_step(journey.id, 1, None, 0, None);
    let enrollment = harness.enroll(journey.id, "ada@example.org").await;

    assert!(!harness.lifecycle.stop_single(enrollment.id, 9999).await);
}

#[tokio::test]
async fn redirect_moves_enrollment_into_target_journey() {
    let harness = Harness::new();
    let source_journey = harness.store.add_journey("Source", false);
    let target_journey = harness.store.add_journey("Target", false);
    let first_step = harness.store.add_step(source_journey.id, 0, None, 10, None);
    let second_step = harness.store.add_step(source_journey.id, 1, None, 0, None);
    for day in 0..3 {
        harness
            .store
            .add_step(target_journey.id, day, Some("10:00"), 0, None);
    }

    let source = harness.enroll(source_journey.id, "ada@example.org").await;
    let created = harness
        .lifecycle
        .try_redirect(source.id, target_journey.id)
        .await
        .expect("redirect succeeds");

    assert!(
        harness
            .store
            .sends_for(source.id)
            .iter()
            .all(|send| send.status == SendStatus::Stopped)
    );

    assert_eq!(created.journey_id, target_journey.id);
    assert_eq!(created.email, source.email);
    assert_eq!(created.list_entry_id, source.list_entry_id);
    let new_sends = harness.store.sends_for(created.id);
    assert_eq!(new_sends.len(), 3);
    assert!(new_sends.iter().all(|send| send.status == SendStatus::Pending));

    assert_eq!(harness.store.counts(first_step.id, source.id).stopped, 1);
    assert_eq!(harness.store.counts(second_step.id, source.id).stopped, 1);
    // The most recently created send of the old enrollment carries the redirect.
    assert_eq!(harness.store.counts(second_step.id, source.id).redirected, 1);
    assert_eq!(harness.store.counts(first_step.id, source.id).redirected, 0);
}

#[tokio::test]
async fn redirect_only_counts_steps_that_were_pending() {
    let harness = Harness::new();
    let source_journey = harness.store.add_journey("Source", false);
    let target_journey = harness.store.add_journey("Target", false);
    let sent_step = harness.store.add_step(source_journey.id, 0, None, 10, None);
    let pending_step = harness.store.add_step(source_journey.id, 1, None, 0, None);
    harness.store.add_step(target_journey.id, 1, None, 0, None);

    let source = harness.enroll(source_journey.id, "ada@example.org").await;
    let sent = harness
        .store
        .sends_for(source.id)
        .iter()
        .find(|send| send.step_id == sent_step.id)
        .map(|send| send.id)
        .expect("send for first step");
    harness.store.force_status(sent, SendStatus::Sent);

    assert!(harness.lifecycle.redirect(source.id, target_journey.id).await);

    assert_eq!(harness.store.counts(sent_step.id, source.id).stopped, 0);
    assert_eq!(harness.store.counts(pending_step.id, source.id).stopped, 1);
    assert_eq!(
        harness.store.send(sent).map(|send| send.status),
        Some(SendStatus::Sent)
    );
}

#[tokio::test]
async fn redirect_to_unknown_journey_fails() {
    let harness = Harness::new();
    let journey = harness.store.add_journey("Source", false);
    harness.store.add_step(journey.id, 1, None, 0, None);
    let source = harness.enroll(journey.id, "ada@example.org").await;

    assert!(!harness.lifecycle.redirect(source.id, 4242).await);
    assert!(matches!(
        harness.lifecycle.try_redirect(source.id, 4242).await,
        Err(LifecycleError::JourneyNotFound(4242))
    ));
    assert_eq!(harness.store.enrollments_for("ada@example.org").len(), 1);
}

#[tokio::test]
async fn branch_inherits_target_bypass_flag() {
    let harness = Harness::new();
    let source_journey = harness.store.add_journey("Source", false);
    let target_journey = harness.store.add_journey("Open", true);
    harness.store.add_step(target_journey.id, 1, None, 0, None);
    let source = harness.enroll(source_journey.id, "ada@example.org").await;

    let created = harness
        .lifecycle
        .try_redirect(source.id, target_journey.id)
        .await
        .expect("redirect succeeds");

    assert!(created.bypass);
    assert_eq!(created.enrolled_at.nanosecond(), 0);
}
