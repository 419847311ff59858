//! Integration-level admission scenarios (S4 from the end-to-end scenario
//! list: queue full at global capacity rejects new requests).

use searchagent_admission::{AdmissionConfig, AdmissionController, RequestPriority};
use searchagent_core::UserId;

#[tokio::test]
async fn scenario_s4_admission_denied_when_global_and_queue_full() {
    let mut config = AdmissionConfig::default();
    config.max_active_global = 1;
    config.max_active_per_user = 10;
    config.queue_capacity = 1;
    config.rate_limit_capacity = 10;
    let controller = AdmissionController::new(config);

    let _first = controller.admit(UserId::new("a"), RequestPriority::Fresh).await.unwrap();
    let _queued = controller.admit(UserId::new("b"), RequestPriority::Fresh).await.unwrap();

    // global slot taken, queue at capacity: third request must be rejected
    let err = controller.admit(UserId::new("c"), RequestPriority::Fresh).await;
    assert!(err.is_err());
    assert_eq!(err.unwrap_err().http_status(), 503);
}

#[tokio::test]
async fn releasing_a_ticket_frees_capacity_for_the_next_admission() {
    let mut config = AdmissionConfig::default();
    config.max_active_global = 1;
    config.max_active_per_user = 10;
    config.rate_limit_capacity = 10;
    let controller = AdmissionController::new(config);

    let ticket = controller.admit(UserId::new("a"), RequestPriority::Fresh).await.unwrap();
    ticket.release();

    let second = controller.admit(UserId::new("b"), RequestPriority::Fresh).await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn breaker_is_shared_across_lookups_for_same_dependency() {
    let mut config = AdmissionConfig::default();
    config.breaker_failure_threshold = 1;
    let controller = AdmissionController::new(config);
    let a = controller.breaker("llm");
    let b = controller.breaker("llm");
    a.record_failure();
    assert_eq!(b.state(), searchagent_admission::BreakerState::Open);
}
