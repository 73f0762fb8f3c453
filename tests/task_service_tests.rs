//! Tests for the Task service: execution, persistence and failure alerts

mod test_harness;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use cron_worker::proto::task_server::Task;
use cron_worker::report::END_TIME_FORMAT;
use cron_worker::store::MemoryStore;
use cron_worker::worker::{CANCELLED, STATUS_ERROR, STATUS_TIMEOUT};
use test_harness::{
    job, process_gone, task_request, wait_until, FailingTaskLog, RecordingNotifier, TestService,
};
use tonic::Request;

#[tokio::test]
async fn test_echo_scenario() {
    let svc = TestService::new().await;

    let response = svc.service.execute(&task_request("echo hi", 42, 7, 5)).await;

    assert_eq!(response.output, "hi\n");
    assert_eq!(response.err, "");
    assert_eq!(response.status, 0);
    assert_eq!(response.host, "10.9.8.7");
    assert!(NaiveDateTime::parse_from_str(&response.endtime, END_TIME_FORMAT).is_ok());

    let log_day = response.endtime[..10].to_string();
    let log_file = svc
        .log_root()
        .join("log/cronlog")
        .join(log_day)
        .join("cron-task-7-42-log.log");
    assert_eq!(tokio::fs::read_to_string(log_file).await.unwrap(), "hi\n");
}

#[tokio::test]
async fn test_run_rpc_returns_response() {
    let svc = TestService::new().await;

    let response = svc
        .service
        .run(Request::new(task_request("echo rpc", 1, 1, 5)))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.output, "rpc\n");
    assert_eq!(response.status, 0);
}

#[tokio::test]
async fn test_result_is_persisted_exactly_once() {
    let svc = TestService::new().await;

    let response = svc.service.execute(&task_request("echo hi", 42, 7, 5)).await;

    let writes = svc.store.writes_for(42).await;
    assert_eq!(writes.len(), 1);
    let record = &writes[0];
    assert_eq!(record.task_id, 42);
    assert_eq!(record.job_id, 7);
    assert_eq!(record.result, "hi\n");
    assert_eq!(record.host, "10.9.8.7");
    assert_eq!(record.status, 0);
    assert_eq!(record.err, "success");
    assert!(record.success);
    assert_eq!(record.end_time, response.endtime);
}

#[tokio::test]
async fn test_success_sends_no_alert() {
    let svc = TestService::new().await;
    svc.store.insert_job(job(7)).await;

    svc.service.execute(&task_request("true", 1, 7, 5)).await;

    assert!(svc.alerts.shutdown(Duration::from_secs(1)).await);
    assert!(svc.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_failure_sends_alert_with_job() {
    let svc = TestService::new().await;
    svc.store.insert_job(job(7)).await;

    let response = svc.service.execute(&task_request("exit 4", 9, 7, 5)).await;
    assert_eq!(response.status, 4);

    assert!(svc.notifier.wait_for(1, Duration::from_secs(2)).await);
    let sent = svc.notifier.sent();
    assert_eq!(sent.len(), 1);
    let (result, job) = &sent[0];
    assert_eq!(result.task_id, 9);
    assert_eq!(result.status, 4);
    assert!(!result.success);
    assert_eq!(job.id, 7);

    // The alert follows the write
    assert_eq!(svc.store.writes_for(9).await.len(), 1);
}

#[tokio::test]
async fn test_timeout_is_reported_and_alerted() {
    let svc = TestService::new().await;
    svc.store.insert_job(job(2)).await;

    let response = svc.service.execute(&task_request("sleep 30", 5, 2, 1)).await;

    assert_eq!(response.status, STATUS_TIMEOUT);
    assert!(!response.err.is_empty());
    assert!(svc.notifier.wait_for(1, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_failure_without_job_record_sends_no_alert() {
    let svc = TestService::new().await;

    let response = svc.service.execute(&task_request("false", 3, 99, 5)).await;
    assert_eq!(response.status, 1);

    assert!(svc.alerts.shutdown(Duration::from_secs(1)).await);
    assert!(svc.notifier.sent().is_empty());
    assert_eq!(svc.store.writes_for(3).await.len(), 1);
}

#[tokio::test]
async fn test_disabled_alerts_are_not_sent() {
    let svc = TestService::new().await;
    let mut quiet = job(8);
    quiet.notify_on_failure = false;
    svc.store.insert_job(quiet).await;

    svc.service.execute(&task_request("false", 4, 8, 5)).await;

    assert!(svc.alerts.shutdown(Duration::from_secs(1)).await);
    assert!(svc.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_task_log_failure_still_returns_response() {
    let store = Arc::new(MemoryStore::new());
    store.insert_job(job(7)).await;
    let svc = TestService::build(
        store,
        Arc::new(FailingTaskLog),
        Arc::new(RecordingNotifier::new()),
    );

    let response = svc.service.execute(&task_request("exit 2", 1, 7, 5)).await;

    assert_eq!(response.status, 2);
    assert!(!response.err.is_empty());
    // Alerting does not depend on the write succeeding
    assert!(svc.notifier.wait_for(1, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_slow_notifier_does_not_delay_response() {
    let svc = TestService::with_notifier(RecordingNotifier::slow(Duration::from_secs(3))).await;
    svc.store.insert_job(job(7)).await;

    let started = Instant::now();
    let response = svc.service.execute(&task_request("false", 1, 7, 5)).await;

    assert_eq!(response.status, 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(svc.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_log_directory_failure_reports_error() {
    let svc = TestService::new().await;
    // A file where the log tree should be
    tokio::fs::write(svc.log_root().join("log"), b"not a directory")
        .await
        .unwrap();

    let response = svc.service.execute(&task_request("echo hi", 1, 1, 5)).await;

    assert_eq!(response.status, STATUS_ERROR);
    assert!(response.err.contains("log directory"));
    assert_eq!(response.host, "10.9.8.7");
    assert_eq!(svc.store.writes_for(1).await.len(), 1);
}

#[tokio::test]
async fn test_empty_command_reports_error() {
    let svc = TestService::new().await;

    let response = svc.service.execute(&task_request("", 1, 1, 5)).await;

    assert_eq!(response.status, STATUS_ERROR);
    assert_eq!(response.err, "empty command");
    assert_eq!(response.output, "");
}

#[tokio::test]
async fn test_curl_to_unreachable_url_fails() {
    let svc = TestService::new().await;
    let mut request = task_request("http://127.0.0.1:1/ping", 1, 1, 2);
    request.querytype = "curl".to_string();

    let response = svc.service.execute(&request).await;

    assert_ne!(response.status, 0);
    assert!(!response.err.is_empty());
}

#[tokio::test]
async fn test_status_and_err_agree() {
    let svc = TestService::new().await;

    for (task_id, command) in ["true", "false", "echo ok", "exit 9", "", "missing_cmd_zz"]
        .into_iter()
        .enumerate()
    {
        let response = svc
            .service
            .execute(&task_request(command, task_id as i64 + 1, 1, 5))
            .await;
        assert_eq!(
            response.status == 0,
            response.err.is_empty(),
            "inconsistent response for {:?}: {:?}",
            command,
            response
        );
    }
}

#[tokio::test]
async fn test_disconnected_caller_still_gets_attempt_recorded() {
    let svc = TestService::new().await;
    svc.store.insert_job(job(7)).await;
    let pid_file = svc.log_root().join("shell.pid");
    let command = format!("echo $$ > {}; sleep 30", pid_file.display());

    // The caller goes away while the command is still running
    let call = svc.service.run(Request::new(task_request(&command, 55, 7, 0)));
    assert!(tokio::time::timeout(Duration::from_millis(500), call)
        .await
        .is_err());

    let store = svc.store.clone();
    let recorded = wait_until(Duration::from_secs(3), move || {
        let store = store.clone();
        async move { !store.writes_for(55).await.is_empty() }
    })
    .await;
    assert!(recorded, "cancelled attempt was never recorded");

    let writes = svc.store.writes_for(55).await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].status, STATUS_ERROR);
    assert_eq!(writes[0].err, CANCELLED);
    assert!(!writes[0].success);
    assert!(svc.notifier.wait_for(1, Duration::from_secs(2)).await);

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || async move { process_gone(pid) }).await,
        "shell {} survived the disconnect",
        pid
    );
}

#[tokio::test]
async fn test_background_child_does_not_delay_response() {
    let svc = TestService::new().await;

    let started = Instant::now();
    let response = svc
        .service
        .execute(&task_request("echo started; sleep 30 &", 12, 1, 0))
        .await;

    assert_eq!(response.status, 0);
    assert_eq!(response.output, "started\n");
    assert_eq!(response.err, "");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(svc.store.writes_for(12).await.len(), 1);
}
