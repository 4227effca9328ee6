// ABOUTME: Metric names and recording helpers for the dispatch engine
// ABOUTME: Thin wrappers over the metrics facade; no-ops unless an exporter is installed

use crate::pool::Admission;

pub const MESSAGES_RECEIVED: &str = "vacbot_messages_received_total";
pub const TASKS_ADMITTED: &str = "vacbot_tasks_admitted_total";
pub const RESPONSES_SENT: &str = "vacbot_responses_sent_total";
pub const TASK_FAILURES: &str = "vacbot_task_failures_total";
pub const SHUTDOWNS: &str = "vacbot_shutdowns_total";

pub fn record_message_received() {
    metrics::counter!(MESSAGES_RECEIVED).increment(1);
}

pub fn record_admission(admission: Admission) {
    metrics::counter!(TASKS_ADMITTED, "path" => admission.label()).increment(1);
}

pub fn record_response_sent() {
    metrics::counter!(RESPONSES_SENT).increment(1);
}

pub fn record_task_failure(kind: &'static str) {
    metrics::counter!(TASK_FAILURES, "kind" => kind).increment(1);
}

pub fn record_shutdown(outcome: &'static str) {
    metrics::counter!(SHUTDOWNS, "outcome" => outcome).increment(1);
}

/// Register descriptions for every engine metric with the installed recorder
pub fn describe() {
    metrics::describe_counter!(MESSAGES_RECEIVED, "Messages taken from the front-end");
    metrics::describe_counter!(
        TASKS_ADMITTED,
        "Dispatch tasks admitted to the pool, by admission path"
    );
    metrics::describe_counter!(RESPONSES_SENT, "Responses delivered to the front-end");
    metrics::describe_counter!(TASK_FAILURES, "Dispatch tasks that failed, by error kind");
    metrics::describe_counter!(SHUTDOWNS, "Completed stop sequences, by outcome");
}
