mod common;

use common::RecordingTransport;
use measures_api::services::email::{BulkMailer, MailJob};

fn jobs() -> Vec<MailJob> {
    ["one@acme.test", "two@acme.test", "three@acme.test"]
        .iter()
        .map(|to| MailJob::text(*to, "Hello", "Body"))
        .collect()
}

#[tokio::test]
async fn one_bad_recipient_does_not_stop_the_batch() {
    let transport = RecordingTransport::failing(&["two@acme.test"]);
    let mailer = transport.mailer();

    let outcome = mailer.send_detailed(&jobs()).await;

    assert_eq!(outcome.sent, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(transport.attempts(), 3);
    assert_eq!(
        transport.recipients(),
        vec!["one@acme.test", "three@acme.test"]
    );
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn send_returns_the_success_count() {
    let transport = RecordingTransport::new();
    assert_eq!(transport.mailer().send(&jobs()).await, 3);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn connection_failure_counts_every_job_as_failed() {
    let transport = RecordingTransport::unreachable();
    let mailer = transport.mailer();

    let outcome = mailer.send_detailed(&jobs()).await;

    assert_eq!(outcome.sent, 0);
    assert_eq!(outcome.failed, 3);
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn unconfigured_mailer_only_logs() {
    let mailer = BulkMailer::unconfigured();
    assert!(!mailer.is_configured());
    assert_eq!(mailer.send(&jobs()).await, 0);
}

#[tokio::test]
async fn empty_batch_does_not_connect() {
    let transport = RecordingTransport::new();
    assert_eq!(transport.mailer().send(&[]).await, 0);
    assert_eq!(transport.connects(), 0);
}
