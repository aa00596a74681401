//! `bgapi` correlation tests: the locally generated Job-UUID means the
//! result handler is always bound before the server can complete the job.

mod common;

use common::{spawn_server, wait_until, ServerBehavior, PASSWORD};
use eslmux::EslConnection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn bgapi_reply_and_handler_result() {
    let server = spawn_server(ServerBehavior::Normal).await;
    let conn = EslConnection::connect("127.0.0.1", server.addr.port(), PASSWORD)
        .await
        .unwrap();

    let result: Arc<Mutex<Option<(bool, String)>>> = Arc::new(Mutex::new(None));
    let slot = result.clone();

    let reply = conn
        .bgapi("status", move |job| {
            *slot
                .lock()
                .unwrap() = Some((job.ok, job.result));
        })
        .await
        .unwrap();

    assert!(reply.ok);
    let job_uuid = reply
        .job_uuid
        .expect("bgapi reply carries the Job-UUID");
    assert!(!job_uuid.is_empty());

    assert!(
        wait_until(2_000, || result
            .lock()
            .unwrap()
            .is_some())
        .await
    );
    let (ok, body) = result
        .lock()
        .unwrap()
        .clone()
        .unwrap();
    assert!(ok);
    assert_eq!(body, "+OK status\n");
}

#[tokio::test]
async fn bgapi_handlers_fire_exactly_once_under_load() {
    let server = spawn_server(ServerBehavior::Normal).await;
    let conn = EslConnection::connect("127.0.0.1", server.addr.port(), PASSWORD)
        .await
        .unwrap();

    // The mock completes every job instantly, so the BACKGROUND_JOB event
    // races the command reply on every single call.
    let fired = Arc::new(AtomicUsize::new(0));
    for _ in 0..1_000 {
        let fired = fired.clone();
        conn.bgapi("status", move |_| {
            fired.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
    }

    assert!(
        wait_until(5_000, || fired.load(Ordering::SeqCst) == 1_000).await,
        "only {} of 1000 handlers fired",
        fired.load(Ordering::SeqCst)
    );

    // Settle time: any double invocation would show up here
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1_000);
}
