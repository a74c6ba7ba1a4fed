// tests/shutdown.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use mom_transport::{
    // ---
    Error,
    MemoryConfig,
    MemoryTransport,
    Transport,
};

const WAIT: Duration = Duration::from_secs(2);

fn transport(id: &str) -> MemoryTransport {
    MemoryTransport::new(MemoryConfig::new(id)).expect("failed to create memory transport")
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime")
}

#[tokio::test]
async fn stop_without_topics_completes_immediately() {
    // ---
    let transport = transport("swtci");
    let done = transport.done();
    let errors = transport.err_chan();

    assert!(!done.is_done());

    timeout(WAIT, transport.stop()).await.expect("stop hung");

    assert!(done.is_done());
    assert!(transport.is_stopped());
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn stop_closes_idle_topic_for_waiting_consumer() {
    // ---
    // Arrange
    // ---
    let transport = transport("scitf");
    let rx = transport.receive("orders").unwrap();

    let consumer = tokio::spawn(async move { rx.recv().await });

    // ---
    // Act
    // ---
    timeout(WAIT, transport.stop()).await.expect("stop hung");

    // ---
    // Assert
    // ---
    let received = timeout(WAIT, consumer)
        .await
        .expect("consumer never woke")
        .unwrap();
    assert_eq!(received, None);
    assert!(transport.receive("orders").unwrap().is_closed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_buffered_messages_to_drain() {
    // ---
    let transport = transport("swfbm");

    let tx = transport.send("orders").unwrap();
    for payload in ["a", "b", "c"] {
        tx.send(payload).await.unwrap();
    }

    let stopper = tokio::spawn({
        let transport = transport.clone();
        async move { transport.stop().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopper.is_finished(), "stop returned with undrained messages");
    assert!(!transport.done().is_done());

    // Consumer attaching after stop still gets everything, in order.
    let rx = transport.receive("orders").unwrap();
    let mut received = Vec::new();
    while let Some(payload) = timeout(WAIT, rx.recv()).await.expect("recv hung") {
        received.push(payload);
    }

    assert_eq!(received, vec!["a", "b", "c"]);
    timeout(WAIT, stopper).await.expect("stop hung").unwrap();
    assert!(transport.done().is_done());
}

#[tokio::test]
async fn sends_during_draining_are_still_delivered() {
    // ---
    let transport = transport("sddas");

    let tx = transport.send("orders").unwrap();
    let rx = transport.receive("orders").unwrap();
    tx.send("before").await.unwrap();

    let stopper = tokio::spawn({
        let transport = transport.clone();
        async move { transport.stop().await }
    });
    tokio::task::yield_now().await;

    tx.send("during").await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"before"));
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"during"));
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);

    timeout(WAIT, stopper).await.expect("stop hung").unwrap();
}

#[tokio::test]
async fn stop_twice_is_a_no_op() {
    // ---
    let transport = transport("stian");
    let _rx = transport.receive("orders").unwrap();

    timeout(WAIT, transport.stop()).await.expect("first stop hung");
    timeout(WAIT, transport.stop()).await.expect("second stop hung");

    assert!(transport.is_stopped());
    assert!(transport.done().is_done());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stops_all_return() {
    // ---
    let transport = transport("csaar");
    for name in ["a", "b", "c"] {
        transport.send(name).unwrap().send("x").await.unwrap();
        transport.receive(name).unwrap().recv().await.unwrap();
    }

    let mut stoppers = Vec::new();
    for _ in 0..10 {
        let transport = transport.clone();
        stoppers.push(tokio::spawn(async move { transport.stop().await }));
    }

    for stopper in stoppers {
        timeout(WAIT, stopper).await.expect("stop hung").unwrap();
    }
    assert!(transport.is_stopped());
    assert!(transport.err_chan().recv().await.is_none());
}

#[tokio::test]
async fn topics_after_stop_are_closed() {
    // ---
    let transport = transport("tasac");
    let tx = transport.send("orders").unwrap();

    transport.stop().await;

    let err = tx.send("late").await.unwrap_err();
    assert!(matches!(err, Error::TopicClosed(ref topic) if topic.as_str() == "orders"));

    let fresh = transport.receive("never-seen").unwrap();
    assert!(fresh.is_closed());
    assert_eq!(fresh.recv().await, None);
    assert!(matches!(
        transport.send("never-seen").unwrap().try_send("x"),
        Err(Error::TopicClosed(_))
    ));
}

#[tokio::test]
async fn stop_timeout_expires_on_undrained_topic() {
    // ---
    let transport = transport("stteo");
    let tx = transport.send("stuck").unwrap();
    tx.send("pending").await.unwrap();

    let err = transport
        .stop_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StopTimeout(_)));
    assert!(!transport.done().is_done());

    // Shutdown keeps going once the topic is consumed.
    let rx = transport.receive("stuck").unwrap();
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"pending"));

    timeout(WAIT, transport.done().wait())
        .await
        .expect("done never fired");
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn stop_timeout_succeeds_when_drained() {
    // ---
    let transport = transport("stswd");
    let _tx = transport.send("orders").unwrap();

    transport
        .stop_timeout(Duration::from_secs(1))
        .await
        .expect("stop_timeout failed");
    assert!(transport.is_stopped());
}

#[tokio::test]
async fn done_signal_clones_observe_completion() {
    // ---
    let transport = transport("dscoc");
    let done = transport.done();
    let waiter = tokio::spawn({
        let done = done.clone();
        async move { done.wait().await }
    });

    transport.stop().await;

    timeout(WAIT, waiter).await.expect("waiter hung").unwrap();
    assert!(done.is_done());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn acknowledged_sends_racing_stop_are_all_received() {
    // ---
    for round in 0..100 {
        // ---
        // Arrange
        // ---
        let transport = transport(&format!("asrsa-{round}"));
        let rx = transport.receive("orders").unwrap();

        let consumer = tokio::spawn(async move {
            let mut received = 0usize;
            while rx.recv().await.is_some() {
                received += 1;
            }
            received
        });

        let mut senders = Vec::new();
        for _ in 0..4 {
            let tx = transport.send("orders").unwrap();
            senders.push(tokio::spawn(async move {
                let mut acked = 0usize;
                for i in 0..200u32 {
                    if tx.send(i.to_be_bytes().to_vec()).await.is_err() {
                        break;
                    }
                    acked += 1;
                }
                acked
            }));
        }

        // ---
        // Act
        // ---
        tokio::task::yield_now().await;
        timeout(WAIT, transport.stop()).await.expect("stop hung");

        // ---
        // Assert
        // ---
        let mut acked = 0;
        for sender in senders {
            acked += timeout(WAIT, sender).await.expect("sender hung").unwrap();
        }
        let received = timeout(WAIT, consumer)
            .await
            .expect("consumer hung")
            .unwrap();
        assert_eq!(acked, received, "round {round}: acknowledged payloads lost");
    }
}

#[test]
fn topic_survives_the_runtime_that_created_it() {
    // ---
    // Arrange
    // ---
    let transport = transport("tsrtc");

    let first = runtime();
    let rx = first
        .block_on(async { transport.receive("orders") })
        .expect("receive handle");
    drop(first);

    assert!(!rx.is_closed());
    assert!(!transport.is_stopped());

    // ---
    // Act
    // ---
    let second = runtime();
    second.block_on(async {
        let tx = transport.send("orders").unwrap();
        assert!(!tx.is_closed());
        tx.send("later").await.expect("send on surviving topic");

        // ---
        // Assert
        // ---
        let received = timeout(WAIT, rx.recv()).await.expect("recv hung");
        assert_eq!(received, Some(Bytes::from_static(b"later")));

        // The restarted drain task takes part in shutdown.
        timeout(WAIT, transport.stop()).await.expect("stop hung");
        assert_eq!(rx.recv().await, None);
    });

    assert!(transport.done().is_done());
}

#[test]
fn stop_drains_topic_left_behind_by_dropped_runtime() {
    // ---
    let transport = transport("sdtlb");

    let first = runtime();
    first.block_on(async {
        transport.send("orders").unwrap().send("a").await.unwrap();
    });
    drop(first);

    let second = runtime();
    second.block_on(async {
        let stopper = tokio::spawn({
            let transport = transport.clone();
            async move { transport.stop().await }
        });
        tokio::task::yield_now().await;
        assert!(!transport.done().is_done(), "stopped with a buffered payload");

        let rx = transport.receive("orders").unwrap();
        let received = timeout(WAIT, rx.recv()).await.expect("recv hung");
        assert_eq!(received, Some(Bytes::from_static(b"a")));

        timeout(WAIT, stopper).await.expect("stop hung").unwrap();
        assert_eq!(rx.recv().await, None);
    });
}

#[tokio::test]
async fn dropping_the_transport_closes_its_topics() {
    // ---
    let transport = transport("dttci");
    let tx = transport.send("orders").unwrap();
    let rx = transport.receive("orders").unwrap();
    tx.send("a").await.unwrap();

    drop(transport);

    // Buffered payloads are still delivered before the close.
    let received = timeout(WAIT, rx.recv()).await.expect("recv hung");
    assert_eq!(received, Some(Bytes::from_static(b"a")));

    let received = timeout(WAIT, rx.recv())
        .await
        .expect("receiver never saw the close");
    assert_eq!(received, None);
    assert!(rx.is_closed());
    assert!(matches!(tx.send("b").await, Err(Error::TopicClosed(_))));
}
