use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use mom_transport::{
    //
    create_memory_transport_with_config,
    run,
    Error,
    MemoryConfig,
    Result,
    Topic,
    TopicConsumer,
    Transport,
    TransportPtr,
};

/// Collects every payload of one topic, failing on payloads marked "bad".
struct Collector {
    // ---
    topic: Topic,
    received: Arc<Mutex<Vec<Bytes>>>,
    failures: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl TopicConsumer for Collector {
    // ---
    fn topic(&self) -> Topic {
        self.topic.clone()
    }

    async fn handle_message(&self, payload: Bytes) -> Result<()> {
        // ---
        if payload.as_ref() == b"bad" {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Transport("rejected payload".into()));
        }
        self.received.lock().await.push(payload);
        Ok(())
    }
}

struct OrdersService {
    // ---
    handle: JoinHandle<Result<()>>,
    received: Arc<Mutex<Vec<Bytes>>>,
    failures: Arc<AtomicUsize>,
    transport: TransportPtr,
}

impl OrdersService {
    // ---
    async fn new(id: &str) -> Result<Self> {
        // ---
        let transport = create_memory_transport_with_config(MemoryConfig::new(id)).await?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(AtomicUsize::new(0));

        let collector = Collector {
            topic: Topic::from("orders"),
            received: received.clone(),
            failures: failures.clone(),
        };
        let handle = run(transport.clone(), collector).await?;

        Ok(Self {
            handle,
            received,
            failures,
            transport,
        })
    }

    async fn shutdown(self) -> Result<Vec<Bytes>> {
        // ---
        log::info!("{}: shutting down", self.transport.transport_id());
        self.transport.stop().await;

        // JoinError -> panic, inner Result -> ?
        self.handle.await.expect("consumer task panicked")?;

        let received = self.received.lock().await.clone();
        Ok(received)
    }
}

#[tokio::test]
async fn test_consumer_receives_all_messages() -> Result<()> {
    // ---
    init_logging();

    let service = OrdersService::new("test_consumer_receives_all_messages").await?;
    let tx = service.transport.send("orders")?;

    for i in 0..100u32 {
        tx.send(i.to_be_bytes().to_vec()).await?;
    }

    let received = timeout(Duration::from_secs(2), service.shutdown())
        .await
        .expect("shutdown hung")?;

    let expected: Vec<Bytes> = (0..100u32)
        .map(|i| Bytes::from(i.to_be_bytes().to_vec()))
        .collect();
    assert_eq!(received, expected);
    Ok(())
}

#[tokio::test]
async fn test_consumer_survives_handler_errors() -> Result<()> {
    // ---
    init_logging();

    let service = OrdersService::new("test_consumer_survives_handler_errors").await?;
    let failures = service.failures.clone();
    let tx = service.transport.send("orders")?;

    tx.send("one").await?;
    tx.send("bad").await?;
    tx.send("two").await?;

    let received = timeout(Duration::from_secs(2), service.shutdown())
        .await
        .expect("shutdown hung")?;

    assert_eq!(received, vec!["one", "two"]);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_error_channel_stays_empty() -> Result<()> {
    // ---
    init_logging();

    let transport =
        create_memory_transport_with_config(MemoryConfig::new("test_error_channel")).await?;
    let errors = transport.err_chan();

    let drain_errors = tokio::spawn(async move {
        let mut count = 0;
        while errors.recv().await.is_some() {
            count += 1;
        }
        count
    });

    let tx = transport.send("orders")?;
    let rx = transport.receive("orders")?;
    tx.send("a").await?;
    rx.recv().await;

    transport.stop().await;

    let count = timeout(Duration::from_secs(2), drain_errors)
        .await
        .expect("error channel never closed")
        .expect("error drain panicked");
    assert_eq!(count, 0);
    Ok(())
}

mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}

pub fn init_logging() {
    imp::init();
}
