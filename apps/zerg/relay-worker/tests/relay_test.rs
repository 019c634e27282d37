use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use worker_pool::{BincodeCodec, Codec, MemoryBroker, MemoryBrokerConfig, Service};
use zerg_relay_worker::job::{RelayJob, RelayMessage, RelayedMessage};

#[tokio::test(start_paused = true)]
async fn test_relay_pool_publishes_every_message() {
    let broker = MemoryBroker::new(MemoryBrokerConfig {
        ack_wait: Duration::from_secs(1),
        max_redeliveries: 1,
        receive_capacity: 16,
    });

    let good = broker.enqueue(
        BincodeCodec
            .encode(&RelayMessage {
                id: "m-1".to_string(),
                body: "payload".to_string(),
                headers: BTreeMap::new(),
            })
            .unwrap(),
    );
    let rejected = broker.enqueue(
        BincodeCodec
            .encode(&RelayMessage {
                id: String::new(),
                body: "no id".to_string(),
                headers: BTreeMap::new(),
            })
            .unwrap(),
    );

    let service =
        Arc::new(Service::new(2, broker, RelayJob::new("relay-test"), BincodeCodec).unwrap());
    let handle = service.shutdown_handle();
    let task = tokio::spawn({
        let service = service.clone();
        async move { service.run_until(std::future::pending()).await }
    });

    for _ in 0..1_000 {
        if service.broker().is_acked(good) && service.broker().is_dead(rejected) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    handle.stop();
    task.await.unwrap().unwrap();

    let broker = service.broker();
    assert!(broker.is_acked(good));
    assert!(broker.is_dead(rejected));
    assert_eq!(broker.acks(rejected), 0);

    let published: Vec<RelayedMessage> = broker
        .published()
        .iter()
        .map(|bytes| BincodeCodec.decode(bytes).unwrap())
        .collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, "m-1");
    assert_eq!(published[0].relayed_by, "relay-test");
}
