//! Stream broker behavior: ordering, backpressure policies, implicit
//! consumer activation, and subscription lifecycle.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use hivegrid_rt::{
    ActivationContext, ActorType, ActorTypeDescriptor, ActorTypeRegistry, DeadLetterQueue,
    DeliveryPolicy, ErrorKind, MethodFuture, NoopTelemetry, StreamBroker, StreamSubject,
};
use hivegrid_rt::stream::SubscriberFn;

use common::{test_config, TestCluster};

fn standalone_broker(default_policy: DeliveryPolicy) -> Arc<StreamBroker> {
    StreamBroker::new(
        Arc::new(ActorTypeRegistry::new()),
        Arc::new(DeadLetterQueue::new(64)),
        Arc::new(NoopTelemetry),
        default_policy,
    )
}

fn collecting_subscriber(sink: Arc<Mutex<Vec<u8>>>, delay: Duration) -> SubscriberFn {
    Arc::new(move |_subject, payload: Bytes| {
        let sink = Arc::clone(&sink);
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            sink.lock().push(payload[0]);
        })
    })
}

// ---------------------------------------------------------------------------
// Scenario 6: drop-oldest keeps the freshest suffix
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drop_oldest_keeps_freshest_suffix() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("evt", "e-1");
    broker.configure(subject.clone(), DeliveryPolicy::DropOldest { buffer: 4 });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = broker.subscribe(
        subject.clone(),
        collecting_subscriber(Arc::clone(&seen), Duration::from_millis(5)),
    );

    // The publishes complete without yielding to the drain worker, so the
    // buffer fills and evicts 1..4 before anything is delivered.
    for value in 1..=8u8 {
        broker
            .publish(&subject, Bytes::from(vec![value]), None)
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(300)).await;

    let seen = seen.lock().clone();
    assert_eq!(seen, vec![5, 6, 7, 8], "expected the freshest suffix in order");

    let stats = broker.stats(&subject).unwrap();
    assert_eq!(stats.published, 8);
    assert!(stats.dropped >= 4, "dropped {} < 4", stats.dropped);
    assert!(stats.peak_depth >= 4);

    broker.stop().await;
}

// ---------------------------------------------------------------------------
// Per-publisher ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscriber_observes_publish_order() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("seq", "s-1");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = broker.subscribe(
        subject.clone(),
        collecting_subscriber(Arc::clone(&seen), Duration::ZERO),
    );

    for value in 0..50u8 {
        broker
            .publish(&subject, Bytes::from(vec![value]), None)
            .await
            .unwrap();
    }

    let seen = seen.lock().clone();
    assert_eq!(seen, (0..50u8).collect::<Vec<_>>());

    broker.stop().await;
}

// ---------------------------------------------------------------------------
// Block policy suspends and honors the publish deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn block_policy_times_out_when_full() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("blk", "b-1");
    broker.configure(subject.clone(), DeliveryPolicy::Block { buffer: 1 });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = broker.subscribe(
        subject.clone(),
        collecting_subscriber(Arc::clone(&seen), Duration::from_secs(5)),
    );

    broker
        .publish(&subject, Bytes::from_static(&[1]), None)
        .await
        .unwrap();

    // Buffer holds one message and the subscriber is stuck; the next
    // deadline-bounded publish must give up.
    let started = std::time::Instant::now();
    let mut timed_out = false;
    for value in 2..=3u8 {
        if let Err(err) = broker
            .publish(
                &subject,
                Bytes::from(vec![value]),
                Some(Duration::from_millis(100)),
            )
            .await
        {
            assert_eq!(err.kind(), ErrorKind::Timeout);
            timed_out = true;
            break;
        }
    }
    assert!(timed_out, "a publish into the stuck subject should time out");
    assert!(started.elapsed() < Duration::from_secs(2));

    broker.stop().await;
}

// ---------------------------------------------------------------------------
// Throttle policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn throttle_reject_limits_rate() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("thr", "t-1");
    broker.configure(
        subject.clone(),
        DeliveryPolicy::Throttle {
            max_per_window: 2,
            window: Duration::from_millis(500),
            block: false,
        },
    );

    broker
        .publish(&subject, Bytes::from_static(&[1]), None)
        .await
        .unwrap();
    broker
        .publish(&subject, Bytes::from_static(&[2]), None)
        .await
        .unwrap();

    let err = broker
        .publish(&subject, Bytes::from_static(&[3]), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Throttled);
    assert!(err.retry_after().is_some());

    let stats = broker.stats(&subject).unwrap();
    assert_eq!(stats.published, 2);
    assert!(stats.throttle_events >= 1);

    broker.stop().await;
}

#[tokio::test]
async fn throttle_block_delays_excess_publishes() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("thr", "t-2");
    let window = Duration::from_millis(200);
    broker.configure(
        subject.clone(),
        DeliveryPolicy::Throttle {
            max_per_window: 2,
            window,
            block: true,
        },
    );

    let started = std::time::Instant::now();
    for value in 1..=3u8 {
        broker
            .publish(&subject, Bytes::from(vec![value]), None)
            .await
            .unwrap();
    }
    assert!(
        started.elapsed() >= Duration::from_millis(150),
        "third publish should have waited for the window"
    );

    broker.stop().await;
}

// ---------------------------------------------------------------------------
// Subscription lifecycle and filters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("life", "l-1");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = broker.subscribe(
        subject.clone(),
        collecting_subscriber(Arc::clone(&seen), Duration::ZERO),
    );

    broker
        .publish(&subject, Bytes::from_static(&[1]), None)
        .await
        .unwrap();
    sub.unsubscribe();
    broker
        .publish(&subject, Bytes::from_static(&[2]), None)
        .await
        .unwrap();

    assert_eq!(seen.lock().clone(), vec![1]);

    broker.stop().await;
}

#[tokio::test]
async fn filtered_subscription_skips_messages() {
    let broker = standalone_broker(DeliveryPolicy::Unbuffered);
    let subject = StreamSubject::new("flt", "f-1");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = broker.subscribe_filtered(
        subject.clone(),
        Arc::new(|payload: &Bytes| payload[0] % 2 == 0),
        collecting_subscriber(Arc::clone(&seen), Duration::ZERO),
    );

    for value in 1..=6u8 {
        broker
            .publish(&subject, Bytes::from(vec![value]), None)
            .await
            .unwrap();
    }

    assert_eq!(seen.lock().clone(), vec![2, 4, 6]);

    broker.stop().await;
}

// ---------------------------------------------------------------------------
// Implicit consumer activation through a silo
// ---------------------------------------------------------------------------

struct Projector {
    seen: u32,
}

fn projector_on_event<'a>(
    actor: &'a mut Projector,
    _ctx: &'a ActivationContext,
    _subject: StreamSubject,
    _payload: Bytes,
) -> MethodFuture<'a, ()> {
    Box::pin(async move {
        actor.seen += 1;
        Ok(())
    })
}

fn projector_seen<'a>(
    actor: &'a mut Projector,
    _ctx: &'a ActivationContext,
    _args: (),
) -> MethodFuture<'a, u32> {
    Box::pin(async move { Ok(actor.seen) })
}

fn projector_type() -> ActorTypeDescriptor {
    ActorType::exclusive("Projector", |_key| Projector { seen: 0 })
        .on_stream(projector_on_event)
        .method("Seen", projector_seen)
        .build()
}

#[tokio::test]
async fn implicit_binding_activates_consumer() {
    let registry = Arc::new(ActorTypeRegistry::new());
    registry.register(projector_type()).unwrap();
    registry.bind_stream("orders", "Projector").unwrap();

    let cluster = TestCluster::start(&["s1"], Arc::clone(&registry), test_config()).await;
    let subject = StreamSubject::new("orders", "o-7");

    for _ in 0..3 {
        cluster.silos[0]
            .streams()
            .publish(&subject, Bytes::from_static(b"{}"), None)
            .await
            .unwrap();
    }

    // The first message lazily activated Projector:o-7; the subject key is
    // the actor id.
    let seen: u32 = cluster
        .client()
        .actor("Projector", "o-7")
        .call("Seen", &())
        .await
        .unwrap();
    assert_eq!(seen, 3);

    cluster.stop().await;
}

#[tokio::test]
async fn implicit_binding_rejects_empty_subject_key() {
    let registry = Arc::new(ActorTypeRegistry::new());
    registry.register(projector_type()).unwrap();
    registry.bind_stream("orders", "Projector").unwrap();

    let cluster = TestCluster::start(&["s1"], Arc::clone(&registry), test_config()).await;

    let err = cluster.silos[0]
        .streams()
        .publish(
            &StreamSubject::new("orders", ""),
            Bytes::from_static(b"{}"),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Marshalling);

    cluster.stop().await;
}
