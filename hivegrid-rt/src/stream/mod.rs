//! Named streams: subjects, subscriptions, backpressure, implicit consumers.

pub mod backpressure;
pub mod broker;
pub mod subject;

pub use backpressure::DeliveryPolicy;
pub use broker::{
    ConsumerDelivery, StreamBroker, SubjectStats, SubscriberFilter, SubscriberFn,
    SubscriptionHandle,
};
pub use subject::StreamSubject;
