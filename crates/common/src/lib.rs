pub mod domain;
pub mod nats;
pub mod postgres;
pub mod s3;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub use domain::{MockDeadLetterSink, MockMetadataSink, MockRawObjectSink};
#[cfg(any(test, feature = "testing"))]
pub use nats::{MockJetStreamConsumer, MockMessageAcker, MockPullConsumer};
