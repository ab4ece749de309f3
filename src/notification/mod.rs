pub mod sink;

pub use sink::{NotificationSink, SinkTiming};
