use crate::error::{PluginError, WriteError};
use crate::events::ShimEvent;
use crate::metric::{Fields, Metric, Tags, Timestamp};
use crate::writer::MetricWriter;
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Sink that input plugins report measurements into
///
/// Cheap to clone; every clone writes through the same [`MetricWriter`].
/// Service plugins keep a clone in their background threads. Each report is
/// written synchronously, so a slow output stream blocks the reporting
/// caller instead of dropping data.
#[derive(Clone)]
pub struct Accumulator {
    inner: Arc<Inner>,
}

struct Inner {
    writer: MetricWriter,
    /// Channel back to the run loop, used only to report a broken output
    events: Sender<ShimEvent>,
    /// Set once the first fatal write failure has been reported
    failure_reported: AtomicBool,
}

impl Accumulator {
    /// Create an accumulator writing through `writer`
    ///
    /// # Arguments
    ///
    /// * `writer` - Serializer over the output stream
    /// * `events` - Run loop channel that receives `ShimEvent::WriteFailed`
    pub fn new(writer: MetricWriter, events: Sender<ShimEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                writer,
                events,
                failure_reported: AtomicBool::new(false),
            }),
        }
    }

    /// Report one measurement
    ///
    /// Plugins are trusted callers: a measurement with an empty name, no
    /// fields or an empty field key is dropped with a warning.
    pub fn add_fields(&self, name: &str, fields: Fields, tags: Tags, timestamp: Timestamp) {
        match Metric::new(name, fields, tags, timestamp) {
            Ok(metric) => self.add_metric(metric),
            Err(e) => warn!("Dropping invalid measurement: {}", e),
        }
    }

    /// Report an already built metric
    pub fn add_metric(&self, metric: Metric) {
        match self.inner.writer.write(&metric) {
            Ok(()) => {}
            Err(e) if !e.is_fatal() => {
                warn!("Dropping metric '{}': {}", metric.name(), e);
            }
            Err(WriteError::Closed) => {
                debug!("Output closed, dropping metric '{}'", metric.name());
            }
            Err(e) => self.report_failure(e),
        }
    }

    /// Report an error from plugin background work
    ///
    /// These errors are not fatal to the shim; they are only logged.
    pub fn add_error(&self, err: PluginError) {
        error!("Error in input plugin: {}", err);
    }

    /// Whether the output stream has failed
    pub fn is_closed(&self) -> bool {
        self.inner.writer.is_closed()
    }

    fn report_failure(&self, err: WriteError) {
        if self.inner.failure_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inner.events.send(ShimEvent::WriteFailed(err)).is_err() {
            debug!("Run loop already stopped, write failure not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::FieldValue;
    use crate::testutil::{BrokenPipe, SharedBuffer};
    use chrono::DateTime;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn fields(value: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("field".to_string(), FieldValue::Integer(value));
        fields
    }

    fn tags() -> Tags {
        let mut tags = Tags::new();
        tags.insert("tag".to_string(), "tag".to_string());
        tags
    }

    fn ts() -> Timestamp {
        DateTime::from_timestamp(1234, 5678).unwrap()
    }

    #[test]
    fn test_add_fields_writes_line() {
        let buffer = SharedBuffer::new();
        let (tx, _rx) = mpsc::channel();
        let acc = Accumulator::new(MetricWriter::new(Box::new(buffer.clone())), tx);

        acc.add_fields("measurement", fields(1), tags(), ts());

        assert_eq!(
            buffer.contents(),
            "measurement,tag=tag field=1i 1234000005678\n"
        );
    }

    #[test]
    fn test_invalid_measurements_are_dropped() {
        let buffer = SharedBuffer::new();
        let (tx, rx) = mpsc::channel();
        let acc = Accumulator::new(MetricWriter::new(Box::new(buffer.clone())), tx);

        acc.add_fields("", fields(1), tags(), ts());
        acc.add_fields("measurement", Fields::new(), tags(), ts());
        let mut unnamed = fields(1);
        unnamed.insert(String::new(), FieldValue::Integer(2));
        acc.add_fields("measurement", unnamed, tags(), ts());

        assert_eq!(buffer.contents(), "");
        assert!(rx.try_recv().is_err());
        assert!(!acc.is_closed());
    }

    #[test]
    fn test_write_failure_reported_once() {
        let (tx, rx) = mpsc::channel();
        let acc = Accumulator::new(MetricWriter::new(Box::new(BrokenPipe)), tx);

        acc.add_fields("measurement", fields(1), tags(), ts());
        acc.add_fields("measurement", fields(2), tags(), ts());
        acc.add_fields("measurement", fields(3), tags(), ts());

        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(ShimEvent::WriteFailed(WriteError::Io(_))) => {}
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert!(acc.is_closed());
    }

    #[test]
    fn test_clones_share_output() {
        let buffer = SharedBuffer::new();
        let (tx, _rx) = mpsc::channel();
        let acc = Accumulator::new(MetricWriter::new(Box::new(buffer.clone())), tx);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let acc = acc.clone();
                thread::spawn(move || acc.add_fields("measurement", fields(i), tags(), ts()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut lines = buffer.lines();
        lines.sort();
        assert_eq!(
            lines,
            vec![
                "measurement,tag=tag field=0i 1234000005678",
                "measurement,tag=tag field=1i 1234000005678",
                "measurement,tag=tag field=2i 1234000005678",
                "measurement,tag=tag field=3i 1234000005678",
            ]
        );
    }

    #[test]
    fn test_add_error_is_not_fatal() {
        let buffer = SharedBuffer::new();
        let (tx, rx) = mpsc::channel();
        let acc = Accumulator::new(MetricWriter::new(Box::new(buffer.clone())), tx);

        acc.add_error(PluginError::failed("background read failed"));
        acc.add_fields("measurement", fields(1), tags(), ts());

        assert!(rx.try_recv().is_err());
        assert_eq!(buffer.lines().len(), 1);
    }
}
