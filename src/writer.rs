use crate::error::WriteError;
use crate::line_protocol;
use crate::metric::Metric;
use log::{debug, error};
use std::io::Write;
use std::sync::Mutex;

/// Serializes metrics onto the shared output stream
///
/// Every metric is rendered to one line, terminated with a newline and
/// flushed while holding a single lock, so lines from concurrent callers
/// never interleave. Once a write fails the writer is closed and every
/// later call fails with `WriteError::Closed`.
pub struct MetricWriter {
    /// Output stream plus the closed flag, guarded together
    output: Mutex<Output>,
}

struct Output {
    stream: Box<dyn Write + Send>,
    closed: bool,
}

impl MetricWriter {
    /// Create a writer over any output stream
    ///
    /// # Example
    ///
    /// ```
    /// use execd_shim::writer::MetricWriter;
    ///
    /// let writer = MetricWriter::new(Box::new(std::io::sink()));
    /// assert!(!writer.is_closed());
    /// ```
    pub fn new(stream: Box<dyn Write + Send>) -> Self {
        Self {
            output: Mutex::new(Output {
                stream,
                closed: false,
            }),
        }
    }

    /// Render a metric and append it as a single line
    ///
    /// # Errors
    ///
    /// Returns `WriteError::Serialize` when the metric cannot be rendered (the
    /// stream stays usable), `WriteError::Io` when writing or flushing fails
    /// and `WriteError::Closed` after an earlier I/O failure.
    pub fn write(&self, metric: &Metric) -> Result<(), WriteError> {
        let mut line = line_protocol::render(metric)?;
        line.push('\n');

        let mut output = self.lock();
        if output.closed {
            return Err(WriteError::Closed);
        }

        let stream = &mut output.stream;
        let result = stream
            .write_all(line.as_bytes())
            .and_then(|()| stream.flush());

        match result {
            Ok(()) => {
                debug!("Wrote metric '{}'", metric.name());
                Ok(())
            }
            Err(e) => {
                error!("Failed to write metric '{}': {}", metric.name(), e);
                output.closed = true;
                Err(WriteError::Io(e))
            }
        }
    }

    /// Whether an earlier write failure closed the writer
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Output> {
        self.output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{FieldValue, Fields, Tags};
    use crate::testutil::{BrokenPipe, SharedBuffer};
    use chrono::DateTime;
    use std::sync::Arc;
    use std::thread;

    fn metric(name: &str, value: i64) -> Metric {
        let mut fields = Fields::new();
        fields.insert("field".to_string(), FieldValue::Integer(value));
        let mut tags = Tags::new();
        tags.insert("tag".to_string(), "tag".to_string());
        Metric::new(name, fields, tags, DateTime::from_timestamp(1234, 5678).unwrap()).unwrap()
    }

    #[test]
    fn test_write_appends_newline() {
        let buffer = SharedBuffer::new();
        let writer = MetricWriter::new(Box::new(buffer.clone()));

        writer.write(&metric("measurement", 1)).unwrap();
        writer.write(&metric("measurement", 2)).unwrap();

        assert_eq!(
            buffer.contents(),
            "measurement,tag=tag field=1i 1234000005678\n\
             measurement,tag=tag field=2i 1234000005678\n"
        );
    }

    #[test]
    fn test_write_failure_closes_writer() {
        let writer = MetricWriter::new(Box::new(BrokenPipe));

        match writer.write(&metric("m", 1)) {
            Err(WriteError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("Unexpected result: {:?}", other),
        }
        assert!(writer.is_closed());
        assert!(matches!(writer.write(&metric("m", 1)), Err(WriteError::Closed)));
    }

    #[test]
    fn test_serialize_error_keeps_writer_open() {
        let buffer = SharedBuffer::new();
        let writer = MetricWriter::new(Box::new(buffer.clone()));

        let mut fields = Fields::new();
        fields.insert("nan".to_string(), FieldValue::Float(f64::NAN));
        let bad = Metric::new("m", fields, Tags::new(), DateTime::from_timestamp(1, 0).unwrap())
            .unwrap();

        let err = writer.write(&bad).unwrap_err();
        assert!(!err.is_fatal());
        assert!(!writer.is_closed());

        writer.write(&metric("m", 1)).unwrap();
        assert_eq!(buffer.lines().len(), 1);
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        let buffer = SharedBuffer::with_chunked_writes(3);
        let writer = Arc::new(MetricWriter::new(Box::new(buffer.clone())));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for i in 0..50 {
                        writer.write(&metric(&format!("thread{}", t), i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = buffer.lines();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let parsed = line_protocol::parse(&line).unwrap();
            assert!(parsed.name().starts_with("thread"));
        }
    }
}
