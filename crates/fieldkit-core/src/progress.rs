//! Progress reporting.
//!
//! Long-running operations accept an optional sink. The scanner invokes it
//! from many workers at once, so implementations must be `Send + Sync`.

/// A single-method receiver for progress values.
pub trait ProgressSink<T>: Send + Sync {
    fn report(&self, value: T);
}

impl<T, F> ProgressSink<T> for F
where
    F: Fn(T) + Send + Sync,
{
    fn report(&self, value: T) {
        self(value)
    }
}

/// Report through an optional sink; absent sinks are a no-op.
pub fn report<T>(sink: Option<&dyn ProgressSink<T>>, value: T) {
    if let Some(sink) = sink {
        sink.report(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |v: u8| seen.lock().unwrap().push(v);
        report(Some(&sink as &dyn ProgressSink<u8>), 10);
        report(Some(&sink as &dyn ProgressSink<u8>), 20);
        assert_eq!(*seen.lock().unwrap(), vec![10, 20]);
    }

    #[test]
    fn test_absent_sink_is_noop() {
        report::<u8>(None, 50);
    }
}
