use crate::eventbus::TouchListener;
use crate::touch::TouchSample;

/// Wraps a listener and forwards only samples accepted by a predicate.
///
/// Useful when [`EdgeFilter`](crate::eventbus::EdgeFilter) is too coarse, e.g. to
/// react only to touches inside a screen region.
pub struct FilteredListener {
    predicate: Box<dyn Fn(&TouchSample) -> bool + Send + Sync>,
    inner: Box<dyn TouchListener>,
}

impl FilteredListener {
    pub fn new(
        predicate: impl Fn(&TouchSample) -> bool + Send + Sync + 'static,
        inner: impl TouchListener + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            inner: Box::new(inner),
        }
    }
}

impl TouchListener for FilteredListener {
    fn on_touch(&self, sample: &TouchSample) {
        if (self.predicate)(sample) {
            self.inner.on_touch(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn forwards_only_matching_samples() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let left_half = FilteredListener::new(
            |s| s.x < 15000,
            move |_: &TouchSample| {
                h.fetch_add(1, Ordering::SeqCst);
            },
        );

        left_half.on_touch(&TouchSample::new(1000, 500, true, 0, 0));
        left_half.on_touch(&TouchSample::new(20000, 500, true, 0, 0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
