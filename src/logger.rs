use crate::eventbus::TouchListener;
use crate::touch::TouchSample;
use log::debug;

/// A listener that logs every touch edge at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl LogListener {
    pub fn new() -> Self {
        LogListener
    }
}

impl TouchListener for LogListener {
    fn on_touch(&self, sample: &TouchSample) {
        let edge = if sample.active { "down" } else { "up" };
        debug!(
            "[touch] {edge} id={} x={} y={} t={}ms",
            sample.contact_id, sample.x, sample.y, sample.timestamp_ms
        );
    }
}
