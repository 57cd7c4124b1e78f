// ============================================================================
// Telemetry Interface
// Fire-and-forget counters, gauges and latency measurements
// ============================================================================

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Counter { key: String, value: u64 },
    Gauge { key: String, value: i128 },
    Latency { key: String, elapsed: Duration },
}

/// Telemetry sink. Calls must never block or fail the caller.
pub trait TelemetrySink: Send + Sync {
    fn incr_counter(&self, key: &str, value: u64);

    fn set_gauge(&self, key: &str, value: i128);

    fn measure_latency(&self, key: &str, elapsed: Duration);
}

pub struct NoOpTelemetry;

impl TelemetrySink for NoOpTelemetry {
    fn incr_counter(&self, _key: &str, _value: u64) {}

    fn set_gauge(&self, _key: &str, _value: i128) {}

    fn measure_latency(&self, _key: &str, _elapsed: Duration) {}
}

/// Writes every measurement to `tracing` at debug level
pub struct LoggingTelemetry;

impl TelemetrySink for LoggingTelemetry {
    fn incr_counter(&self, key: &str, value: u64) {
        tracing::debug!(key, value, "telemetry counter");
    }

    fn set_gauge(&self, key: &str, value: i128) {
        tracing::debug!(key, value = %value, "telemetry gauge");
    }

    fn measure_latency(&self, key: &str, elapsed: Duration) {
        tracing::debug!(key, elapsed_us = elapsed.as_micros() as u64, "telemetry latency");
    }
}

/// Forwards measurements over a bounded channel; drops them when it is full.
pub struct ChannelTelemetry {
    sender: Sender<TelemetryEvent>,
}

impl ChannelTelemetry {
    pub fn bounded(capacity: usize) -> (Self, Receiver<TelemetryEvent>) {
        let (sender, receiver) = channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    fn send(&self, event: TelemetryEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                tracing::trace!(?event, "telemetry channel full, dropping");
            },
            Err(TrySendError::Disconnected(_)) => {},
        }
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn incr_counter(&self, key: &str, value: u64) {
        self.send(TelemetryEvent::Counter {
            key: key.to_string(),
            value,
        });
    }

    fn set_gauge(&self, key: &str, value: i128) {
        self.send(TelemetryEvent::Gauge {
            key: key.to_string(),
            value,
        });
    }

    fn measure_latency(&self, key: &str, elapsed: Duration) {
        self.send(TelemetryEvent::Latency {
            key: key.to_string(),
            elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_telemetry_drops_when_full() {
        let (sink, receiver) = ChannelTelemetry::bounded(1);
        sink.incr_counter("a", 1);
        sink.incr_counter("b", 1);

        assert_eq!(
            receiver.try_recv(),
            Ok(TelemetryEvent::Counter {
                key: "a".into(),
                value: 1
            })
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_telemetry_survives_disconnect() {
        let (sink, receiver) = ChannelTelemetry::bounded(4);
        drop(receiver);
        sink.measure_latency("process_proposal", Duration::from_millis(3));
    }
}
