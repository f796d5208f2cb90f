//! Fault reporting for skipped direction rates.

use serde::Serialize;
use tracing::error;

use gera_common::ExchangeRateId;

/// A row the worker had to skip because its data is broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub error_code: &'static str,
    pub message: String,
    pub exchange_rate_id: ExchangeRateId,
}

/// Receives faults so operators can fix the underlying rows.
pub trait FaultTracker: Send + Sync {
    fn notify(&self, fault: Fault);
}

/// Reports faults as error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFaultTracker;

impl FaultTracker for LogFaultTracker {
    fn notify(&self, fault: Fault) {
        error!(
            exchange_rate_id = %fault.exchange_rate_id,
            code = fault.error_code,
            message = %fault.message,
            "Direction rate fault"
        );
    }
}

/// Keeps faults in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingFaultTracker {
    faults: parking_lot::Mutex<Vec<Fault>>,
}

impl RecordingFaultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> Vec<Fault> {
        self.faults.lock().clone()
    }
}

impl FaultTracker for RecordingFaultTracker {
    fn notify(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }
}
