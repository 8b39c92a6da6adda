use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::{Serialize, Serializer};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Serialize for Counter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.get())
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ForwardStats {
    pub loop_success: Counter,
    pub loop_failures: Counter,
    pub report_success: Counter,
    pub report_failures: Counter,
    pub missing_token: Counter,
    pub guid_not_found: Counter,
    pub skipped_young: Counter,
    pub filtered: Counter,
}

#[derive(Debug, Default, Serialize)]
pub struct CompensationStats {
    pub loop_success: Counter,
    pub loop_failures: Counter,
    pub forced_stops: Counter,
    pub skipped_started: Counter,
    pub missing_token: Counter,
    pub guid_not_found: Counter,
}

#[derive(Debug, Default, Serialize)]
pub struct ScanStats {
    pub attempts: Counter,
    pub failures: Counter,
    pub started_apps: Counter,
}

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub read: Counter,
    pub writes: Counter,
    pub skipped_writes: Counter,
}

#[derive(Debug, Default, Serialize)]
pub struct BridgeStats {
    pub forward: ForwardStats,
    pub compensation: CompensationStats,
    pub scan: ScanStats,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerfEntry {
    pub ok: u64,
    pub failed: u64,
    pub total_ms: u64,
    pub last_ms: u64,
}

#[derive(Debug, Default)]
pub struct PerfCounters {
    entries: Mutex<BTreeMap<&'static str, PerfEntry>>,
}

impl PerfCounters {
    pub fn record(&self, name: &'static str, started: Instant, ok: bool) {
        let elapsed = started.elapsed().as_millis() as u64;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(name).or_default();
        if ok {
            entry.ok += 1;
        } else {
            entry.failed += 1;
        }
        entry.total_ms = entry.total_ms.saturating_add(elapsed);
        entry.last_ms = elapsed;
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, PerfEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Serialize for PerfCounters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}
