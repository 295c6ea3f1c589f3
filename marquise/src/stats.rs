//! Per-client reporting counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::SendKind;

/// Counters accumulated over a client's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStats {
    pub text_sent: u64,
    pub binary_sent: u64,
    pub int_sent: u64,
    pub real_sent: u64,
    pub counter_sent: u64,
    pub send_failures: u64,
    pub connections_opened: u64,
}

impl ReportStats {
    /// Successful sends of every kind.
    pub fn total_sent(&self) -> u64 {
        self.text_sent + self.binary_sent + self.int_sent + self.real_sent + self.counter_sent
    }

    pub fn sent(&self, kind: SendKind) -> u64 {
        match kind {
            SendKind::Text => self.text_sent,
            SendKind::Binary => self.binary_sent,
            SendKind::Int => self.int_sent,
            SendKind::Real => self.real_sent,
            SendKind::Counter => self.counter_sent,
        }
    }
}

/// Lock-free counters shared by every reporting thread.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    sent: [AtomicU64; 5],
    send_failures: AtomicU64,
    connections_opened: AtomicU64,
}

fn slot(kind: SendKind) -> usize {
    match kind {
        SendKind::Text => 0,
        SendKind::Binary => 1,
        SendKind::Int => 2,
        SendKind::Real => 3,
        SendKind::Counter => 4,
    }
}

impl StatsRecorder {
    pub(crate) fn record_sent(&self, kind: SendKind) {
        self.sent[slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ReportStats {
        let sent = |kind| self.sent[slot(kind)].load(Ordering::Relaxed);
        ReportStats {
            text_sent: sent(SendKind::Text),
            binary_sent: sent(SendKind::Binary),
            int_sent: sent(SendKind::Int),
            real_sent: sent(SendKind::Real),
            counter_sent: sent(SendKind::Counter),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
        }
    }
}
