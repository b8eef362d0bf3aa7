//! Identity source - 프로세스 ID 발급
//!
//! 서버 시작 시 한 번 생성되어 `Arc`로 공유된다. 카운터는 메모리에만 존재하며
//! 재시작 시 0부터 다시 시작한다.

use std::sync::atomic::{AtomicU64, Ordering};

/// Strictly increasing sequence used to name processes.
#[derive(Debug, Default)]
pub struct IdSource {
    next: AtomicU64,
}

impl IdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value in the sequence. Never returns the same value twice.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Next value rendered as a process id
    pub fn next_id(&self) -> String {
        self.next().to_string()
    }
}
