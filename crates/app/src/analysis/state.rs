//! Latest-result slot and the capture-in-progress flag.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use crate::analysis::data::AnalysisResult;

/// Holds the one committed [`AnalysisResult`] plus the Idle/Capturing flag.
///
/// Readers clone an `Arc` under a read lock, so a capture in flight never
/// blocks them; the write lock is held only for the pointer swap.
#[derive(Default)]
pub(crate) struct ResultState {
    latest: RwLock<Option<Arc<AnalysisResult>>>,
    capturing: AtomicBool,
}

impl ResultState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Last committed result, if any.
    pub(crate) fn read(&self) -> Option<Arc<AnalysisResult>> {
        match self.latest.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install `result` as the latest and return the shared handle.
    pub(crate) fn replace(&self, result: AnalysisResult) -> Arc<AnalysisResult> {
        let result = Arc::new(result);
        match self.latest.write() {
            Ok(mut guard) => *guard = Some(result.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(result.clone()),
        }
        result
    }

    /// Idle → Capturing. Returns `false` without changing anything when a
    /// capture is already running.
    pub(crate) fn begin_capture(&self) -> bool {
        self.capturing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_capture(&self) {
        self.capturing.store(false, Ordering::Release);
    }

    pub(crate) fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// Scoped form of [`begin_capture`](Self::begin_capture): the ticket ends
    /// the capture when dropped.
    pub(crate) fn try_begin_capture(&self) -> Option<CaptureTicket<'_>> {
        self.begin_capture().then_some(CaptureTicket { state: self })
    }
}

/// Proof that the holder owns the single capture slot.
#[must_use = "dropping the ticket immediately ends the capture"]
pub(crate) struct CaptureTicket<'a> {
    state: &'a ResultState,
}

impl Drop for CaptureTicket<'_> {
    fn drop(&mut self) {
        self.state.end_capture();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(timestamp: &str) -> AnalysisResult {
        AnalysisResult {
            timestamp: timestamp.into(),
            segments: Vec::new(),
            total_volume_cc: 0.0,
            annotated_jpeg: None,
            frame_size: (1, 1),
            detector: "test".into(),
        }
    }

    #[test]
    fn starts_idle_and_empty() {
        let state = ResultState::new();
        assert!(state.read().is_none());
        assert!(!state.is_capturing());
    }

    #[test]
    fn reads_are_idempotent_between_replacements() {
        let state = ResultState::new();
        state.replace(result("20240101-000000"));
        let first = state.read().unwrap();
        let second = state.read().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        state.replace(result("20240101-000001"));
        let third = state.read().unwrap();
        assert_eq!(third.timestamp, "20240101-000001");
        assert_eq!(first.timestamp, "20240101-000000");
    }

    #[test]
    fn second_begin_is_refused_until_end() {
        let state = ResultState::new();
        assert!(state.begin_capture());
        assert!(!state.begin_capture());
        assert!(state.is_capturing());
        state.end_capture();
        assert!(!state.is_capturing());
        assert!(state.begin_capture());
    }

    #[test]
    fn ticket_releases_the_flag_on_drop() {
        let state = ResultState::new();
        {
            let _ticket = state.try_begin_capture().unwrap();
            assert!(state.try_begin_capture().is_none());
        }
        assert!(!state.is_capturing());
        assert!(state.try_begin_capture().is_some());
    }

    #[test]
    fn only_one_thread_wins_the_capture_flag() {
        let state = Arc::new(ResultState::new());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    state.begin_capture()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
