use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Interactive,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Capturing,
    Parsing,
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub mode: CaptureMode,
    pub target_language: String,
    pub started_at: OffsetDateTime,
    pub phase: Phase,
}

/// Holds the single active capture session, if any.
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
    active: Mutex<Option<CaptureSession>>,
}

impl SessionSlot {
    /// Claims the slot, or returns `None` while another session is active.
    pub(crate) fn begin(&self, mode: CaptureMode, target_language: &str) -> Option<SessionGuard<'_>> {
        let mut active = self.lock();
        if active.is_some() {
            return None;
        }
        *active = Some(CaptureSession {
            mode,
            target_language: target_language.to_string(),
            started_at: OffsetDateTime::now_utc(),
            phase: Phase::Capturing,
        });
        Some(SessionGuard { slot: self })
    }

    pub(crate) fn phase(&self) -> Phase {
        self.lock()
            .as_ref()
            .map(|session| session.phase)
            .unwrap_or(Phase::Idle)
    }

    pub(crate) fn snapshot(&self) -> Option<CaptureSession> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CaptureSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the session slot when dropped, including on early return.
pub(crate) struct SessionGuard<'a> {
    slot: &'a SessionSlot,
}

impl SessionGuard<'_> {
    pub(crate) fn set_phase(&self, phase: Phase) {
        if let Some(session) = self.slot.lock().as_mut() {
            session.phase = phase;
        }
    }

    pub(crate) fn started_at(&self) -> Option<OffsetDateTime> {
        self.slot.lock().as_ref().map(|session| session.started_at)
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

/// Ignore-while-busy flag for manual translations.
#[derive(Debug, Default)]
pub(crate) struct BusyFlag {
    busy: AtomicBool,
}

impl BusyFlag {
    pub(crate) fn try_acquire(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: self })
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

pub(crate) struct BusyGuard<'a> {
    flag: &'a BusyFlag,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BusySource {
    Capture,
    Translation,
}

/// Work currently shown as "busy"; the indicator is on while either source is.
#[derive(Debug, Default)]
pub(crate) struct BusySources {
    capture: bool,
    translation: bool,
}

impl BusySources {
    pub(crate) fn any(&self) -> bool {
        self.capture || self.translation
    }

    /// Returns the indicator state when it changed.
    pub(crate) fn set(&mut self, source: BusySource, busy: bool) -> Option<bool> {
        let before = self.any();
        match source {
            BusySource::Capture => self.capture = busy,
            BusySource::Translation => self.translation = busy,
        }
        let after = self.any();
        (before != after).then_some(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_session_is_rejected_until_first_ends() {
        let slot = SessionSlot::default();
        let guard = slot.begin(CaptureMode::Silent, "ja").expect("first session");
        assert_eq!(slot.phase(), Phase::Capturing);
        assert!(slot.begin(CaptureMode::Interactive, "en").is_none());

        guard.set_phase(Phase::Parsing);
        let session = slot.snapshot().expect("active session");
        assert_eq!(session.phase, Phase::Parsing);
        assert_eq!(session.target_language, "ja");
        assert_eq!(session.mode, CaptureMode::Silent);

        drop(guard);
        assert_eq!(slot.phase(), Phase::Idle);
        assert!(slot.begin(CaptureMode::Interactive, "en").is_some());
    }

    #[test]
    fn busy_flag_releases_on_drop() {
        let flag = BusyFlag::default();
        let guard = flag.try_acquire().expect("acquire");
        assert!(flag.is_busy());
        assert!(flag.try_acquire().is_none());
        drop(guard);
        assert!(!flag.is_busy());
    }

    #[test]
    fn indicator_stays_on_until_both_sources_finish() {
        let mut sources = BusySources::default();
        assert_eq!(sources.set(BusySource::Capture, true), Some(true));
        assert_eq!(sources.set(BusySource::Translation, true), None);
        assert_eq!(sources.set(BusySource::Translation, false), None);
        assert!(sources.any());
        assert_eq!(sources.set(BusySource::Capture, false), Some(false));
        assert_eq!(sources.set(BusySource::Capture, false), None);
    }
}
