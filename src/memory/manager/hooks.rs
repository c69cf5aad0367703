/*!
 * Instrumentation Hooks
 * Pluggable callbacks for exhaustion, corruption and serial tracing
 */

use crate::core::types::{Serial, Size};
use crate::memory::types::{BlockInfo, Inconsistency};
use serde::{Deserialize, Serialize};

/// How an operation proceeds after an inconsistency was reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fail the operation with an error (the default)
    Fatal,
    /// Abandon the operation without touching the pools and report success
    Continue,
}

/// What allocation does after the underlying allocator refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyPoolAction {
    /// Fail with `MemoryError::OutOfMemory` (the default)
    Fail,
    /// The handler freed memory elsewhere; ask the underlying allocator again
    Retry,
}

/// When the serial-threshold hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialTrigger {
    /// On the allocation that receives this serial
    At(Serial),
    /// On every allocation
    Always,
}

impl SerialTrigger {
    #[inline]
    pub fn matches(&self, serial: Serial) -> bool {
        match self {
            SerialTrigger::At(target) => *target == serial,
            SerialTrigger::Always => true,
        }
    }
}

/// Called with the requested size when the underlying allocator is exhausted
///
/// Returning `Retry` repeats the request; a handler that can never free
/// anything must return `Fail`.
pub type EmptyPoolHandler = Box<dyn FnMut(Size) -> EmptyPoolAction + Send>;

/// Called whenever a corruption check, ownership probe or double release fails
pub type InconsistencyHandler = Box<dyn FnMut(&Inconsistency) -> Disposition + Send>;

/// Called with a block's serial and header snapshot
pub type SerialHandler = Box<dyn FnMut(Serial, &BlockInfo) + Send>;

/// Installed callbacks; an empty slot means default behaviour
#[derive(Default)]
pub(super) struct Hooks {
    pub on_empty_pool: Option<EmptyPoolHandler>,
    pub on_inconsistency: Option<InconsistencyHandler>,
    pub on_serial_threshold: Option<(SerialTrigger, SerialHandler)>,
    pub on_free_of_serial: Option<(Serial, SerialHandler)>,
}

impl Hooks {
    pub fn empty_pool(&mut self, size: Size) -> EmptyPoolAction {
        self.on_empty_pool
            .as_mut()
            .map_or(EmptyPoolAction::Fail, |handler| handler(size))
    }

    pub fn inconsistency(&mut self, inconsistency: &Inconsistency) -> Disposition {
        self.on_inconsistency
            .as_mut()
            .map_or(Disposition::Fatal, |handler| handler(inconsistency))
    }

    pub fn serial_threshold(&mut self, info: &BlockInfo) {
        if let Some((trigger, handler)) = self.on_serial_threshold.as_mut() {
            if trigger.matches(info.serial) {
                handler(info.serial, info);
            }
        }
    }

    pub fn free_of_serial(&mut self, info: &BlockInfo) {
        if let Some((serial, handler)) = self.on_free_of_serial.as_mut() {
            if *serial == info.serial {
                handler(info.serial, info);
            }
        }
    }
}
