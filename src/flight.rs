use std::sync::{Mutex, MutexGuard};

/// Single-flight guard for one logical form: at most one operation holds a
/// permit at a time. The permit releases on drop, so early returns, errors
/// and panics all clear it.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: Mutex<bool>,
}

#[derive(Debug)]
pub struct FlightPermit<'a> {
    owner: &'a SingleFlight,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        // A panic while holding the lock leaves a plain bool behind; keep using it.
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn try_begin(&self) -> Option<FlightPermit<'_>> {
        let mut busy = self.flag();
        if *busy {
            return None;
        }
        *busy = true;
        Some(FlightPermit { owner: self })
    }

    pub fn is_busy(&self) -> bool {
        *self.flag()
    }
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        *self.owner.flag() = false;
    }
}
