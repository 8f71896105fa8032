//! Resend gate for one-time codes.
//!
//! `Armed` (action allowed) → `Counting` (deadline in the future, one tick per
//! second) → `Armed` again once the remaining seconds reach zero. The gate owns
//! its ticker; re-arming aborts the previous one, and ticks stamped with an old
//! generation are ignored.

use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Armed,
    Counting { remaining_secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick from a superseded ticker (or after expiry); nothing changed.
    Stale,
    Counting { remaining_secs: u64 },
    Expired,
}

#[derive(Debug, Default)]
pub struct CountdownGate {
    deadline_ms: Option<i64>,
    remaining_secs: u64,
    generation: u64,
    ticker: Option<AbortHandle>,
}

impl CountdownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a new deadline. Returns the generation a ticker must be started for,
    /// or `None` when the deadline is already past and the gate stays armed.
    pub fn arm(&mut self, deadline_ms: i64, now_ms: i64) -> Option<u64> {
        self.cancel_ticker();
        self.generation += 1;
        self.remaining_secs = remaining_whole_secs(deadline_ms, now_ms);
        if self.remaining_secs == 0 {
            self.deadline_ms = None;
            return None;
        }
        self.deadline_ms = Some(deadline_ms);
        Some(self.generation)
    }

    /// Hand the gate the ticker started for `generation`. A ticker for an
    /// outdated generation is aborted immediately.
    pub fn attach_ticker(&mut self, generation: u64, ticker: AbortHandle) {
        if generation != self.generation || self.remaining_secs == 0 {
            ticker.abort();
            return;
        }
        self.cancel_ticker();
        self.ticker = Some(ticker);
    }

    pub fn tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation || self.remaining_secs == 0 {
            return TickOutcome::Stale;
        }
        self.remaining_secs -= 1;
        if self.remaining_secs == 0 {
            self.cancel_ticker();
            self.deadline_ms = None;
            return TickOutcome::Expired;
        }
        TickOutcome::Counting {
            remaining_secs: self.remaining_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_secs == 0
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Deadline while counting; `None` once armed again.
    pub fn deadline_ms(&self) -> Option<i64> {
        self.deadline_ms
    }

    pub fn phase(&self) -> GatePhase {
        match self.remaining_secs {
            0 => GatePhase::Armed,
            remaining_secs => GatePhase::Counting { remaining_secs },
        }
    }

    #[cfg(test)]
    fn has_ticker(&self) -> bool {
        self.ticker.is_some()
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for CountdownGate {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

/// `max(0, floor((deadline - now) / 1000))`.
pub fn remaining_whole_secs(deadline_ms: i64, now_ms: i64) -> u64 {
    let diff = deadline_ms.saturating_sub(now_ms);
    if diff <= 0 {
        0
    } else {
        (diff / 1000) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_or_sub_second_deadline_stays_armed() {
        let mut gate = CountdownGate::new();
        assert_eq!(gate.arm(1_000, 5_000), None);
        assert!(gate.is_expired());
        assert_eq!(gate.arm(5_999, 5_000), None);
        assert_eq!(gate.phase(), GatePhase::Armed);
    }

    #[test]
    fn sixty_second_deadline_counts_down_once() {
        let mut gate = CountdownGate::new();
        let now = 1_700_000_000_000;
        let generation = gate.arm(now + 60_000, now).unwrap();
        assert_eq!(gate.remaining_secs(), 60);
        assert_eq!(gate.deadline_ms(), Some(now + 60_000));
        assert!(!gate.is_expired());

        let mut expirations = 0;
        let mut last = gate.remaining_secs();
        for _ in 0..60 {
            match gate.tick(generation) {
                TickOutcome::Counting { remaining_secs } => {
                    assert!(remaining_secs < last);
                    last = remaining_secs;
                }
                TickOutcome::Expired => expirations += 1,
                TickOutcome::Stale => panic!("tick from the live generation was ignored"),
            }
        }
        assert_eq!(expirations, 1);
        assert!(gate.is_expired());
        assert_eq!(gate.deadline_ms(), None);
        assert_eq!(gate.tick(generation), TickOutcome::Stale);
        assert_eq!(gate.remaining_secs(), 0);
    }

    #[test]
    fn rearm_supersedes_previous_generation() {
        let mut gate = CountdownGate::new();
        let now = 10_000;
        let first = gate.arm(now + 5_000, now).unwrap();
        let second = gate.arm(now + 1_000, now).unwrap();
        assert_ne!(first, second);
        assert_eq!(gate.remaining_secs(), 1);

        // The old ticker's ticks are inert.
        assert_eq!(gate.tick(first), TickOutcome::Stale);
        assert_eq!(gate.remaining_secs(), 1);
        assert_eq!(gate.tick(second), TickOutcome::Expired);
        assert!(gate.is_expired());
    }

    #[test]
    fn remaining_is_floored_and_clamped() {
        assert_eq!(remaining_whole_secs(10_999, 10_000), 0);
        assert_eq!(remaining_whole_secs(11_999, 10_000), 1);
        assert_eq!(remaining_whole_secs(0, 10_000), 0);
        assert_eq!(remaining_whole_secs(i64::MIN, i64::MAX), 0);
    }

    #[test]
    fn rearm_aborts_the_running_ticker() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut gate = CountdownGate::new();
            let g1 = gate.arm(65_000, 0).unwrap();
            let t1 = tokio::spawn(std::future::pending::<()>());
            gate.attach_ticker(g1, t1.abort_handle());
            assert!(gate.has_ticker());

            let g2 = gate.arm(3_000, 0).unwrap();
            let t2 = tokio::spawn(std::future::pending::<()>());
            gate.attach_ticker(g2, t2.abort_handle());

            assert!(t1.await.unwrap_err().is_cancelled());
            assert!(gate.has_ticker());

            // A late attach for the superseded generation is refused.
            let t3 = tokio::spawn(std::future::pending::<()>());
            gate.attach_ticker(g1, t3.abort_handle());
            assert!(t3.await.unwrap_err().is_cancelled());

            // Dropping the gate stops the live ticker too.
            drop(gate);
            assert!(t2.await.unwrap_err().is_cancelled());
        });
    }
}
