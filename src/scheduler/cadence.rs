//! Tick sources.
//!
//! The scheduler does not own a timer directly; it asks a [`Cadence`] for a
//! [`TickSource`] whenever the interval changes. `IntervalCadence` is the
//! production implementation on top of `tokio::time::interval_at`. Tick
//! sources may fail, which the scheduler treats as a timer fault.

use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// A running periodic timer.
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick.
    async fn next_tick(&mut self) -> AppResult<()>;
}

/// Factory for tick sources.
pub trait Cadence: Send + Sync {
    /// Start a timer with `period` whose first tick fires after `first_delay`.
    fn ticks(&self, period: Duration, first_delay: Duration) -> AppResult<Box<dyn TickSource>>;
}

/// Tokio interval timer. Missed ticks are skipped, never bunched up.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalCadence;

impl Cadence for IntervalCadence {
    fn ticks(&self, period: Duration, first_delay: Duration) -> AppResult<Box<dyn TickSource>> {
        if period.is_zero() {
            return Err(DaqError::TimerFault("tick period must be non-zero".into()));
        }
        let mut interval = interval_at(Instant::now() + first_delay, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ok(Box::new(IntervalTicks { interval }))
    }
}

struct IntervalTicks {
    interval: Interval,
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn next_tick(&mut self) -> AppResult<()> {
        self.interval.tick().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_spacing() {
        let mut ticks = IntervalCadence
            .ticks(Duration::from_millis(500), Duration::ZERO)
            .unwrap();
        let start = Instant::now();
        ticks.next_tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        ticks.next_tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        ticks.next_tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_skips_instead_of_bursting() {
        let mut ticks = IntervalCadence
            .ticks(Duration::from_secs(1), Duration::ZERO)
            .unwrap();
        let start = Instant::now();
        ticks.next_tick().await.unwrap();
        // Simulate a tick whose work took 2.5 periods.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        ticks.next_tick().await.unwrap();
        let after_overrun = start.elapsed();
        ticks.next_tick().await.unwrap();
        assert!(start.elapsed() - after_overrun >= Duration::from_millis(500));
    }

    #[test]
    fn test_zero_period_is_a_fault() {
        assert!(matches!(
            IntervalCadence.ticks(Duration::ZERO, Duration::ZERO),
            Err(DaqError::TimerFault(_))
        ));
    }
}
