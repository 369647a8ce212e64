//! Zero-timestamp model for a running device.
//!
//! Time advances in whole periods of `period_frames` frames, anchored at the
//! host time captured when I/O started. Each query moves the model forward
//! by at most one period, so the published timestamps form a strictly
//! periodic sequence regardless of when the host happens to ask.

/// Zero timestamp published to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZeroTimestamp {
    /// Sample time at the start of the current period.
    pub sample_time: f64,
    /// Host time at the start of the current period.
    pub host_time: u64,
    /// Changes whenever the time line is discontinuous. Always 1.
    pub seed: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ClockModel {
    anchor_host_time: u64,
    period_counter: u64,
    last_sample_rate: f64,
    ticks_per_frame: f64,
    current: ZeroTimestamp,
}

impl ClockModel {
    /// Restart the time line at `now`.
    pub(crate) fn reset(&mut self, now: u64) {
        self.anchor_host_time = now;
        self.period_counter = 0;
        self.current = ZeroTimestamp {
            sample_time: 0.0,
            host_time: now,
            seed: 1,
        };
    }

    /// Advance to `now` and return the current zero timestamp.
    pub(crate) fn advance(
        &mut self,
        now: u64,
        sample_rate: f64,
        period_frames: u32,
        ticks_per_second: f64,
    ) -> ZeroTimestamp {
        if sample_rate != self.last_sample_rate {
            self.ticks_per_frame = ticks_per_second / sample_rate;
            self.last_sample_rate = sample_rate;
        }

        let period_frames = f64::from(period_frames);
        let ticks_per_period = self.ticks_per_frame * period_frames;

        let next_period_host_time = self
            .anchor_host_time
            .saturating_add(ticks(self.period_counter + 1, ticks_per_period));
        if now >= next_period_host_time {
            self.period_counter += 1;
        }

        self.current = ZeroTimestamp {
            sample_time: self.period_counter as f64 * period_frames,
            host_time: self
                .anchor_host_time
                .saturating_add(ticks(self.period_counter, ticks_per_period)),
            seed: 1,
        };
        self.current
    }

    /// Last published zero timestamp.
    pub(crate) fn current(&self) -> ZeroTimestamp {
        self.current
    }
}

fn ticks(periods: u64, ticks_per_period: f64) -> u64 {
    (periods as f64 * ticks_per_period) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    // 48 MHz ticks keep per-frame tick counts integral at 48 and 96 kHz.
    const TICKS_PER_SECOND: f64 = 48_000_000.0;

    #[test]
    fn first_period_starts_at_anchor() {
        let mut model = ClockModel::default();
        model.reset(5_000);
        let ts = model.advance(5_000, 48000.0, 480, TICKS_PER_SECOND);
        assert_eq!(ts.sample_time, 0.0);
        assert_eq!(ts.host_time, 5_000);
        assert_eq!(ts.seed, 1);
    }

    #[test]
    fn crossing_boundary_advances_one_period() {
        let mut model = ClockModel::default();
        model.reset(0);
        let ts = model.advance(479_999, 48000.0, 480, TICKS_PER_SECOND);
        assert_eq!(ts.sample_time, 0.0);

        let ts = model.advance(480_000, 48000.0, 480, TICKS_PER_SECOND);
        assert_eq!(ts.sample_time, 480.0);
        assert_eq!(ts.host_time, 480_000);
    }

    #[test]
    fn late_query_catches_up_one_period_per_call() {
        let mut model = ClockModel::default();
        model.reset(0);
        let now = 1_680_000;
        let samples: Vec<f64> = (0..4)
            .map(|_| model.advance(now, 48000.0, 480, TICKS_PER_SECOND).sample_time)
            .collect();
        assert_eq!(samples, vec![480.0, 960.0, 1440.0, 1440.0]);
    }

    #[test]
    fn rate_change_rescales_period() {
        let mut model = ClockModel::default();
        model.reset(0);
        model.advance(0, 48000.0, 480, TICKS_PER_SECOND);
        let ts = model.advance(240_000, 96000.0, 480, TICKS_PER_SECOND);
        assert_eq!(ts.sample_time, 480.0);
        assert_eq!(ts.host_time, 240_000);
    }

    #[test]
    fn reset_restarts_counter() {
        let mut model = ClockModel::default();
        model.reset(0);
        model.advance(480_000, 48000.0, 480, TICKS_PER_SECOND);
        model.reset(100);
        assert_eq!(model.current().sample_time, 0.0);
        assert_eq!(model.current().host_time, 100);
    }
}
