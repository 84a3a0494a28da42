//! Non-blocking eyelid blink animation.
//!
//! Advanced once per frame regardless of tracking state. Each lid eases with
//! its own randomized duration, so the two never move in lockstep; that reads
//! as far more organic than a synchronized blink.

use rand::rngs::StdRng;
use rand::Rng;

use crate::config::BlinkConfig;
use crate::head::axis::{AxisBank, AxisId};
use crate::head::filter::ease_in_out;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPhase {
    Idle,
    Closing,
    Hold,
    Opening,
}

/// Eyelid blink state machine. One instance per eyelid pair.
pub struct BlinkAnimator {
    config: BlinkConfig,
    upper: AxisId,
    lower: AxisId,
    phase: BlinkPhase,
    phase_t0_ms: f64,
    next_blink_ms: f64,
    /// Blinks left in the current burst: 0, 1, or 2 (double blink)
    pending: u8,
    // Durations in ms, re-rolled at the start of each blink
    dur_close_upper: f32,
    dur_open_upper: f32,
    dur_close_lower: f32,
    dur_open_lower: f32,
    hold_ms: f32,
    rng: StdRng,
}

impl BlinkAnimator {
    pub fn new(config: BlinkConfig, upper: AxisId, lower: AxisId, now_ms: f64, mut rng: StdRng) -> Self {
        let interval = rng.gen_range(config.interval_s[0]..=config.interval_s[1]);
        Self {
            config,
            upper,
            lower,
            phase: BlinkPhase::Idle,
            phase_t0_ms: now_ms,
            next_blink_ms: now_ms + interval as f64 * 1000.0,
            pending: 0,
            dur_close_upper: 0.0,
            dur_open_upper: 0.0,
            dur_close_lower: 0.0,
            dur_open_lower: 0.0,
            hold_ms: 0.0,
            rng,
        }
    }

    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }

    /// Advance the animator by one frame.
    pub fn update(&mut self, bank: &mut AxisBank, now_ms: f64) {
        match self.phase {
            BlinkPhase::Idle => {
                if now_ms >= self.next_blink_ms {
                    if self.pending == 0 {
                        self.pending = if self.rng.gen_bool(self.config.double_blink_prob) {
                            2
                        } else {
                            1
                        };
                    }
                    self.start_blink(now_ms);
                }
            }
            BlinkPhase::Closing => {
                let (k_u, k_l) =
                    self.progress(now_ms, self.dur_close_upper, self.dur_close_lower);
                self.set_lids(bank, self.open_to_closed(k_u, k_l));
                if k_u >= 1.0 && k_l >= 1.0 {
                    self.phase = BlinkPhase::Hold;
                    self.phase_t0_ms = now_ms;
                }
            }
            BlinkPhase::Hold => {
                if now_ms - self.phase_t0_ms >= self.hold_ms as f64 {
                    self.phase = BlinkPhase::Opening;
                    self.phase_t0_ms = now_ms;
                }
            }
            BlinkPhase::Opening => {
                let (k_u, k_l) = self.progress(now_ms, self.dur_open_upper, self.dur_open_lower);
                self.set_lids(bank, self.closed_to_open(k_u, k_l));
                if k_u >= 1.0 && k_l >= 1.0 {
                    self.pending -= 1;
                    self.next_blink_ms = if self.pending > 0 {
                        // Short pause before the second blink of a double
                        now_ms
                            + self.rng.gen_range(
                                self.config.double_pause_s[0]..=self.config.double_pause_s[1],
                            ) as f64
                                * 1000.0
                    } else {
                        now_ms
                            + self
                                .rng
                                .gen_range(self.config.interval_s[0]..=self.config.interval_s[1])
                                as f64
                                * 1000.0
                    };
                    self.phase = BlinkPhase::Idle;
                }
            }
        }
    }

    fn start_blink(&mut self, now_ms: f64) {
        let c = &self.config;
        self.dur_close_upper = self.rng.gen_range(c.upper.close_ms[0]..=c.upper.close_ms[1]);
        self.dur_open_upper = self.rng.gen_range(c.upper.open_ms[0]..=c.upper.open_ms[1]);
        self.dur_close_lower = self.rng.gen_range(c.lower.close_ms[0]..=c.lower.close_ms[1]);
        self.dur_open_lower = self.rng.gen_range(c.lower.open_ms[0]..=c.lower.open_ms[1]);
        self.hold_ms =
            self.rng.gen_range(c.hold_s[0]..=c.hold_s[1]) * 1000.0;
        self.phase = BlinkPhase::Closing;
        self.phase_t0_ms = now_ms;
    }

    /// Eased progress per lid, each against its own duration.
    fn progress(&self, now_ms: f64, dur_upper: f32, dur_lower: f32) -> (f32, f32) {
        let elapsed = (now_ms - self.phase_t0_ms) as f32;
        let k_u = (elapsed / dur_upper.max(1.0)).clamp(0.0, 1.0);
        let k_l = (elapsed / dur_lower.max(1.0)).clamp(0.0, 1.0);
        (k_u, k_l)
    }

    fn open_to_closed(&self, k_u: f32, k_l: f32) -> (f32, f32) {
        let u = &self.config.upper;
        let l = &self.config.lower;
        (
            u.open_angle() + (u.closed_angle() - u.open_angle()) * ease_in_out(k_u),
            l.open_angle() + (l.closed_angle() - l.open_angle()) * ease_in_out(k_l),
        )
    }

    fn closed_to_open(&self, k_u: f32, k_l: f32) -> (f32, f32) {
        let u = &self.config.upper;
        let l = &self.config.lower;
        (
            u.closed_angle() + (u.open_angle() - u.closed_angle()) * ease_in_out(k_u),
            l.closed_angle() + (l.open_angle() - l.closed_angle()) * ease_in_out(k_l),
        )
    }

    fn set_lids(&self, bank: &mut AxisBank, (upper, lower): (f32, f32)) {
        bank.set_target(self.upper, upper);
        bank.set_target(self.lower, lower);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfig;
    use crate::servo::RecordingDriver;
    use rand::SeedableRng;

    fn setup(double_prob: f64) -> (AxisBank, BlinkAnimator, AxisId, AxisId) {
        let config = BlinkConfig {
            double_blink_prob: double_prob,
            ..BlinkConfig::default()
        };
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let upper = bank.add(&AxisConfig::new(7, 90.0, 140.0, 90.0));
        let lower = bank.add(&AxisConfig::new(6, 60.0, 130.0, 60.0));
        bank.set_target(upper, 90.0);
        bank.set_target(lower, 60.0);

        let rng = StdRng::seed_from_u64(7);
        let animator = BlinkAnimator::new(config, upper, lower, 0.0, rng);
        (bank, animator, upper, lower)
    }

    /// Tick at 10 ms steps until the animator returns to Idle, counting how
    /// many complete close/open cycles were seen.
    fn run_until_idle(
        bank: &mut AxisBank,
        animator: &mut BlinkAnimator,
        start_ms: f64,
        budget_ms: f64,
    ) -> usize {
        let mut cycles = 0;
        let mut was_opening = false;
        let mut now = start_ms;
        while now < start_ms + budget_ms {
            animator.update(bank, now);
            let phase = animator.phase();
            if phase == BlinkPhase::Opening {
                was_opening = true;
            }
            if was_opening && phase == BlinkPhase::Idle {
                cycles += 1;
                was_opening = false;
                if animator.pending == 0 {
                    break;
                }
            }
            now += 10.0;
        }
        cycles
    }

    #[test]
    fn test_single_blink_visits_all_phases_and_ends_open() {
        let (mut bank, mut animator, upper, lower) = setup(0.0);

        // Force the schedule into the past and run
        animator.next_blink_ms = 0.0;
        let mut seen_closing = false;
        let mut seen_hold = false;
        let mut now = 0.0;
        while now < 2000.0 {
            animator.update(&mut bank, now);
            match animator.phase() {
                BlinkPhase::Closing => seen_closing = true,
                BlinkPhase::Hold => seen_hold = true,
                BlinkPhase::Idle if seen_hold => break,
                _ => {}
            }
            now += 5.0;
        }

        assert!(seen_closing);
        assert!(seen_hold);
        assert_eq!(animator.phase(), BlinkPhase::Idle);
        // Lids end exactly at the configured open angles, never mid-motion
        assert_eq!(bank.angle(upper), 90.0);
        assert_eq!(bank.angle(lower), 60.0);
        // Next blink is scheduled 2-6 s out
        assert!(animator.next_blink_ms >= now + 2000.0 - 10.0);
        assert!(animator.next_blink_ms <= now + 6000.0);
    }

    #[test]
    fn test_double_blink_runs_two_cycles() {
        let (mut bank, mut animator, upper, _) = setup(1.0);

        animator.next_blink_ms = 0.0;
        let cycles = run_until_idle(&mut bank, &mut animator, 0.0, 5000.0);
        assert_eq!(cycles, 2);
        assert_eq!(bank.angle(upper), 90.0);
    }

    #[test]
    fn test_single_blink_runs_one_cycle() {
        let (mut bank, mut animator, _, _) = setup(0.0);

        animator.next_blink_ms = 0.0;
        let cycles = run_until_idle(&mut bank, &mut animator, 0.0, 5000.0);
        assert_eq!(cycles, 1);
        assert_eq!(animator.pending, 0);
    }

    #[test]
    fn test_idle_before_schedule() {
        let (mut bank, mut animator, upper, _) = setup(0.5);

        // next_blink_ms is seconds away; early ticks must not move anything
        for i in 0..20 {
            animator.update(&mut bank, i as f64 * 10.0);
        }
        assert_eq!(animator.phase(), BlinkPhase::Idle);
        assert_eq!(bank.angle(upper), 90.0);
    }

    #[test]
    fn test_lids_reach_closed_during_hold() {
        let (mut bank, mut animator, upper, lower) = setup(0.0);

        animator.next_blink_ms = 0.0;
        let mut now = 0.0;
        while animator.phase() != BlinkPhase::Hold && now < 1000.0 {
            animator.update(&mut bank, now);
            now += 2.0;
        }
        assert_eq!(animator.phase(), BlinkPhase::Hold);
        assert_eq!(bank.angle(upper), 140.0);
        assert_eq!(bank.angle(lower), 130.0);
    }
}
