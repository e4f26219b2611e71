use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Progress values closer than this to a target snap onto it. Absorbs the
/// rounding left behind by steps such as 1/40 that have no exact binary form.
pub const PROGRESS_EPSILON: Fixed64 = Fixed64::from_bits(1 << 12);

/// Halfway point of a cell. Slots advance to here on their own.
pub const HALF: Fixed64 = Fixed64::from_bits(1 << 31);

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Clamp a progress value into `[0, 1]`.
#[inline]
pub fn clamp01(v: Fixed64) -> Fixed64 {
    v.clamp(Fixed64::ZERO, Fixed64::ONE)
}

/// Move `current` toward `target` by `step`, never past it.
#[inline]
pub fn approach(current: Fixed64, step: Fixed64, target: Fixed64) -> Fixed64 {
    if current >= target {
        return current;
    }
    let next = current.saturating_add(step);
    if next >= target || target - next <= PROGRESS_EPSILON {
        target
    } else {
        next
    }
}

/// Ticks needed to cover `seconds` at `tick_rate_hz`, rounded up, minimum 1.
pub fn seconds_to_ticks(seconds: Fixed64, tick_rate_hz: u32) -> u32 {
    let raw = seconds.saturating_mul(Fixed64::from_num(tick_rate_hz));
    let whole: i64 = raw.to_num();
    let ceiled = if raw.frac() > Fixed64::ZERO { whole + 1 } else { whole };
    ceiled.clamp(1, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_is_one_half() {
        assert_eq!(fixed64_to_f64(HALF), 0.5);
    }

    #[test]
    fn approach_snaps_accumulated_rounding() {
        let step = Fixed64::ONE / Fixed64::from_num(20);
        let mut p = Fixed64::ZERO;
        for _ in 0..10 {
            p = approach(p, step, HALF);
        }
        assert_eq!(p, HALF);
        for _ in 0..10 {
            p = approach(p, step, Fixed64::ONE);
        }
        assert_eq!(p, Fixed64::ONE);
    }

    #[test]
    fn approach_never_overshoots() {
        let p = approach(f64_to_fixed64(0.45), f64_to_fixed64(0.3), HALF);
        assert_eq!(p, HALF);
        let stuck = approach(Fixed64::ONE, f64_to_fixed64(0.3), HALF);
        assert_eq!(stuck, Fixed64::ONE);
    }

    #[test]
    fn seconds_to_ticks_rounds_up() {
        assert_eq!(seconds_to_ticks(f64_to_fixed64(2.0), 20), 40);
        assert_eq!(seconds_to_ticks(f64_to_fixed64(0.33), 10), 4);
        assert_eq!(seconds_to_ticks(Fixed64::ZERO, 20), 1);
    }

    #[test]
    fn clamp01_bounds() {
        assert_eq!(clamp01(f64_to_fixed64(1.5)), Fixed64::ONE);
        assert_eq!(clamp01(f64_to_fixed64(-0.5)), Fixed64::ZERO);
    }
}
