//! Time-weighted scoring of correct answers.

/// Share of the base points a correct answer keeps when submitted at the last instant.
const MIN_SHARE: f64 = 0.5;

/// Points awarded for a correct answer given the time left on the clock.
///
/// An answer given immediately earns `base_points`; the award falls linearly to
/// half of it as the clock runs out. `remaining_secs` is clamped into
/// `0..=time_limit_secs`, and a question without a time limit always pays the
/// full amount. Incorrect answers are worth nothing; callers apply that rule.
pub fn score(base_points: u32, time_limit_secs: u32, remaining_secs: f64) -> u32 {
    if time_limit_secs == 0 {
        return base_points;
    }

    let limit = f64::from(time_limit_secs);
    let remaining = if remaining_secs.is_nan() {
        0.0
    } else {
        remaining_secs.clamp(0.0, limit)
    };
    let share = MIN_SHARE + (1.0 - MIN_SHARE) * (remaining / limit);
    (f64::from(base_points) * share).round() as u32
}
