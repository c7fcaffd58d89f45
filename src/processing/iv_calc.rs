//! Pure numeric routines behind the IV observables.
//!
//! Nothing in here knows about observables or units; every function takes
//! plain slices and either returns a value or a [`CurveError`].

use std::cmp::Ordering;

use crate::error::CurveError;

fn check_lengths(expected: usize, actual: usize) -> Result<(), CurveError> {
    if expected != actual {
        return Err(CurveError::LengthMismatch { expected, actual });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Elementwise helpers
// ---------------------------------------------------------------------------

/// `|V·I|` for every sample.
pub fn power(voltage: &[f64], current: &[f64]) -> Result<Vec<f64>, CurveError> {
    check_lengths(voltage.len(), current.len())?;
    Ok(voltage
        .iter()
        .zip(current)
        .map(|(v, i)| (v * i).abs())
        .collect())
}

/// Forward minus reverse, pairing the forward branch with the reverse branch
/// read backwards so equal voltages line up. Stops at the shorter branch.
pub fn branch_difference(forward: &[f64], reverse: &[f64]) -> Vec<f64> {
    forward
        .iter()
        .zip(reverse.iter().rev())
        .map(|(f, r)| f - r)
        .collect()
}

// ---------------------------------------------------------------------------
// Zero crossing
// ---------------------------------------------------------------------------

/// Interpolate `y` at `x = 0`.
///
/// Scans from the start for the first pair with `x[i] <= 0 < x[i + 1]` and
/// interpolates linearly between `(x[i], y[i])` and `(x[i + 1], y[i + 1])`.
/// Called as `find_crossing(voltage, current)` for Isc and
/// `find_crossing(current, voltage)` for Voc.
pub fn find_crossing(x: &[f64], y: &[f64]) -> Result<f64, CurveError> {
    check_lengths(x.len(), y.len())?;
    let i = x
        .windows(2)
        .position(|w| w[0] <= 0.0 && w[1] > 0.0)
        .ok_or(CurveError::CrossingNotFound)?;

    let (x0, x1) = (x[i], x[i + 1]);
    let (y0, y1) = (y[i], y[i + 1]);
    Ok(y0 + (0.0 - x0) * (y1 - y0) / (x1 - x0))
}

// ---------------------------------------------------------------------------
// Forward / reverse split
// ---------------------------------------------------------------------------

/// Both branches of a sweep, independent (`x`) and dependent (`y`) axes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SweepSplit {
    pub forward_x: Vec<f64>,
    pub reverse_x: Vec<f64>,
    pub forward_y: Vec<f64>,
    pub reverse_y: Vec<f64>,
}

fn direction(delta: f64) -> i8 {
    match delta.partial_cmp(&0.0) {
        Some(Ordering::Greater) => 1,
        Some(Ordering::Less) => -1,
        _ => 0,
    }
}

/// Split a sweep at its single direction reversal.
///
/// A zero step continues the previous direction. Without a reversal the
/// whole sweep is forward (increasing or flat) or reverse (decreasing). With
/// one reversal the turning point belongs to the forward branch.
pub fn split_forward_reverse(
    independent: &[f64],
    dependent: &[f64],
) -> Result<SweepSplit, CurveError> {
    check_lengths(independent.len(), dependent.len())?;

    let mut current_dir = 0i8;
    let mut first_dir = 0i8;
    let mut turn: Option<usize> = None;
    let mut reversals = 0usize;

    for (j, w) in independent.windows(2).enumerate() {
        let dir = direction(w[1] - w[0]);
        if dir == 0 {
            continue;
        }
        if current_dir == 0 {
            first_dir = dir;
        } else if dir != current_dir {
            reversals += 1;
            turn.get_or_insert(j);
        }
        current_dir = dir;
    }

    if reversals > 1 {
        return Err(CurveError::NotMonotonic { reversals });
    }

    let mut split = SweepSplit::default();
    match (turn, first_dir) {
        (None, -1) => {
            split.reverse_x = independent.to_vec();
            split.reverse_y = dependent.to_vec();
        }
        (None, _) => {
            split.forward_x = independent.to_vec();
            split.forward_y = dependent.to_vec();
        }
        // Increasing first: the sample at `k` is the apex.
        (Some(k), 1) => {
            split.forward_x = independent[..=k].to_vec();
            split.reverse_x = independent[k + 1..].to_vec();
            split.forward_y = dependent[..=k].to_vec();
            split.reverse_y = dependent[k + 1..].to_vec();
        }
        // Decreasing first: the sample at `k` is the trough and starts the
        // forward branch.
        (Some(k), _) => {
            split.reverse_x = independent[..k].to_vec();
            split.forward_x = independent[k..].to_vec();
            split.reverse_y = dependent[..k].to_vec();
            split.forward_y = dependent[k..].to_vec();
        }
    }
    Ok(split)
}

// ---------------------------------------------------------------------------
// Power quadrant
// ---------------------------------------------------------------------------

/// Restrict `target` to the power quadrant of a forward branch.
///
/// The window opens at the last sample with negative voltage (the sample
/// anchoring the Isc interpolation, or the first sample if none is negative)
/// and closes at the first sample above `voc` (or the last sample). Both
/// ends are inclusive. An inverted window yields an empty vector.
///
/// `isc` is the value interpolated at that opening sample; the window
/// itself is located from the voltage alone.
pub fn trim_between(
    voltage: &[f64],
    current: &[f64],
    target: &[f64],
    _isc: f64,
    voc: f64,
) -> Result<Vec<f64>, CurveError> {
    check_lengths(voltage.len(), current.len())?;
    check_lengths(voltage.len(), target.len())?;
    if voltage.is_empty() {
        return Ok(Vec::new());
    }

    let start = voltage.iter().rposition(|&v| v < 0.0).unwrap_or(0);
    let end = voltage
        .iter()
        .position(|&v| v > voc)
        .unwrap_or(voltage.len() - 1);

    if start > end {
        return Ok(Vec::new());
    }
    Ok(target[start..=end].to_vec())
}

// ---------------------------------------------------------------------------
// Maximum power point
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxPowerPoint {
    /// Index into the slices the search ran on.
    pub index: usize,
    pub power: f64,
    pub voltage: f64,
    /// Magnitude of the current at the maximum.
    pub current: f64,
}

/// Locate the sample maximising `|V·I|`. Returns `Ok(None)` for an empty
/// window.
pub fn max_power_point(
    voltage: &[f64],
    current: &[f64],
) -> Result<Option<MaxPowerPoint>, CurveError> {
    let power = power(voltage, current)?;
    let best = power
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1));

    Ok(best.map(|(index, &p)| MaxPowerPoint {
        index,
        power: p,
        voltage: voltage[index],
        current: current[index].abs(),
    }))
}

// ---------------------------------------------------------------------------
// Local slope
// ---------------------------------------------------------------------------

/// Finite-difference slope `dy/dx` of the first pair whose `y` values straddle
/// `value` (an endpoint equal to `value` counts).
pub fn local_slope(x: &[f64], y: &[f64], value: f64) -> Result<f64, CurveError> {
    check_lengths(x.len(), y.len())?;
    let i = y
        .windows(2)
        .position(|w| (w[0] - value) * (w[1] - value) <= 0.0)
        .ok_or(CurveError::NoBracket { value })?;

    let dx = x[i] - x[i + 1];
    if dx == 0.0 {
        return Err(CurveError::DegenerateSlope);
    }
    Ok((y[i] - y[i + 1]) / dx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn power_is_absolute_product() {
        let p = power(&[-0.5, 0.0, 0.5], &[0.2, -0.1, -0.4]).unwrap();
        assert_eq!(p, vec![0.1, 0.0, 0.2]);
        assert!(matches!(
            power(&[0.0], &[]),
            Err(CurveError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn crossing_interpolates_bracketing_pair() {
        let voltage = [-0.2, -0.05, 0.1, 0.3];
        let current = [-0.03, -0.02, 0.01, 0.05];
        let isc = find_crossing(&voltage, &current).unwrap();
        // Line through (-0.05, -0.02) and (0.1, 0.01) evaluated at V = 0.
        let expected = -0.02 + 0.05 * (0.01 - -0.02) / 0.15;
        assert!((isc - expected).abs() < EPS);
    }

    #[test]
    fn crossing_at_exact_zero_sample() {
        let isc = find_crossing(&[-0.1, 0.0, 0.1], &[1.0, 2.0, 3.0]).unwrap();
        assert!((isc - 2.0).abs() < EPS);
    }

    #[test]
    fn crossing_missing_when_all_positive() {
        let err = find_crossing(&[0.1, 0.2, 0.3], &[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(err, CurveError::CrossingNotFound);
    }

    #[test]
    fn split_unequal_length() {
        assert!(matches!(
            split_forward_reverse(&[1.0, 2.0, 3.0], &[1.0, 2.0]),
            Err(CurveError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn split_monotonically_increasing() {
        let x = [1.1, 2.2, 3.3, 4.4];
        let y = [0.1, 0.2, 0.3, 0.4];
        let split = split_forward_reverse(&x, &y).unwrap();
        assert_eq!(split.forward_x, x.to_vec());
        assert!(split.reverse_x.is_empty());
        assert_eq!(split.forward_y, y.to_vec());
        assert!(split.reverse_y.is_empty());
    }

    #[test]
    fn split_monotonically_decreasing() {
        let x = [4.4, 3.3, 2.2, 1.1];
        let y = [0.4, 0.3, 0.2, 0.1];
        let split = split_forward_reverse(&x, &y).unwrap();
        assert!(split.forward_x.is_empty());
        assert_eq!(split.reverse_x, x.to_vec());
        assert_eq!(split.reverse_y, y.to_vec());
    }

    #[test]
    fn split_increase_then_decrease() {
        let x = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.5, 0.4, 0.3, 0.2];
        let y = [1.1, 2.2, 3.3, 4.4, 5.5, 6.6, 7.7, 8.8, 9.9, 10.0];
        let split = split_forward_reverse(&x, &y).unwrap();
        assert_eq!(split.forward_x, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(split.reverse_x, vec![0.5, 0.4, 0.3, 0.2]);
        assert_eq!(split.forward_y, vec![1.1, 2.2, 3.3, 4.4, 5.5, 6.6]);
        assert_eq!(split.reverse_y, vec![7.7, 8.8, 9.9, 10.0]);

        let again = split_forward_reverse(&x, &y).unwrap();
        assert_eq!(split, again);
    }

    #[test]
    fn split_flat_step_continues_direction() {
        let x = [0.0, 0.1, 0.1, 0.2, 0.1];
        let y = [0.0, 1.0, 2.0, 3.0, 4.0];
        let split = split_forward_reverse(&x, &y).unwrap();
        assert_eq!(split.forward_x, vec![0.0, 0.1, 0.1, 0.2]);
        assert_eq!(split.reverse_x, vec![0.1]);
    }

    #[test]
    fn split_decrease_then_increase() {
        let x = [0.6, 0.3, 0.0, 0.3, 0.6];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        let split = split_forward_reverse(&x, &y).unwrap();
        assert_eq!(split.reverse_x, vec![0.6, 0.3]);
        assert_eq!(split.forward_x, vec![0.0, 0.3, 0.6]);
        assert_eq!(split.forward_y, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn split_multiple_reversals() {
        let x = [-1.0, 0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0, 1.0, 0.0];
        let y = [1.0; 10];
        assert_eq!(
            split_forward_reverse(&x, &y),
            Err(CurveError::NotMonotonic { reversals: 3 })
        );
    }

    #[test]
    fn trim_keeps_power_quadrant() {
        let v = [-0.2, -0.1, 0.1, 0.3, 0.5, 0.7];
        let i = [-1.0, -1.0, -0.9, -0.6, 0.1, 0.8];
        let trimmed = trim_between(&v, &i, &v, 0.95, 0.45).unwrap();
        assert_eq!(trimmed, vec![-0.1, 0.1, 0.3, 0.5]);
        let trimmed_i = trim_between(&v, &i, &i, 0.95, 0.45).unwrap();
        assert_eq!(trimmed_i, vec![-1.0, -0.9, -0.6, 0.1]);
    }

    #[test]
    fn trim_window_depends_on_voltage_only() {
        let v = [-0.2, -0.1, 0.1, 0.3, 0.5, 0.7];
        let i = [-1.0, -1.0, -0.9, -0.6, 0.1, 0.8];
        assert_eq!(
            trim_between(&v, &i, &i, 0.95, 0.45).unwrap(),
            trim_between(&v, &i, &i, 0.0, 0.45).unwrap()
        );
        assert!(matches!(
            trim_between(&v, &i[..5], &i, 0.95, 0.45),
            Err(CurveError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn trim_without_negative_voltage_starts_at_first_sample() {
        let v = [0.0, 0.2, 0.4];
        let trimmed = trim_between(&v, &v, &v, 0.0, 0.3).unwrap();
        assert_eq!(trimmed, vec![0.0, 0.2, 0.4]);
    }

    #[test]
    fn trim_inverted_window_is_empty() {
        // Voltage comes back negative after passing Voc.
        let v = [0.1, 0.5, -0.1];
        let trimmed = trim_between(&v, &v, &v, 0.0, 0.2).unwrap();
        assert!(trimmed.is_empty());
    }

    #[test]
    fn mpp_picks_largest_product() {
        let v = [0.0, 0.2, 0.4, 0.5];
        let i = [-1.0, -0.9, -0.7, -0.1];
        let mpp = max_power_point(&v, &i).unwrap().unwrap();
        assert_eq!(mpp.index, 2);
        assert!((mpp.power - 0.28).abs() < EPS);
        assert!((mpp.voltage - 0.4).abs() < EPS);
        assert!((mpp.current - 0.7).abs() < EPS);
        assert_eq!(max_power_point(&[], &[]).unwrap(), None);
    }

    #[test]
    fn local_slope_of_bracketing_pair() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [-2.0, -1.0, 1.0, 4.0];
        let slope = local_slope(&x, &y, 0.0).unwrap();
        assert!((slope - 2.0).abs() < EPS);
    }

    #[test]
    fn local_slope_errors() {
        assert_eq!(
            local_slope(&[0.0, 1.0], &[1.0, 2.0], 0.0),
            Err(CurveError::NoBracket { value: 0.0 })
        );
        assert_eq!(
            local_slope(&[1.0, 1.0], &[-1.0, 1.0], 0.0),
            Err(CurveError::DegenerateSlope)
        );
    }

    #[test]
    fn branch_difference_aligns_reversed_reverse_branch() {
        let diff = branch_difference(&[1.0, 2.0, 3.0], &[2.5, 1.5]);
        assert_eq!(diff, vec![1.0 - 1.5, 2.0 - 2.5]);
    }
}
