//! Ordinary least squares fit of a straight line.

/// Result of fitting `y ≈ intercept + slope·x`.
#[derive(Debug, Clone, Copy)]
pub struct LineFit {
    /// Fitted intercept at x = 0.
    pub intercept: f64,
    /// Fitted slope.
    pub slope: f64,
    /// Standard error of the slope.
    pub slope_se: f64,
}

/// Fit `y ≈ a + b·x` by ordinary least squares.
///
/// Returns `None` for fewer than three points, mismatched lengths, or
/// constant `x`.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let n = x.len();
    if n < 3 || y.len() != n {
        return None;
    }
    let nf = n as f64;
    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_y = y.iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx <= 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let ss_res = (syy - slope * sxy).max(0.0);
    let slope_se = (ss_res / (nf - 2.0) / sxx).sqrt();

    Some(LineFit {
        intercept,
        slope,
        slope_se,
    })
}
