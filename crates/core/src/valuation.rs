/// Graham number: `sqrt(22.5 * EPS * book value per share)`.
///
/// Absent when either input is missing or not strictly positive; the formula has no meaning for
/// loss-making companies or negative equity.
pub fn graham_number(eps: Option<f64>, book_value_per_share: Option<f64>) -> Option<f64> {
    let eps = eps.filter(|v| v.is_finite() && *v > 0.0)?;
    let bvps = book_value_per_share.filter(|v| v.is_finite() && *v > 0.0)?;
    Some((22.5 * eps * bvps).sqrt())
}
