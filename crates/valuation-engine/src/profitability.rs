/// ROE (percent) that maps to a neutral weight of 1.0.
pub const PAR_ROE: f64 = 10.0;

/// Weight change per percentage point of ROE away from par.
pub const ROE_SENSITIVITY: f64 = 0.1;

/// Multiplicative conviction weight for an aggregate ROE in percent.
///
/// Missing, NaN, or non-positive ROE is neutral (1.0). Otherwise the weight
/// moves 0.1 per point away from 10% and is floored at zero.
pub fn roe_weight(roe: Option<f64>) -> f64 {
    match roe {
        Some(roe) if roe.is_finite() && roe > 0.0 => {
            (1.0 + (roe - PAR_ROE) * ROE_SENSITIVITY).max(0.0)
        }
        _ => 1.0,
    }
}
