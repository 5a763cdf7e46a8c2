/// Square metres per square kilometre
pub const M2_PER_KM2: f64 = 1e6;

/// Convert an area in m² to km²
pub fn m2_to_km2(area_m2: f64) -> f64 {
    area_m2 / M2_PER_KM2
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Fixed-point formatting for display (`5.00`, `25.00`)
pub fn format_fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

/// Share of `part` in `total`, in percent. Zero when the total is not positive.
pub fn percent_of(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}
