/// Number of decimals in an exchange step such as `0.0001` or `1`
pub fn step_decimals(step: f64) -> u32 {
    let text = format!("{}", step);
    match text.split_once('.') {
        Some((_, fraction)) => fraction.len() as u32,
        None => 0,
    }
}

/// Trim float noise to the precision of `step`
fn normalize(value: f64, step: f64) -> f64 {
    let scale = 10f64.powi(step_decimals(step) as i32);
    (value * scale).round() / scale
}

/// Nearest multiple of `step`
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    normalize((value / step).round() * step, step)
}

/// Largest multiple of `step` not above `value`
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    // 1e-9 absorbs representation error such as 0.3 / 0.1 = 2.9999999999999996
    let steps = (value / step + 1e-9).floor();
    normalize(steps * step, step)
}
