// Library module for testable functions

pub mod analysis;

/// Price per unit of living area
/// Undefined when the area is zero, negative or not finite
pub fn price_per_area(price: f64, area: f64) -> Option<f64> {
    if !area.is_finite() || area <= 0.0 {
        return None;
    }
    Some(price / area)
}

/// Absorption rate: sales per month over a window
pub fn absorption_rate(sales: usize, months: u32) -> Option<f64> {
    if months == 0 {
        return None;
    }
    Some(sales as f64 / months as f64)
}
