//! Utility functions

/// Visit order for `n` indices starting at the center and alternating outward.
///
/// Starts at `floor(n / 2)`, then visits the lower neighbor before the higher
/// one at each distance. The slice nearest the visual center is usually what
/// the user is looking at, so it is produced first.
pub fn center_out_order(n: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(n);
    if n == 0 {
        return order;
    }

    let center = n / 2;
    order.push(center);

    for offset in 1..=n {
        if center >= offset {
            order.push(center - offset);
        }
        if center + offset < n {
            order.push(center + offset);
        }
        if order.len() == n {
            break;
        }
    }

    order
}

/// Ceiling division
pub fn ceil_div(value: usize, divisor: usize) -> usize {
    debug_assert!(divisor > 0);
    (value + divisor - 1) / divisor
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
