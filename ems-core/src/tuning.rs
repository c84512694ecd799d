/// Deepest search a tuned scan runs.
pub const MAX_TUNED_JUMPS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub max_jumps: u32,
    /// 0 means the whole catalog.
    pub sample_size: usize,
    /// 0 means all pages.
    pub types_pages: u32,
    /// 0 means all pages.
    pub order_pages: u32,
}

/// Caps `requested` according to its depth. A cap never raises a value; an unbounded (0) request
/// is lowered to the cap. Returns the tuned parameters and whether anything changed.
pub fn tune_scan_params(requested: ScanParams) -> (ScanParams, bool) {
    let max_jumps = requested.max_jumps.min(MAX_TUNED_JUMPS);
    let (sample_cap, types_cap, orders_cap) = match max_jumps {
        7..=8 => (40, 1, 1),
        5..=6 => (60, 2, 1),
        _ => (80, 2, 2),
    };

    let tuned = ScanParams {
        max_jumps,
        sample_size: cap(requested.sample_size, sample_cap),
        types_pages: cap(requested.types_pages, types_cap),
        order_pages: cap(requested.order_pages, orders_cap),
    };
    (tuned, tuned != requested)
}

fn cap<T: Ord + Default + Copy>(value: T, limit: T) -> T {
    if value == T::default() {
        limit
    } else {
        value.min(limit)
    }
}
