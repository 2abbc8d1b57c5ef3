//! Sequential gift-card code allocation.
//!
//! Codes are `GC-` plus a zero-padded 6-digit decimal. The allocator is
//! stateless: given the set of codes already issued it hands out the next
//! `quantity` free numbers, seeded either by a manual starting number or by
//! `max(existing) + 1`. Collisions advance the counter and retry the same
//! batch slot, so a batch always yields `quantity` distinct new codes.
//!
//! Suffix extraction takes the first run of digits anywhere in the code —
//! manually entered codes do not always follow the `GC-` prefix convention,
//! so a fixed substring offset would misread them.

use std::collections::HashSet;

pub const CODE_PREFIX: &str = "GC-";

/// Render a sequence number as a canonical zero-padded 6-digit code.
pub fn format_code(n: u64) -> String {
    format!("{CODE_PREFIX}{n:06}")
}

/// Numeric suffix of an existing code: the first run of digits in the
/// string, or `None` when the code carries no digits at all.
pub fn code_suffix(code: &str) -> Option<u64> {
    let digits: String = code
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Allocate `quantity` new codes against the set already in use.
pub fn allocate(existing: &[String], manual_start: Option<u64>, quantity: usize) -> Vec<String> {
    let used: HashSet<u64> = existing.iter().filter_map(|c| code_suffix(c)).collect();

    let mut next = manual_start
        .unwrap_or_else(|| used.iter().max().map(|m| m + 1).unwrap_or(1));

    let mut out = Vec::with_capacity(quantity);
    for _ in 0..quantity {
        // Skip past anything already issued, non-contiguous holes included
        while used.contains(&next) || out_contains(&out, next) {
            next += 1;
        }
        out.push(format_code(next));
        next += 1;
    }
    out
}

fn out_contains(out: &[String], n: u64) -> bool {
    out.iter().any(|c| code_suffix(c) == Some(n))
}

// ===========================================================================
// Tests
// ===========================================================================
