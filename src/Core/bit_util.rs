//! Bit-twiddling helpers shared by the log-buffer, ring-buffer and counters
//! layouts. Every size used to mask a cursor or split a position into
//! `(term_id, term_offset)` funnels through here so the "power of two"
//! invariant only needs checking once.

/// Cache line size assumed for `CachePadded`-style layouts on the targets
/// this driver runs on (x86_64 / aarch64 both use 64-byte lines).
pub const CACHE_LINE_LENGTH: usize = 64;

/// Returns true if `value` is a power of two (and non-zero).
#[inline]
pub const fn is_power_of_two(value: i64) -> bool {
    value > 0 && (value & (value - 1)) == 0
}

/// Number of trailing zero bits, used to turn a term length into the shift
/// amount for `position = (term_id - initial_term_id) << shift | offset`.
#[inline]
pub const fn number_of_trailing_zeros(value: i32) -> i32 {
    value.trailing_zeros() as i32
}

/// Rounds `value` up to the next multiple of `alignment`. `alignment` must
/// be a power of two.
#[inline]
pub const fn align(value: i32, alignment: i32) -> i32 {
    (value + (alignment - 1)) & !(alignment - 1)
}

/// Same as [`align`] but over `i64`/`usize`-shaped positions.
#[inline]
pub const fn align_i64(value: i64, alignment: i64) -> i64 {
    (value + (alignment - 1)) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_of_two_detection() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(65536));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(-8));
        assert!(!is_power_of_two(96));
    }

    #[test]
    fn align_rounds_up_to_next_multiple() {
        assert_eq!(align(0, 32), 0);
        assert_eq!(align(1, 32), 32);
        assert_eq!(align(32, 32), 32);
        assert_eq!(align(233, 32), 256);
    }

    #[test]
    fn trailing_zeros_matches_log2_of_power_of_two() {
        assert_eq!(number_of_trailing_zeros(65536), 16);
        assert_eq!(number_of_trailing_zeros(1), 0);
    }
}
