//! Stream positions: a monotonic 64-bit cursor derived from `(term_id,
//! term_offset)` pairs. `position_bits_to_shift` is `log2(term_length)`, so
//! a position packs as `(term_id - initial_term_id) << shift | term_offset`.
//!
//! Uses `Core::bit_util::number_of_trailing_zeros` to derive the shift
//! from a power-of-two term length.

use crate::Core::bit_util::{is_power_of_two, number_of_trailing_zeros};

/// Number of bits `term_offset` occupies in a position for the given
/// (power-of-two) term length.
pub fn position_bits_to_shift(term_length: i32) -> i32 {
    assert!(
        is_power_of_two(term_length as i64),
        "term length must be a power of two, got {term_length}"
    );
    number_of_trailing_zeros(term_length)
}

/// Combine a term id and term offset into an absolute stream position.
pub fn compute_position(term_id: i32, term_offset: i32, position_bits_to_shift: i32, initial_term_id: i32) -> i64 {
    let term_count = term_id.wrapping_sub(initial_term_id) as i64;
    (term_count << position_bits_to_shift) + term_offset as i64
}

/// Inverse of [`compute_position`]: recover the term offset component.
pub fn compute_term_offset(position: i64, position_bits_to_shift: i32) -> i32 {
    let mask = (1i64 << position_bits_to_shift) - 1;
    (position & mask) as i32
}

/// Inverse of [`compute_position`]: recover the term id component.
pub fn compute_term_id(position: i64, position_bits_to_shift: i32, initial_term_id: i32) -> i32 {
    let term_count = position >> position_bits_to_shift;
    initial_term_id.wrapping_add(term_count as i32)
}

/// Index of the term partition (0..=2) that a given term id maps to,
/// given the term id active when the log was created.
pub fn index_by_term(initial_term_id: i32, active_term_id: i32) -> usize {
    (active_term_id.wrapping_sub(initial_term_id) as i64).rem_euclid(3) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_matches_log2_of_term_length() {
        assert_eq!(position_bits_to_shift(1 << 16), 16);
        assert_eq!(position_bits_to_shift(1 << 20), 20);
    }

    #[test]
    fn position_round_trips_through_term_and_offset() {
        let shift = position_bits_to_shift(1 << 16);
        let initial_term_id = 5;
        let position = compute_position(8, 1024, shift, initial_term_id);
        assert_eq!(compute_term_id(position, shift, initial_term_id), 8);
        assert_eq!(compute_term_offset(position, shift), 1024);
    }

    #[test]
    fn position_is_monotonic_across_term_rolls() {
        let shift = position_bits_to_shift(1 << 16);
        let initial_term_id = 0;
        let end_of_term = compute_position(0, (1 << 16) - 32, shift, initial_term_id);
        let start_of_next = compute_position(1, 0, shift, initial_term_id);
        assert!(start_of_next > end_of_term);
    }
}
