//
// coords.rs
//
// Conversion between host buffer offsets and analysis-engine offsets
//
// Both sides currently count Unicode scalar values from the start of the
// document and the document prefix of the virtual file is byte-for-byte the
// host buffer, so the mapping is the identity. Every adapter goes through
// these functions so that a divergence (UTF-16 hosts, CRLF normalisation, a
// prepended scope wrapper) only has to be absorbed here.
//

/// Convert a host buffer offset to an engine offset
#[inline]
pub fn host_position_to_engine(offset: usize) -> usize {
    offset
}

/// Convert an engine offset back to a host buffer offset
#[inline]
pub fn engine_position_to_host(offset: usize) -> usize {
    offset
}

/// Convert an engine span (`start`, `length`) to a host `(from, to)` pair
pub fn engine_span_to_host(start: usize, length: usize) -> (usize, usize) {
    (
        engine_position_to_host(start),
        engine_position_to_host(start + length),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_identity() {
        for offset in [0, 1, 17, 4096] {
            assert_eq!(engine_position_to_host(host_position_to_engine(offset)), offset);
        }
    }

    #[test]
    fn test_span_conversion() {
        assert_eq!(engine_span_to_host(5, 3), (5, 8));
        assert_eq!(engine_span_to_host(0, 0), (0, 0));
    }
}
