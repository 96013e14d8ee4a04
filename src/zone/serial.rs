//! Zone serial numbers
//!
//! Serials follow the `YYYYMMDDHH` convention. A wall-clock serial can repeat
//! within the same hour or move backwards after a clock change, so
//! `next_serial` falls back to `current + 1` whenever the clock value would
//! not advance the zone under RFC 1982 serial arithmetic.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

/// Serial for the current local hour
pub fn generate_serial() -> u32 {
    serial_for(&Local::now())
}

/// Serial (`YYYYMMDDHH`) for a given instant
pub fn serial_for<Tz: TimeZone>(time: &DateTime<Tz>) -> u32 {
    let year = time.year().clamp(0, 4293) as u32;
    year * 1_000_000 + time.month() * 10_000 + time.day() * 100 + time.hour()
}

/// Serial to use for the next change of a zone currently at `current`
pub fn next_serial(current: u32) -> u32 {
    advance(current, generate_serial())
}

/// Pick `candidate` if it is newer than `current`, else `current + 1`
pub fn advance(current: u32, candidate: u32) -> u32 {
    if serial_gt(candidate, current) {
        candidate
    } else {
        current.wrapping_add(1)
    }
}

/// RFC 1982 "greater than" for 32-bit serials
pub fn serial_gt(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < (1 << 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_serial_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 7, 9, 30, 0).unwrap();
        assert_eq!(serial_for(&time), 2024030709);

        let time = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(serial_for(&time), 2026123123);
    }

    #[test]
    fn test_advance() {
        assert_eq!(advance(2024010100, 2024010212), 2024010212);
        // Same hour
        assert_eq!(advance(2024010212, 2024010212), 2024010213);
        // Clock moved backwards
        assert_eq!(advance(2024010212, 2024010100), 2024010213);
        // Across the wrap point
        assert_eq!(advance(u32::MAX, 2024010100), 2024010100);
    }

    #[test]
    fn test_serial_arithmetic() {
        assert!(serial_gt(2, 1));
        assert!(!serial_gt(1, 2));
        assert!(!serial_gt(5, 5));
        assert!(serial_gt(0, u32::MAX));
    }

    #[test]
    fn test_generated_serial_shape() {
        let serial = generate_serial();
        assert!((2_000_000_000..4_294_967_295).contains(&serial));
        assert!(serial % 100 < 24);
    }
}
