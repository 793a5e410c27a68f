//! Core Macros
//!
//! This module defines utility macros used throughout the heart rate session.

/// Helper macro to check if a specific bit is set in a byte.
#[macro_export]
macro_rules! is_bit_set {
    ($byte:expr, $pos:expr) => {
        ($byte & (1 << $pos)) != 0
    };
}
