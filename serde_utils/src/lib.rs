pub use crate::assertions::assert_json_contains_no_numbers;

pub mod prefixed_hex_or_bytes_array;
pub mod prefixed_hex_or_bytes_cow;
pub mod prefixed_hex_or_bytes_generic_array;
pub mod prefixed_hex_or_bytes_slice;
pub mod shared;
pub mod string_or_native;
pub mod string_or_native_sequence;

mod assertions;
