// SPDX-License-Identifier: Apache-2.0

//! Driver type code → portable type mapping.
//!
//! Codes follow the DB-API type groups reported by TDS clients
//! (see [`crate::engine::drivers::sqlserver::type_code`]).

use crate::engine::types::PortableType;

pub const TYPE_CODE_STRING: i32 = 1;
pub const TYPE_CODE_BINARY: i32 = 2;
pub const TYPE_CODE_NUMBER: i32 = 3;
pub const TYPE_CODE_DATETIME: i32 = 4;
pub const TYPE_CODE_DECIMAL: i32 = 5;

/// Maps a driver type code to a [`PortableType`]. Never fails.
///
/// Code 3 is nominally an integer, but decimals are sometimes reported under
/// it, so it maps to `Float`.
pub fn map_type(code: i32) -> PortableType {
    match code {
        TYPE_CODE_STRING => PortableType::String,
        TYPE_CODE_BINARY => PortableType::Boolean,
        TYPE_CODE_NUMBER => PortableType::Float,
        TYPE_CODE_DATETIME => PortableType::DateTime,
        TYPE_CODE_DECIMAL => PortableType::Float,
        _ => PortableType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(map_type(1), PortableType::String);
        assert_eq!(map_type(2), PortableType::Boolean);
        assert_eq!(map_type(3), PortableType::Float);
        assert_eq!(map_type(4), PortableType::DateTime);
        assert_eq!(map_type(5), PortableType::Float);
    }

    #[test]
    fn test_unknown_codes_are_total() {
        for code in [i32::MIN, -1, 0, 6, 7, 42, 1000, i32::MAX] {
            assert_eq!(map_type(code), PortableType::Unknown, "code {code}");
        }
    }
}
