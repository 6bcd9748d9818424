use std::fmt;

use bincode::{Decode, Encode};

/// 16-byte server identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Guid(pub [u8; 16]);

/// Renders as `8-4-4-4-12` lowercase hex.
impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        for (i, byte) in b.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SessionHandle {
    pub id: Guid,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct OperationHandle {
    pub id: Guid,
    pub has_result_set: bool,
    pub modified_row_count: Option<f64>,
}

/// Handle of a query submitted through the polling generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct QueryHandle {
    pub id: String,
    pub log_context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_display() {
        let guid = Guid([
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
            0x66, 0x77,
        ]);
        assert_eq!(guid.to_string(), "01234567-89ab-cdef-0011-223344556677");
    }
}
