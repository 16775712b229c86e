//! Short random identifier generation
//!
//! Identifiers name albums and stored image files, so they must stay within
//! the 4-hex-character space of the on-disk layout. The allocator itself
//! makes no uniqueness promise; callers that need an unused name check for
//! collisions at the allocation site.

use log::warn;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length in characters of every generated identifier.
pub const ID_LEN: usize = 4;

/// Generates a 4-character lowercase hexadecimal identifier (2 random bytes)
/// from the OS entropy source. If the entropy source fails, the value is
/// derived from the system clock instead, so the call itself never fails.
pub fn new_id() -> String {
    let mut bytes = [0u8; 2];
    match getrandom::fill(&mut bytes) {
        Ok(()) => hex::encode(bytes),
        Err(e) => {
            warn!("entropy source unavailable ({}), falling back to clock", e);
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            format!("{:04x}", nanos % 65536)
        }
    }
}
