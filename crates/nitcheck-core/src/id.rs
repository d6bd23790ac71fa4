//! Reference-id generation for lead and enquiry submissions.
//!
//! Ids look like `lead_m84k2v1x_9f3ka7`: a prefix naming the flow, the
//! submission time in base36 milliseconds, and a short random suffix. They
//! are opaque correlation handles, not security tokens.

use uuid::Uuid;

use crate::error::{CoreError, Result};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Generate a reference id for the given flow prefix (`lead`, `apply`,
/// `enquiry`).
pub fn reference_id(prefix: &str) -> String {
    let millis = crate::time::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!(
        "{prefix}_{}_{}",
        encode_base36(millis.max(0) as u128),
        random_suffix()
    )
}

/// Validate the shape of a reference id: `prefix_base36_base36`.
pub fn validate_reference_id(id: &str) -> Result<()> {
    let mut parts = id.split('_');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some(prefix), Some(ts), Some(suffix), None)
            if !prefix.is_empty()
                && !ts.is_empty()
                && !suffix.is_empty()
                && ts.bytes().all(|b| BASE36.contains(&b))
                && suffix.bytes().all(|b| BASE36.contains(&b))
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidReferenceId(id.to_string()))
    }
}

fn encode_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn random_suffix() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(SUFFIX_LEN)
        .map(|b| BASE36[(*b as usize) % 36] as char)
        .collect()
}
