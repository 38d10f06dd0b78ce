//! Transcript extraction helpers
//!
//! Pure functions with no state:
//! - spoken digit extraction and phone-number formatting
//! - command normalization and wake-phrase matching

mod digits;
mod phrases;

pub use digits::{extract_digits, format_phone_number, speakable_phone};
pub use phrases::{normalize, normalize_command, WakePhrases, DEFAULT_WAKE_PHRASES};
