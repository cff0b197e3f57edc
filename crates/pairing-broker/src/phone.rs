//! Phone number validation.

use crate::error::BrokerError;
use serde::Serialize;
use std::fmt;

/// A validated phone number, stored as digits only (country code first).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Digits as the provider expects them, without a leading `+`.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// E.164 rendering (`+<digits>`).
    pub fn e164(&self) -> String {
        format!("+{}", self.0)
    }

    /// Form safe for logs: country code prefix and last two digits only.
    pub fn masked(&self) -> String {
        let len = self.0.len();
        let visible_head = 3.min(len);
        let visible_tail = 2.min(len - visible_head);
        format!(
            "+{}{}{}",
            &self.0[..visible_head],
            "*".repeat(len - visible_head - visible_tail),
            &self.0[len - visible_tail..]
        )
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Normalize a raw phone number to digits and validate it against the
/// numbering plan of its country code.
///
/// Every non-digit is dropped, so `"+1 (201) 555-0123"` and `"12015550123"`
/// are the same number. The digits must start with the country code.
pub fn normalize_phone_number(raw: &str) -> Result<PhoneNumber, BrokerError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(BrokerError::InvalidPhoneNumber(
            "Phone number must contain at least one digit".into(),
        ));
    }

    let parsed = phonenumber::parse(None, format!("+{digits}"))
        .map_err(|e| BrokerError::InvalidPhoneNumber(format!("Unparseable phone number: {e}")))?;

    if !phonenumber::is_valid(&parsed) {
        return Err(BrokerError::InvalidPhoneNumber(
            "Not a dialable number for its country code".into(),
        ));
    }

    Ok(PhoneNumber(digits))
}
