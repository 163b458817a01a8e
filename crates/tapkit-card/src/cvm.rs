//! Cardholder Verification Method List (tag 8E)

use std::fmt;

use serde::Serialize;

/// CV rule method (low six bits of the first rule byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CvmMethod {
    FailCvmProcessing,
    PlaintextPinByIcc,
    EncipheredPinOnline,
    PlaintextPinByIccAndSignature,
    EncipheredPinByIcc,
    EncipheredPinByIccAndSignature,
    Signature,
    NoCvmRequired,
    NotAvailable,
    Rfu(u8),
}

impl CvmMethod {
    /// Decode from the low six bits of a rule's method byte
    pub fn from_code(code: u8) -> Self {
        match code & 0x3F {
            0x00 => Self::FailCvmProcessing,
            0x01 => Self::PlaintextPinByIcc,
            0x02 => Self::EncipheredPinOnline,
            0x03 => Self::PlaintextPinByIccAndSignature,
            0x04 => Self::EncipheredPinByIcc,
            0x05 => Self::EncipheredPinByIccAndSignature,
            0x1E => Self::Signature,
            0x1F => Self::NoCvmRequired,
            0x3F => Self::NotAvailable,
            other => Self::Rfu(other),
        }
    }
}

impl fmt::Display for CvmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailCvmProcessing => f.write_str("Fail CVM processing"),
            Self::PlaintextPinByIcc => f.write_str("Plaintext PIN verified by ICC"),
            Self::EncipheredPinOnline => f.write_str("Enciphered PIN verified online"),
            Self::PlaintextPinByIccAndSignature => {
                f.write_str("Plaintext PIN verified by ICC and signature")
            }
            Self::EncipheredPinByIcc => f.write_str("Enciphered PIN verified by ICC"),
            Self::EncipheredPinByIccAndSignature => {
                f.write_str("Enciphered PIN verified by ICC and signature")
            }
            Self::Signature => f.write_str("Signature (paper)"),
            Self::NoCvmRequired => f.write_str("No CVM required"),
            Self::NotAvailable => f.write_str("Not available for use"),
            Self::Rfu(code) => write!(f, "RFU method 0x{:02X}", code),
        }
    }
}

/// CV rule condition (second rule byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CvmCondition {
    Always,
    UnattendedCash,
    NotCashOrPurchaseWithCashback,
    TerminalSupportsCvm,
    ManualCash,
    PurchaseWithCashback,
    UnderX,
    OverX,
    UnderY,
    OverY,
    Rfu(u8),
}

impl CvmCondition {
    /// Decode a condition code
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Always,
            0x01 => Self::UnattendedCash,
            0x02 => Self::NotCashOrPurchaseWithCashback,
            0x03 => Self::TerminalSupportsCvm,
            0x04 => Self::ManualCash,
            0x05 => Self::PurchaseWithCashback,
            0x06 => Self::UnderX,
            0x07 => Self::OverX,
            0x08 => Self::UnderY,
            0x09 => Self::OverY,
            other => Self::Rfu(other),
        }
    }
}

impl fmt::Display for CvmCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::UnattendedCash => f.write_str("If unattended cash"),
            Self::NotCashOrPurchaseWithCashback => f.write_str(
                "If not unattended cash and not manual cash and not purchase with cashback",
            ),
            Self::TerminalSupportsCvm => f.write_str("If terminal supports the CVM"),
            Self::ManualCash => f.write_str("If manual cash"),
            Self::PurchaseWithCashback => f.write_str("If purchase with cashback"),
            Self::UnderX => f.write_str("If transaction in application currency and under X"),
            Self::OverX => f.write_str("If transaction in application currency and over X"),
            Self::UnderY => f.write_str("If transaction in application currency and under Y"),
            Self::OverY => f.write_str("If transaction in application currency and over Y"),
            Self::Rfu(code) => write!(f, "RFU condition 0x{:02X}", code),
        }
    }
}

/// One CV rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CvRule {
    pub method: CvmMethod,
    /// b7 of the method byte: try the next rule if this one fails
    pub apply_next_on_failure: bool,
    pub condition: CvmCondition,
}

impl CvRule {
    /// Decode a two-byte rule
    pub fn from_bytes(method: u8, condition: u8) -> Self {
        Self {
            method: CvmMethod::from_code(method),
            apply_next_on_failure: method & 0x40 != 0,
            condition: CvmCondition::from_code(condition),
        }
    }
}

impl fmt::Display for CvRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_failure = if self.apply_next_on_failure {
            "apply succeeding rule if unsuccessful"
        } else {
            "fail cardholder verification if unsuccessful"
        };
        write!(f, "{} - {} ({})", self.method, self.condition, on_failure)
    }
}

/// A parsed CVM List
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CvmList {
    pub amount_x: u32,
    pub amount_y: u32,
    pub rules: Vec<CvRule>,
}

impl CvmList {
    /// Parse a CVM List value; `None` if shorter than the two amount fields.
    /// A trailing odd byte is ignored.
    pub fn parse(value: &[u8]) -> Option<Self> {
        if value.len() < 8 {
            return None;
        }

        let amount_x = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
        let amount_y = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
        let rules = value[8..]
            .chunks_exact(2)
            .map(|pair| CvRule::from_bytes(pair[0], pair[1]))
            .collect();

        Some(Self {
            amount_x,
            amount_y,
            rules,
        })
    }

    /// Amount summary followed by one line per rule
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rules.len() + 1);
        lines.push(format!(
            "Amount X: {}, Amount Y: {}",
            self.amount_x, self.amount_y
        ));
        lines.extend(self.rules.iter().map(ToString::to_string));
        lines
    }
}
