//! Application Interchange Profile (tag 82)

use std::fmt;

use serde::Serialize;

/// A capability advertised by one AIP bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AipCapability {
    Sda,
    Dda,
    CardholderVerification,
    TerminalRiskManagement,
    IssuerAuthentication,
    OnDeviceCardholderVerification,
    Cda,
    Msd,
    RelayResistance,
}

/// (byte index, mask, capability), in report order
const AIP_BITS: &[(usize, u8, AipCapability)] = &[
    (0, 0x40, AipCapability::Sda),
    (0, 0x20, AipCapability::Dda),
    (0, 0x10, AipCapability::CardholderVerification),
    (0, 0x08, AipCapability::TerminalRiskManagement),
    (0, 0x04, AipCapability::IssuerAuthentication),
    (0, 0x02, AipCapability::OnDeviceCardholderVerification),
    (0, 0x01, AipCapability::Cda),
    (1, 0x80, AipCapability::Msd),
    (1, 0x01, AipCapability::RelayResistance),
];

impl AipCapability {
    /// Report text for this capability
    pub fn description(&self) -> &'static str {
        match self {
            Self::Sda => "SDA supported",
            Self::Dda => "DDA supported",
            Self::CardholderVerification => "Cardholder verification supported",
            Self::TerminalRiskManagement => "Terminal risk management to be performed",
            Self::IssuerAuthentication => "Issuer authentication supported",
            Self::OnDeviceCardholderVerification => "On-device cardholder verification supported",
            Self::Cda => "CDA supported",
            Self::Msd => "MSD supported",
            Self::RelayResistance => "Relay resistance protocol supported",
        }
    }
}

impl fmt::Display for AipCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Application Interchange Profile: two bytes of independent capability bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aip {
    #[serde(serialize_with = "tapkit_common::hex_serde::serialize")]
    pub bytes: [u8; 2],
}

impl Aip {
    /// Decode from tag 82 value; a single byte is treated as byte 1 with byte 2 clear
    pub fn from_bytes(value: &[u8]) -> Option<Self> {
        match value {
            [b1] => Some(Self { bytes: [*b1, 0x00] }),
            [b1, b2, ..] => Some(Self { bytes: [*b1, *b2] }),
            [] => None,
        }
    }

    /// Every capability whose bit is set
    pub fn capabilities(&self) -> Vec<AipCapability> {
        AIP_BITS
            .iter()
            .filter(|(byte, mask, _)| self.bytes[*byte] & mask != 0)
            .map(|(_, _, cap)| *cap)
            .collect()
    }

    /// Whether a specific capability bit is set
    pub fn supports(&self, capability: AipCapability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Capability descriptions, or exactly `["No special capabilities"]` when none are set
    pub fn describe(&self) -> Vec<String> {
        let caps = self.capabilities();
        if caps.is_empty() {
            return vec!["No special capabilities".to_string()];
        }
        caps.iter().map(|c| c.description().to_string()).collect()
    }
}

/// Describe raw AIP bytes
pub fn decode_aip(value: &[u8]) -> Vec<String> {
    match Aip::from_bytes(value) {
        Some(aip) => aip.describe(),
        None => vec!["No special capabilities".to_string()],
    }
}
