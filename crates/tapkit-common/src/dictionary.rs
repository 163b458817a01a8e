//! EMV tag constants and the tag-name dictionary
//!
//! Names are for reporting only; nothing in the protocol engine branches on them.

/// EMV Tag identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmvTag(pub &'static [u8]);

impl EmvTag {
    /// Raw tag bytes
    pub const fn bytes(&self) -> &'static [u8] {
        self.0
    }
}

impl AsRef<[u8]> for EmvTag {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

/// Common EMV tags used in payment card processing
pub mod tags {
    use super::EmvTag;

    // Application metadata
    pub const APPLICATION_IDENTIFIER: EmvTag = EmvTag(&[0x4F]);
    pub const APPLICATION_LABEL: EmvTag = EmvTag(&[0x50]);
    pub const APPLICATION_PAN: EmvTag = EmvTag(&[0x5A]);
    pub const APPLICATION_EXPIRATION_DATE: EmvTag = EmvTag(&[0x5F, 0x24]);
    pub const APPLICATION_EFFECTIVE_DATE: EmvTag = EmvTag(&[0x5F, 0x25]);
    pub const APPLICATION_PAN_SEQUENCE_NUMBER: EmvTag = EmvTag(&[0x5F, 0x34]);
    pub const APPLICATION_PRIORITY_INDICATOR: EmvTag = EmvTag(&[0x87]);
    pub const APPLICATION_PREFERRED_NAME: EmvTag = EmvTag(&[0x9F, 0x12]);
    pub const APPLICATION_USAGE_CONTROL: EmvTag = EmvTag(&[0x9F, 0x07]);
    pub const APPLICATION_VERSION_NUMBER: EmvTag = EmvTag(&[0x9F, 0x08]);
    pub const APPLICATION_CURRENCY_CODE: EmvTag = EmvTag(&[0x9F, 0x42]);
    pub const APPLICATION_CURRENCY_EXPONENT: EmvTag = EmvTag(&[0x9F, 0x44]);
    pub const DEDICATED_FILE_NAME: EmvTag = EmvTag(&[0x84]);

    // Cardholder data
    pub const CARDHOLDER_NAME: EmvTag = EmvTag(&[0x5F, 0x20]);
    pub const TRACK_1_DATA: EmvTag = EmvTag(&[0x56]);
    pub const TRACK_2_EQUIVALENT_DATA: EmvTag = EmvTag(&[0x57]);
    pub const TRACK_2_DATA: EmvTag = EmvTag(&[0x9F, 0x6B]);
    pub const CVM_LIST: EmvTag = EmvTag(&[0x8E]);

    // Issuer data
    pub const ISSUER_COUNTRY_CODE: EmvTag = EmvTag(&[0x5F, 0x28]);
    pub const LANGUAGE_PREFERENCE: EmvTag = EmvTag(&[0x5F, 0x2D]);

    // Counters
    pub const APPLICATION_TRANSACTION_COUNTER: EmvTag = EmvTag(&[0x9F, 0x36]);
    pub const PIN_TRY_COUNTER: EmvTag = EmvTag(&[0x9F, 0x17]);
    pub const LAST_ONLINE_ATC: EmvTag = EmvTag(&[0x9F, 0x13]);

    // Processing
    pub const PDOL: EmvTag = EmvTag(&[0x9F, 0x38]);
    pub const CDOL1: EmvTag = EmvTag(&[0x8C]);
    pub const CDOL2: EmvTag = EmvTag(&[0x8D]);
    pub const AFL: EmvTag = EmvTag(&[0x94]);
    pub const AIP: EmvTag = EmvTag(&[0x82]);
    pub const COMMAND_TEMPLATE: EmvTag = EmvTag(&[0x83]);
    pub const TRANSACTION_CURRENCY_CODE: EmvTag = EmvTag(&[0x5F, 0x2A]);

    // Response templates
    pub const FCI_TEMPLATE: EmvTag = EmvTag(&[0x6F]);
    pub const FCI_PROPRIETARY_TEMPLATE: EmvTag = EmvTag(&[0xA5]);
    pub const FCI_ISSUER_DISCRETIONARY_DATA: EmvTag = EmvTag(&[0xBF, 0x0C]);
    pub const SHORT_FILE_IDENTIFIER: EmvTag = EmvTag(&[0x88]);
    pub const APPLICATION_TEMPLATE: EmvTag = EmvTag(&[0x61]);
    pub const RESPONSE_MESSAGE_TEMPLATE_FORMAT_1: EmvTag = EmvTag(&[0x80]);
    pub const RESPONSE_MESSAGE_TEMPLATE_FORMAT_2: EmvTag = EmvTag(&[0x77]);
    pub const RECORD_TEMPLATE: EmvTag = EmvTag(&[0x70]);
}

/// Get a human-readable name for an EMV tag
pub fn get_tag_name(tag: &[u8]) -> &'static str {
    match tag {
        [0x42] => "Issuer Identification Number (IIN)",
        [0x4F] => "Application Identifier (AID)",
        [0x50] => "Application Label",
        [0x56] => "Track 1 Data",
        [0x57] => "Track 2 Equivalent Data",
        [0x5A] => "Application PAN",
        [0x5F, 0x20] => "Cardholder Name",
        [0x5F, 0x24] => "Application Expiration Date",
        [0x5F, 0x25] => "Application Effective Date",
        [0x5F, 0x28] => "Issuer Country Code",
        [0x5F, 0x2A] => "Transaction Currency Code",
        [0x5F, 0x2D] => "Language Preference",
        [0x5F, 0x30] => "Service Code",
        [0x5F, 0x34] => "Application PAN Sequence Number",
        [0x5F, 0x50] => "Issuer URL",
        [0x61] => "Application Template",
        [0x6F] => "File Control Information (FCI) Template",
        [0x70] => "Record Template",
        [0x77] => "Response Message Template Format 2",
        [0x80] => "Response Message Template Format 1",
        [0x82] => "Application Interchange Profile",
        [0x83] => "Command Template",
        [0x84] => "Dedicated File (DF) Name",
        [0x87] => "Application Priority Indicator",
        [0x88] => "Short File Identifier (SFI)",
        [0x8C] => "CDOL1",
        [0x8D] => "CDOL2",
        [0x8E] => "Cardholder Verification Method (CVM) List",
        [0x8F] => "CA Public Key Index",
        [0x90] => "Issuer Public Key Certificate",
        [0x92] => "Issuer Public Key Remainder",
        [0x93] => "Signed Static Application Data",
        [0x94] => "Application File Locator",
        [0x95] => "Terminal Verification Results",
        [0x9A] => "Transaction Date",
        [0x9C] => "Transaction Type",
        [0x9D] => "Directory Definition File (DDF) Name",
        [0xA5] => "FCI Proprietary Template",
        [0xBF, 0x0C] => "FCI Issuer Discretionary Data",
        [0x9F, 0x02] => "Amount, Authorised (Numeric)",
        [0x9F, 0x03] => "Amount, Other (Numeric)",
        [0x9F, 0x07] => "Application Usage Control",
        [0x9F, 0x08] => "Application Version Number (Card)",
        [0x9F, 0x09] => "Application Version Number (Terminal)",
        [0x9F, 0x0D] => "Issuer Action Code - Default",
        [0x9F, 0x0E] => "Issuer Action Code - Denial",
        [0x9F, 0x0F] => "Issuer Action Code - Online",
        [0x9F, 0x10] => "Issuer Application Data",
        [0x9F, 0x11] => "Issuer Code Table Index",
        [0x9F, 0x12] => "Application Preferred Name",
        [0x9F, 0x13] => "Last Online ATC Register",
        [0x9F, 0x17] => "PIN Try Counter",
        [0x9F, 0x1A] => "Terminal Country Code",
        [0x9F, 0x1F] => "Track 1 Discretionary Data",
        [0x9F, 0x21] => "Transaction Time",
        [0x9F, 0x26] => "Application Cryptogram",
        [0x9F, 0x27] => "Cryptogram Information Data",
        [0x9F, 0x32] => "Issuer Public Key Exponent",
        [0x9F, 0x33] => "Terminal Capabilities",
        [0x9F, 0x34] => "Cardholder Verification Method (CVM) Results",
        [0x9F, 0x35] => "Terminal Type",
        [0x9F, 0x36] => "Application Transaction Counter (ATC)",
        [0x9F, 0x37] => "Unpredictable Number",
        [0x9F, 0x38] => "Processing Options Data Object List (PDOL)",
        [0x9F, 0x40] => "Additional Terminal Capabilities",
        [0x9F, 0x42] => "Application Currency Code",
        [0x9F, 0x44] => "Application Currency Exponent",
        [0x9F, 0x46] => "ICC Public Key Certificate",
        [0x9F, 0x47] => "ICC Public Key Exponent",
        [0x9F, 0x48] => "ICC Public Key Remainder",
        [0x9F, 0x49] => "Dynamic Data Authentication Data Object List (DDOL)",
        [0x9F, 0x4A] => "Static Data Authentication Tag List",
        [0x9F, 0x4D] => "Log Entry",
        [0x9F, 0x4E] => "Merchant Name and Location",
        [0x9F, 0x4F] => "Log Format",
        [0x9F, 0x66] => "Terminal Transaction Qualifiers (TTQ)",
        [0x9F, 0x6B] => "Track 2 Data",
        [0x9F, 0x6C] => "Card Transaction Qualifiers (CTQ)",
        [0x9F, 0x6E] => "Form Factor Indicator",
        [0x9F, 0x7C] => "Customer Exclusive Data",
        _ => "Unknown Tag",
    }
}

/// Look up a tag name from its hex representation (either case)
pub fn get_tag_name_hex(tag_hex: &str) -> &'static str {
    match hex::decode(tag_hex) {
        Ok(tag) => get_tag_name(&tag),
        Err(_) => "Unknown Tag",
    }
}
