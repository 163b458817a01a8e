//! ISO 7816-4 / EMV status word taxonomy
//!
//! [`describe_status_word`] is total: an exact table hit, else an SW1 range
//! description, else "Unknown: XXXX".

/// Success
pub const SW_SUCCESS: u16 = 0x9000;
/// Wrong length
pub const SW_WRONG_LENGTH: u16 = 0x6700;
/// Conditions of use not satisfied
pub const SW_CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
/// File or application not found
pub const SW_FILE_NOT_FOUND: u16 = 0x6A82;
/// Record not found
pub const SW_RECORD_NOT_FOUND: u16 = 0x6A83;
/// Referenced data not found
pub const SW_DATA_NOT_FOUND: u16 = 0x6A88;
/// Instruction not supported
pub const SW_INS_NOT_SUPPORTED: u16 = 0x6D00;
/// No precise diagnosis; also the synthetic status for a failed exchange
pub const SW_TECHNICAL_PROBLEM: u16 = 0x6F00;

/// Exact-match status word table
const STATUS_TABLE: &[(u16, &str)] = &[
    (0x9000, "Success"),
    (0x6200, "No information given (non-volatile memory unchanged)"),
    (0x6281, "Part of returned data may be corrupted"),
    (0x6282, "End of file or record reached before reading Le bytes"),
    (0x6283, "Selected file deactivated"),
    (0x6284, "File control information not formatted according to ISO 7816-4"),
    (0x6300, "Authentication failed"),
    (0x6581, "Memory failure"),
    (0x6700, "Wrong length"),
    (0x6800, "Functions in CLA not supported"),
    (0x6881, "Logical channel not supported"),
    (0x6882, "Secure messaging not supported"),
    (0x6900, "Command not allowed"),
    (0x6981, "Command incompatible with file structure"),
    (0x6982, "Security status not satisfied"),
    (0x6983, "Authentication method blocked"),
    (0x6984, "Referenced data invalidated"),
    (0x6985, "Conditions of use not satisfied"),
    (0x6986, "Command not allowed (no current EF)"),
    (0x6A80, "Incorrect parameters in the data field"),
    (0x6A81, "Function not supported"),
    (0x6A82, "File or application not found"),
    (0x6A83, "Record not found"),
    (0x6A84, "Not enough memory space in the file"),
    (0x6A86, "Incorrect parameters P1-P2"),
    (0x6A88, "Referenced data not found"),
    (0x6B00, "Wrong parameters P1-P2"),
    (0x6D00, "Instruction code not supported or invalid"),
    (0x6E00, "Class not supported"),
    (0x6F00, "No precise diagnosis (technical problem)"),
];

/// Describe a status word
pub fn describe_status_word(word: u16) -> String {
    if let Some((_, text)) = STATUS_TABLE.iter().find(|(sw, _)| *sw == word) {
        return (*text).to_string();
    }

    let sw1 = (word >> 8) as u8;
    let sw2 = word as u8;
    match sw1 {
        0x61 => format!("Response bytes still available: {}", sw2),
        0x62 => "Warning: state of non-volatile memory unchanged".to_string(),
        0x63 if sw2 & 0xF0 == 0xC0 => {
            format!("Verification failed, {} retries remaining", sw2 & 0x0F)
        }
        0x63 => "Warning: state of non-volatile memory changed".to_string(),
        0x64 => "Execution error: state of non-volatile memory unchanged".to_string(),
        0x65 => "Execution error: state of non-volatile memory changed".to_string(),
        0x66 => "Security-related issue".to_string(),
        0x67 => "Wrong length".to_string(),
        0x68 => "Functions in CLA not supported".to_string(),
        0x69 => "Command not allowed".to_string(),
        0x6A => "Wrong parameters P1-P2".to_string(),
        0x6B => "Wrong parameters P1-P2".to_string(),
        0x6C => format!("Wrong Le field: exact length is {}", sw2),
        0x6D => "Instruction code not supported or invalid".to_string(),
        0x6E => "Class not supported".to_string(),
        0x6F => "No precise diagnosis".to_string(),
        _ => format!("Unknown: {:04X}", word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_table() {
        assert_eq!(describe_status_word(0x9000), "Success");
        assert_eq!(describe_status_word(0x6A82), "File or application not found");
        assert_eq!(describe_status_word(SW_TECHNICAL_PROBLEM), "No precise diagnosis (technical problem)");
    }

    #[test]
    fn test_range_fallback() {
        assert_eq!(describe_status_word(0x6120), "Response bytes still available: 32");
        assert_eq!(describe_status_word(0x6C10), "Wrong Le field: exact length is 16");
        assert_eq!(describe_status_word(0x63C2), "Verification failed, 2 retries remaining");
        assert_eq!(describe_status_word(0x6A8F), "Wrong parameters P1-P2");
    }

    #[test]
    fn test_unknown() {
        let text = describe_status_word(0x1234);
        assert!(text.contains("Unknown"));
        assert_eq!(text, "Unknown: 1234");
    }

    #[test]
    fn test_table_has_no_duplicates() {
        for (i, (a, _)) in STATUS_TABLE.iter().enumerate() {
            assert!(STATUS_TABLE[i + 1..].iter().all(|(b, _)| a != b));
        }
    }
}
