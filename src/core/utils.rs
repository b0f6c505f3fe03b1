/// Format bytes as a compact hex string
pub fn format_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Format bytes as a hex string with spaces ("3B 04 A2")
pub fn format_hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format bytes as ASCII, replacing non-printable chars with '.'
pub fn format_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Parse a plain decimal number as typed at the prompt.
/// Signs, prefixes and surrounding junk are rejected.
pub fn parse_decimal(s: &str) -> Option<u32> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Human-readable description of SW1/SW2 for memory card commands
pub fn describe_status_word(sw1: u8, sw2: u8) -> String {
    match (sw1, sw2) {
        (0x90, 0x00) => "Success".to_string(),
        (0x62, 0x81) => "Warning: Part of returned data may be corrupted".to_string(),
        (0x62, 0x82) => "Warning: End of memory reached before reading all bytes".to_string(),
        (0x63, n) if n & 0xF0 == 0xC0 => format!("Warning: {} code attempt(s) left", n & 0x0F),
        (0x63, 0x00) => "Error: Code verification failed".to_string(),
        (0x65, 0x81) => "Error: Memory failure".to_string(),
        (0x67, 0x00) => "Error: Wrong length".to_string(),
        (0x69, 0x82) => "Error: Security status not satisfied (present the code first)".to_string(),
        (0x69, 0x83) => "Error: Code blocked".to_string(),
        (0x6A, 0x81) => "Error: Function not supported by this card type".to_string(),
        (0x6A, 0x86) => "Error: Incorrect parameters P1-P2".to_string(),
        (0x6B, 0x00) => "Error: Address out of range".to_string(),
        (0x6C, n) => format!("Error: Wrong length, exact length: {n}"),
        (0x6D, 0x00) => "Error: Instruction not supported".to_string(),
        (0x6E, 0x00) => "Error: Class not supported".to_string(),
        _ => format!("Unknown status: {sw1:02X} {sw2:02X}"),
    }
}
