//! APDUs for memory cards (SLE4432/4442/4418) behind an ACR38-style reader.
//!
//! Memory is addressed with a single byte, so a card exposes at most 256
//! bytes of main memory. Every range built here is checked against that.

use crate::core::error::{ApduError, ReaderError};

/// Size of the single-byte addressable main memory
pub const MEMORY_SIZE: u16 = 256;

/// Size of the protection memory, one bit per byte of the first 32 bytes
pub const PROTECTION_MEMORY_SIZE: u8 = 32;

/// Select card type: SLE4432/4442/4418
pub const SELECT_CARD_TYPE: [u8; 6] = [0xFF, 0xA4, 0x00, 0x00, 0x01, 0x06];

/// Read memory card prefix, followed by address and length
pub const READ_MEMORY_CARD: [u8; 3] = [0xFF, 0xB0, 0x00];

/// Read the presentation error counter (SLE4442)
pub const READ_ERROR_COUNTER: [u8; 5] = [0xFF, 0xB1, 0x00, 0x00, 0x04];

/// Read the 32 protection bits (SLE4432/4442)
pub const READ_PROTECTION_BITS: [u8; 5] = [0xFF, 0xB2, 0x00, 0x00, 0x04];

/// Write memory card prefix, followed by address, length and data
pub const WRITE_MEMORY_CARD: [u8; 3] = [0xFF, 0xD0, 0x00];

/// Write protection memory prefix, followed by address (0x00-0x1F), length and data
pub const WRITE_PROTECTION_MEMORY_CARD: [u8; 3] = [0xFF, 0xD1, 0x00];

/// Present code prefix, followed by the three PIN bytes
pub const PRESENT_CODE: [u8; 5] = [0xFF, 0x20, 0x00, 0x00, 0x03];

/// Change code prefix, followed by the three bytes of the new PIN
pub const CHANGE_CODE: [u8; 5] = [0xFF, 0xD2, 0x00, 0x01, 0x03];

/// A validated range of card memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    address: u8,
    length: u16,
}

impl MemoryRange {
    /// Build a range, rejecting empty ranges and ranges past the end of memory
    pub fn new(address: u8, length: u16) -> Result<Self, ApduError> {
        if length == 0 || length > MEMORY_SIZE {
            return Err(ApduError::InvalidLength(length));
        }
        if u16::from(address) + length > MEMORY_SIZE {
            return Err(ApduError::RangeOverflow { address, length });
        }
        Ok(Self { address, length })
    }

    /// Range from `address` to the end of memory
    pub fn to_end(address: u8) -> Self {
        Self {
            address,
            length: MEMORY_SIZE - u16::from(address),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    /// Length as sent on the wire. 256 does not fit in a byte and goes out as
    /// 0x00, the short Le encoding for 256.
    pub fn length_byte(&self) -> u8 {
        (self.length % MEMORY_SIZE) as u8
    }
}

/// Response to an APDU, split into data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl Response {
    /// Split a raw card reply. The status word is the last two bytes.
    pub fn from_raw(mut raw: Vec<u8>) -> Result<Self, ReaderError> {
        if raw.len() < 2 {
            return Err(ReaderError::ShortResponse(raw.len()));
        }
        let sw2 = raw.pop().unwrap_or_default();
        let sw1 = raw.pop().unwrap_or_default();
        Ok(Self {
            data: raw,
            sw1,
            sw2,
        })
    }

    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

pub fn select_card_type() -> Vec<u8> {
    SELECT_CARD_TYPE.to_vec()
}

/// READ MEMORY CARD for the given range
pub fn read_memory(range: MemoryRange) -> Vec<u8> {
    let mut apdu = READ_MEMORY_CARD.to_vec();
    apdu.push(range.address());
    apdu.push(range.length_byte());
    apdu
}

/// WRITE MEMORY CARD of `data` starting at `address`
pub fn write_memory(address: u8, data: &[u8]) -> Result<Vec<u8>, ApduError> {
    let length = u8::try_from(data.len())
        .ok()
        .filter(|&len| len > 0)
        .ok_or(ApduError::InvalidPayload(data.len()))?;
    MemoryRange::new(address, u16::from(length))?;

    let mut apdu = WRITE_MEMORY_CARD.to_vec();
    apdu.push(address);
    apdu.push(length);
    apdu.extend_from_slice(data);
    Ok(apdu)
}

pub fn read_error_counter() -> Vec<u8> {
    READ_ERROR_COUNTER.to_vec()
}

pub fn read_protection_bits() -> Vec<u8> {
    READ_PROTECTION_BITS.to_vec()
}

/// WRITE PROTECTION MEMORY CARD. Each data byte must match the main memory
/// byte at the same address for its protection bit to be set.
pub fn write_protection_memory(address: u8, data: &[u8]) -> Result<Vec<u8>, ApduError> {
    if data.is_empty() {
        return Err(ApduError::InvalidPayload(0));
    }
    if usize::from(address) + data.len() > usize::from(PROTECTION_MEMORY_SIZE) {
        return Err(ApduError::ProtectionRangeOverflow {
            address,
            length: data.len(),
        });
    }

    let mut apdu = WRITE_PROTECTION_MEMORY_CARD.to_vec();
    apdu.push(address);
    // Bounded by PROTECTION_MEMORY_SIZE above
    apdu.push(data.len() as u8);
    apdu.extend_from_slice(data);
    Ok(apdu)
}

/// PRESENT CODE with the three-byte PIN
pub fn present_code(pin: [u8; 3]) -> Vec<u8> {
    let mut apdu = PRESENT_CODE.to_vec();
    apdu.extend_from_slice(&pin);
    apdu
}

/// CHANGE CODE to the given three-byte PIN. The current code must have been
/// presented first.
pub fn change_code(new_pin: [u8; 3]) -> Vec<u8> {
    let mut apdu = CHANGE_CODE.to_vec();
    apdu.extend_from_slice(&new_pin);
    apdu
}
