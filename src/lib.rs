/// Bad Reader - interactive prompt for SLE4442-family memory smart cards
///
/// Waits for a card on a PCSC reader, then reads commands from a line
/// prompt until the card is disconnected or the user exits.
pub mod cli;
pub mod core;

// Re-export commonly used types
pub use crate::core::{
    apdu::{MemoryRange, Response},
    clock::{Sleeper, ThreadSleeper},
    commands::{Command, CommandKind, PromptOutcome},
    config::Settings,
    error::{ApduError, CommandError, ReaderError},
    reader::{CardConnection, CardReader, PcscReader},
    session::{await_card, CardSession},
};
