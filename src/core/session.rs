use anyhow::{Context as AnyhowContext, Result};
use std::io::Write;
use std::time::Duration;

use crate::core::apdu::{self, Response};
use crate::core::error::ReaderError;
use crate::core::reader::{CardConnection, CardReader};
use crate::core::utils::{describe_status_word, format_hex, format_hex_spaced};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Disconnected,
}

/// One physical card's logical connection.
///
/// Owned by the connection loop, lent to the prompt, dropped once
/// disconnected.
pub struct CardSession<C> {
    card: C,
    reader_name: String,
    atr: Vec<u8>,
    state: SessionState,
}

impl<C: CardConnection> CardSession<C> {
    /// Wrap a freshly connected card, reading its ATR
    pub fn open(card: C) -> Result<Self, ReaderError> {
        let reader_name = card.reader_name();
        let atr = card.atr()?;
        Ok(Self {
            card,
            reader_name,
            atr,
            state: SessionState::Connected,
        })
    }

    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// ATR read when the session was opened
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Ask the card for its ATR again
    pub fn current_atr(&mut self) -> Result<&[u8], ReaderError> {
        self.ensure_connected()?;
        self.atr = self.card.atr()?;
        Ok(&self.atr)
    }

    pub fn transmit(&mut self, apdu: &[u8]) -> Result<Response, ReaderError> {
        self.ensure_connected()?;
        log::info!("Transmitting APDU: {}", format_hex(apdu));

        let raw = self.card.transmit(apdu)?;
        log::debug!("Received response: {}", format_hex(&raw));

        let response = Response::from_raw(raw)?;
        log::info!(
            "Status {:02X} {:02X}: {}",
            response.sw1,
            response.sw2,
            describe_status_word(response.sw1, response.sw2)
        );
        Ok(response)
    }

    /// Put the reader in SLE4432/4442/4418 mode
    pub fn select_card_type(&mut self) -> Result<Response, ReaderError> {
        self.transmit(&apdu::select_card_type())
    }

    /// End the connection. The state flips even though nothing confirms
    /// the card was actually released.
    pub fn disconnect(&mut self) -> Result<(), ReaderError> {
        self.ensure_connected()?;
        self.card.disconnect()?;
        self.state = SessionState::Disconnected;
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), ReaderError> {
        match self.state {
            SessionState::Connected => Ok(()),
            SessionState::Disconnected => Err(ReaderError::NotConnected),
        }
    }
}

/// Poll for a card until one is seated, then connect to it.
///
/// A timeout prints a progress dot and polls again, forever. Any other
/// reader error is returned and ends the program.
pub fn await_card<R, W>(
    reader: &mut R,
    timeout_per_attempt: Duration,
    out: &mut W,
) -> Result<CardSession<R::Card>>
where
    R: CardReader,
    W: Write,
{
    write!(out, "Waiting for card insertion")?;

    let reader_name = loop {
        write!(out, ".")?;
        out.flush()?;

        match reader.wait_for_card(timeout_per_attempt) {
            Ok(name) => break name,
            Err(ReaderError::Timeout) => continue,
            Err(e) => return Err(e).context("Failed while waiting for a card"),
        }
    };
    writeln!(out, "!")?;

    let card = reader
        .connect(&reader_name)
        .with_context(|| format!("Failed to connect to reader: {reader_name}"))?;
    let session = CardSession::open(card).context("Failed to read the card ATR")?;

    writeln!(out, "Successfully connected on reader {}", session.reader_name())?;
    writeln!(out, "Card ATR showing {}", format_hex_spaced(session.atr()))?;

    Ok(session)
}
