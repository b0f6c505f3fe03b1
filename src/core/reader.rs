use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};
use std::ffi::CString;
use std::time::Duration;

use crate::core::clock::Sleeper;
use crate::core::error::ReaderError;

/// Something that can wait for a card and connect to it
#[cfg_attr(test, mockall::automock(type Card = MockCardConnection;))]
pub trait CardReader {
    type Card: CardConnection;

    /// Wait up to `timeout` for a card to be present in a reader.
    /// Returns the name of the reader holding the card, or
    /// [`ReaderError::Timeout`].
    fn wait_for_card(&mut self, timeout: Duration) -> Result<String, ReaderError>;

    /// Open a logical connection to the card in `reader`
    fn connect(&mut self, reader: &str) -> Result<Self::Card, ReaderError>;
}

/// A logical connection to one card
#[cfg_attr(test, mockall::automock)]
pub trait CardConnection {
    fn reader_name(&self) -> String;

    /// Current Answer To Reset of the card
    fn atr(&self) -> Result<Vec<u8>, ReaderError>;

    /// Send an APDU, returning the raw reply including SW1 SW2
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, ReaderError>;

    fn disconnect(&mut self) -> Result<(), ReaderError>;
}

/// PCSC reader manager
pub struct PcscReader {
    context: Context,
    reader_filter: Option<String>,
    sleeper: Box<dyn Sleeper>,
}

impl PcscReader {
    /// Establish a PCSC context. With a filter, only readers whose name
    /// contains it are watched. `sleeper` paces polling while no reader
    /// is attached.
    pub fn new(
        reader_filter: Option<String>,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self, ReaderError> {
        let context = Context::establish(Scope::User)?;
        log::debug!("PCSC context established");

        Ok(Self {
            context,
            reader_filter,
            sleeper,
        })
    }

    fn candidate_readers(&self) -> Result<Vec<CString>, ReaderError> {
        let readers = match self.context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(readers
            .into_iter()
            .filter(|name| match &self.reader_filter {
                Some(filter) => name.to_string_lossy().contains(filter.as_str()),
                None => true,
            })
            .collect())
    }
}

fn reader_with_card(states: &[ReaderState]) -> Option<String> {
    states
        .iter()
        .find(|rs| {
            let state = rs.event_state();
            state.contains(State::PRESENT) && !state.contains(State::MUTE)
        })
        .map(|rs| rs.name().to_string_lossy().into_owned())
}

/// A poll attempt with no reader attached: wait out the attempt, then
/// report it as a timeout so the caller keeps polling.
fn wait_without_reader(sleeper: &dyn Sleeper, timeout: Duration) -> ReaderError {
    log::debug!("No reader available, waiting {timeout:?}");
    sleeper.sleep(timeout);
    ReaderError::Timeout
}

impl CardReader for PcscReader {
    type Card = PcscCard;

    fn wait_for_card(&mut self, timeout: Duration) -> Result<String, ReaderError> {
        let readers = self.candidate_readers()?;
        if readers.is_empty() {
            return Err(wait_without_reader(self.sleeper.as_ref(), timeout));
        }

        let mut states: Vec<ReaderState> = readers
            .into_iter()
            .map(|name| ReaderState::new(name, State::UNAWARE))
            .collect();

        // Learn the current state first, a card may already be seated
        self.context.get_status_change(Duration::ZERO, &mut states)?;
        if let Some(reader) = reader_with_card(&states) {
            return Ok(reader);
        }

        for rs in &mut states {
            rs.sync_current_state();
        }
        self.context.get_status_change(timeout, &mut states)?;

        reader_with_card(&states).ok_or(ReaderError::Timeout)
    }

    fn connect(&mut self, reader: &str) -> Result<PcscCard, ReaderError> {
        log::info!("Connecting to reader: {reader}");

        let reader_cstr =
            CString::new(reader).map_err(|_| ReaderError::InvalidReaderName(reader.to_string()))?;
        let card = self
            .context
            .connect(&reader_cstr, ShareMode::Shared, Protocols::ANY)?;

        log::info!("Successfully connected to reader: {reader}");
        Ok(PcscCard {
            reader_name: reader.to_string(),
            card: Some(card),
        })
    }
}

/// Card connected through PCSC
pub struct PcscCard {
    reader_name: String,
    card: Option<Card>,
}

impl PcscCard {
    fn card(&self) -> Result<&Card, ReaderError> {
        self.card.as_ref().ok_or(ReaderError::NotConnected)
    }
}

impl CardConnection for PcscCard {
    fn reader_name(&self) -> String {
        self.reader_name.clone()
    }

    fn atr(&self) -> Result<Vec<u8>, ReaderError> {
        let status = self.card()?.status2_owned()?;
        Ok(status.atr().to_vec())
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>, ReaderError> {
        let mut response_buf = [0; pcsc::MAX_BUFFER_SIZE];
        let response = self.card()?.transmit(apdu, &mut response_buf)?;
        Ok(response.to_vec())
    }

    fn disconnect(&mut self) -> Result<(), ReaderError> {
        let card = self.card.take().ok_or(ReaderError::NotConnected)?;
        card.disconnect(Disposition::LeaveCard)
            .map_err(|(_, err)| ReaderError::from(err))?;

        log::info!("Disconnected from reader: {}", self.reader_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::MockSleeper;
    use mockall::predicate::eq;

    #[test]
    fn test_no_reader_sleeps_out_the_attempt() {
        let mut sleeper = MockSleeper::new();
        sleeper
            .expect_sleep()
            .with(eq(Duration::from_millis(250)))
            .times(1)
            .return_const(());

        let err = wait_without_reader(&sleeper, Duration::from_millis(250));
        assert!(matches!(err, ReaderError::Timeout));
    }
}
