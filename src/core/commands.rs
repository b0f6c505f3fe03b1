use anyhow::{Context as AnyhowContext, Result};
use std::io::Write;
use std::time::Duration;

use crate::core::apdu::{self, MemoryRange};
use crate::core::clock::Sleeper;
use crate::core::error::CommandError;
use crate::core::reader::CardConnection;
use crate::core::session::CardSession;
use crate::core::utils::{format_ascii, format_hex_spaced, parse_decimal};

/// How a prompt cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The card was released, wait for the next one
    Disconnected,
    /// Leave the program
    Exiting,
}

/// The closed set of prompt commands, in help order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Disconnect,
    Exit,
    GetAtr,
    Help,
    Read,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Disconnect,
        CommandKind::Exit,
        CommandKind::GetAtr,
        CommandKind::Help,
        CommandKind::Read,
    ];

    /// Name typed at the prompt (case-sensitive)
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Disconnect => "disconnect",
            CommandKind::Exit => "exit",
            CommandKind::GetAtr => "getATR",
            CommandKind::Help => "help",
            CommandKind::Read => "read",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn help_desc(self) -> &'static str {
        match self {
            CommandKind::Disconnect => {
                "disconnect : disconnects the current card, giving the user a grace period \
                 (5 seconds by default, see --grace-secs) to remove it before waiting for a new card."
            }
            CommandKind::Exit => {
                "exit : neatly closes the prompt, disconnecting the current card beforehand if need be."
            }
            CommandKind::GetAtr => "getATR : prints out the current card's Answer To Reset.",
            CommandKind::Help => "help : displays this help message.",
            CommandKind::Read => {
                "read [--ascii] <address> [length] : reads <length> bytes of card memory \
                 starting at <address> (up to the end of memory by default), printed in \
                 hexadecimal or as ASCII text with --ascii."
            }
        }
    }
}

/// How `read` renders the bytes it got back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Hex,
    Ascii,
}

/// Parsed arguments of `read [--ascii] <address> [length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadArgs {
    pub range: MemoryRange,
    pub format: OutputFormat,
}

impl ReadArgs {
    /// Parse the tokens following `read`. Tokens past the length are ignored.
    pub fn parse(args: &[&str]) -> Result<Self, CommandError> {
        let (format, rest) = match args.split_first() {
            Some((&"--ascii", rest)) => (OutputFormat::Ascii, rest),
            _ => (OutputFormat::Hex, args),
        };

        let address_token = rest
            .first()
            .ok_or(CommandError::MissingArgument("address"))?;
        let address = parse_number("address", address_token)?;
        let address = u8::try_from(address).map_err(|_| CommandError::AddressOutOfRange(address))?;

        let range = match rest.get(1) {
            Some(length_token) => {
                let length = parse_number("length", length_token)?;
                let length =
                    u16::try_from(length).map_err(|_| CommandError::LengthOutOfRange(length))?;
                MemoryRange::new(address, length)?
            }
            None => MemoryRange::to_end(address),
        };

        Ok(Self { range, format })
    }

    pub fn apdu(&self) -> Vec<u8> {
        apdu::read_memory(self.range)
    }

    fn execute<C: CardConnection>(
        &self,
        session: &mut CardSession<C>,
        out: &mut dyn Write,
    ) -> Result<()> {
        log::debug!(
            "Reading {} byte(s) from address {}",
            self.range.length(),
            self.range.address()
        );

        let response = session
            .transmit(&self.apdu())
            .context("Failed to read card memory")?;

        let rendered = match self.format {
            OutputFormat::Hex => format_hex_spaced(&response.data),
            OutputFormat::Ascii => format_ascii(&response.data),
        };
        writeln!(out, "{rendered}")?;
        writeln!(out, "SW : 0x{:02X} 0x{:02X}", response.sw1, response.sw2)?;
        Ok(())
    }
}

fn parse_number(what: &'static str, token: &str) -> Result<u32, CommandError> {
    parse_decimal(token).ok_or_else(|| CommandError::InvalidNumber {
        what,
        value: token.to_string(),
    })
}

/// Everything a command needs besides the session
pub struct CommandContext<'a> {
    pub out: &'a mut dyn Write,
    pub sleeper: &'a dyn Sleeper,
    pub grace_period: Duration,
}

/// One parsed prompt line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Disconnect,
    Exit,
    GetAtr,
    Help,
    Read(ReadArgs),
}

impl Command {
    /// Parse a prompt line. Anything unrecognized, the empty line included,
    /// is `Help`. Only `read` arguments can fail to parse.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, args)) = tokens.split_first() else {
            return Ok(Command::Help);
        };

        let command = match CommandKind::from_name(name) {
            Some(CommandKind::Disconnect) => Command::Disconnect,
            Some(CommandKind::Exit) => Command::Exit,
            Some(CommandKind::GetAtr) => Command::GetAtr,
            Some(CommandKind::Read) => Command::Read(ReadArgs::parse(args)?),
            Some(CommandKind::Help) | None => Command::Help,
        };
        Ok(command)
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Disconnect => CommandKind::Disconnect,
            Command::Exit => CommandKind::Exit,
            Command::GetAtr => CommandKind::GetAtr,
            Command::Help => CommandKind::Help,
            Command::Read(_) => CommandKind::Read,
        }
    }

    /// Run the command. `Some` means the prompt must stop.
    ///
    /// Errors here come from the card or the terminal and are fatal.
    pub fn execute<C: CardConnection>(
        &self,
        session: &mut CardSession<C>,
        ctx: &mut CommandContext<'_>,
    ) -> Result<Option<PromptOutcome>> {
        log::debug!("Executing {}", self.kind().name());

        match self {
            Command::Disconnect => {
                disconnect(session, ctx)?;
                Ok(Some(PromptOutcome::Disconnected))
            }
            Command::Exit => {
                if session.is_connected() {
                    writeln!(ctx.out, "Disconnecting card before exiting")?;
                    disconnect(session, ctx)?;
                }
                writeln!(ctx.out, "Exiting")?;
                Ok(Some(PromptOutcome::Exiting))
            }
            Command::GetAtr => {
                let atr = session.current_atr().context("Failed to get the card ATR")?;
                writeln!(ctx.out, "{}", format_hex_spaced(atr))?;
                Ok(None)
            }
            Command::Help => {
                write_help(ctx.out)?;
                Ok(None)
            }
            Command::Read(args) => {
                args.execute(session, ctx.out)?;
                Ok(None)
            }
        }
    }
}

fn disconnect<C: CardConnection>(
    session: &mut CardSession<C>,
    ctx: &mut CommandContext<'_>,
) -> Result<()> {
    writeln!(ctx.out, "Disconnecting card...")?;
    session
        .disconnect()
        .context("Failed to disconnect the card")?;
    writeln!(ctx.out, "Successfully disconnected")?;
    ctx.out.flush()?;

    // Give time to pull the card out before polling again
    ctx.sleeper.sleep(ctx.grace_period);
    Ok(())
}

/// Print every command's help line, in declared order
pub fn write_help(out: &mut dyn Write) -> std::io::Result<()> {
    for kind in CommandKind::ALL {
        writeln!(out, "\t{}", kind.help_desc())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::MockSleeper;
    use crate::core::error::{ApduError, ReaderError};
    use crate::core::reader::MockCardConnection;
    use mockall::predicate::eq;

    fn mock_card() -> MockCardConnection {
        let mut card = MockCardConnection::new();
        card.expect_reader_name()
            .return_const("Mock Reader 0".to_string());
        card.expect_atr()
            .returning(|| Ok(vec![0xA2, 0x13, 0x10, 0x91]));
        card
    }

    fn idle_sleeper() -> MockSleeper {
        let mut sleeper = MockSleeper::new();
        sleeper.expect_sleep().never();
        sleeper
    }

    fn run(
        command: &Command,
        card: MockCardConnection,
        sleeper: &MockSleeper,
    ) -> (Option<PromptOutcome>, String) {
        let mut session = CardSession::open(card).unwrap();
        let mut out = Vec::new();
        let mut ctx = CommandContext {
            out: &mut out,
            sleeper,
            grace_period: Duration::from_secs(5),
        };
        let outcome = command.execute(&mut session, &mut ctx).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    fn help_text() -> String {
        let mut out = Vec::new();
        write_help(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse("disconnect").unwrap(), Command::Disconnect);
        assert_eq!(Command::parse("exit").unwrap(), Command::Exit);
        assert_eq!(Command::parse("getATR").unwrap(), Command::GetAtr);
        assert_eq!(Command::parse("help").unwrap(), Command::Help);
        assert_eq!(Command::parse("  exit   now ").unwrap(), Command::Exit);
    }

    #[test]
    fn test_parse_unknown_falls_back_to_help() {
        assert_eq!(Command::parse("").unwrap(), Command::Help);
        assert_eq!(Command::parse("   ").unwrap(), Command::Help);
        assert_eq!(Command::parse("foo").unwrap(), Command::Help);
        // Names are case-sensitive
        assert_eq!(Command::parse("getatr").unwrap(), Command::Help);
        assert_eq!(Command::parse("EXIT").unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_read_hex() {
        let Command::Read(args) = Command::parse("read 10 5").unwrap() else {
            panic!("Expected a read command");
        };
        assert_eq!(args.format, OutputFormat::Hex);
        assert_eq!(args.range.address(), 10);
        assert_eq!(args.range.length(), 5);
        assert_eq!(args.apdu(), vec![0xFF, 0xB0, 0x00, 0x0A, 0x05]);
    }

    #[test]
    fn test_parse_read_ascii_shifts_arguments() {
        let ascii = ReadArgs::parse(&["--ascii", "32", "16"]).unwrap();
        let hex = ReadArgs::parse(&["32", "16"]).unwrap();
        assert_eq!(ascii.format, OutputFormat::Ascii);
        assert_eq!(hex.format, OutputFormat::Hex);
        assert_eq!(ascii.range, hex.range);
    }

    #[test]
    fn test_parse_read_default_length() {
        for address in [0u16, 1, 10, 128, 255] {
            let token = address.to_string();
            let args = ReadArgs::parse(&[token.as_str()]).unwrap();
            assert_eq!(args.range.length(), 256 - address);
        }

        let whole = ReadArgs::parse(&["--ascii", "0"]).unwrap();
        assert_eq!(whole.range.length(), 256);
        assert_eq!(whole.apdu(), vec![0xFF, 0xB0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_read_errors() {
        assert_eq!(
            ReadArgs::parse(&[]).unwrap_err(),
            CommandError::MissingArgument("address")
        );
        assert_eq!(
            ReadArgs::parse(&["--ascii"]).unwrap_err(),
            CommandError::MissingArgument("address")
        );
        assert_eq!(
            ReadArgs::parse(&["abc"]).unwrap_err(),
            CommandError::InvalidNumber {
                what: "address",
                value: "abc".to_string()
            }
        );
        assert_eq!(
            ReadArgs::parse(&["10", "-1"]).unwrap_err(),
            CommandError::InvalidNumber {
                what: "length",
                value: "-1".to_string()
            }
        );
        assert_eq!(
            ReadArgs::parse(&["256"]).unwrap_err(),
            CommandError::AddressOutOfRange(256)
        );
        assert_eq!(
            ReadArgs::parse(&["0", "70000"]).unwrap_err(),
            CommandError::LengthOutOfRange(70000)
        );
        assert_eq!(
            ReadArgs::parse(&["0", "0"]).unwrap_err(),
            CommandError::Range(ApduError::InvalidLength(0))
        );
        assert_eq!(
            ReadArgs::parse(&["250", "7"]).unwrap_err(),
            CommandError::Range(ApduError::RangeOverflow {
                address: 250,
                length: 7
            })
        );
        // Errors surface through the line parser too
        assert!(Command::parse("read").is_err());
    }

    #[test]
    fn test_help_lists_every_command_once_in_order() {
        let help = help_text();
        let names: Vec<&str> = help
            .lines()
            .map(|line| {
                line.trim_start_matches('\t')
                    .split_whitespace()
                    .next()
                    .unwrap()
            })
            .collect();
        assert_eq!(names, vec!["disconnect", "exit", "getATR", "help", "read"]);
        assert!(help.lines().all(|line| line.starts_with('\t')));
    }

    #[test]
    fn test_disconnect_help_mentions_configurable_pause() {
        let desc = CommandKind::Disconnect.help_desc();
        assert!(desc.contains("grace period"));
        assert!(desc.contains("--grace-secs"));
        assert!(!desc.contains("five (5) seconds"));
    }

    #[test]
    fn test_execute_help() {
        let sleeper = idle_sleeper();
        let (outcome, out) = run(&Command::Help, mock_card(), &sleeper);
        assert_eq!(outcome, None);
        assert_eq!(out, help_text());
    }

    #[test]
    fn test_execute_get_atr() {
        let sleeper = idle_sleeper();
        let (outcome, out) = run(&Command::GetAtr, mock_card(), &sleeper);
        assert_eq!(outcome, None);
        assert_eq!(out, "A2 13 10 91\n");
    }

    #[test]
    fn test_execute_read_hex() {
        let mut card = mock_card();
        card.expect_transmit()
            .withf(|apdu| *apdu == [0xFF, 0xB0, 0x00, 0x0A, 0x05])
            .times(1)
            .returning(|_| Ok(vec![0x01, 0x02, 0xAB, 0xCD, 0xEF, 0x90, 0x00]));

        let sleeper = idle_sleeper();
        let command = Command::parse("read 10 5").unwrap();
        let (outcome, out) = run(&command, card, &sleeper);
        assert_eq!(outcome, None);
        assert_eq!(out, "01 02 AB CD EF\nSW : 0x90 0x00\n");
    }

    #[test]
    fn test_execute_read_ascii() {
        let mut card = mock_card();
        card.expect_transmit()
            .withf(|apdu| *apdu == [0xFF, 0xB0, 0x00, 0x20, 0x06])
            .times(1)
            .returning(|_| Ok(vec![b'H', b'e', b'l', b'l', b'o', 0x00, 0x90, 0x00]));

        let sleeper = idle_sleeper();
        let command = Command::parse("read --ascii 32 6").unwrap();
        let (_, out) = run(&command, card, &sleeper);
        assert_eq!(out, "Hello.\nSW : 0x90 0x00\n");
    }

    #[test]
    fn test_execute_read_transmit_failure_is_fatal() {
        let mut card = mock_card();
        card.expect_transmit()
            .returning(|_| Err(ReaderError::Pcsc(pcsc::Error::RemovedCard)));

        let sleeper = idle_sleeper();
        let mut session = CardSession::open(card).unwrap();
        let mut out = Vec::new();
        let mut ctx = CommandContext {
            out: &mut out,
            sleeper: &sleeper,
            grace_period: Duration::from_secs(5),
        };
        let command = Command::parse("read 0 4").unwrap();
        let err = command.execute(&mut session, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("Failed to read card memory"));
    }

    #[test]
    fn test_execute_disconnect_pauses_once() {
        let mut card = mock_card();
        card.expect_disconnect().times(1).returning(|| Ok(()));

        let mut sleeper = MockSleeper::new();
        sleeper
            .expect_sleep()
            .with(eq(Duration::from_secs(5)))
            .times(1)
            .return_const(());

        let (outcome, out) = run(&Command::Disconnect, card, &sleeper);
        assert_eq!(outcome, Some(PromptOutcome::Disconnected));
        assert_eq!(out, "Disconnecting card...\nSuccessfully disconnected\n");
    }

    #[test]
    fn test_execute_exit_disconnects_first() {
        let mut card = mock_card();
        card.expect_disconnect().times(1).returning(|| Ok(()));

        let mut sleeper = MockSleeper::new();
        sleeper.expect_sleep().times(1).return_const(());

        let (outcome, out) = run(&Command::Exit, card, &sleeper);
        assert_eq!(outcome, Some(PromptOutcome::Exiting));
        assert_eq!(
            out,
            "Disconnecting card before exiting\n\
             Disconnecting card...\n\
             Successfully disconnected\n\
             Exiting\n"
        );
    }

    #[test]
    fn test_execute_exit_on_disconnected_session() {
        let mut card = mock_card();
        card.expect_disconnect().times(1).returning(|| Ok(()));

        let sleeper = idle_sleeper();
        let mut session = CardSession::open(card).unwrap();
        session.disconnect().unwrap();

        let mut out = Vec::new();
        let mut ctx = CommandContext {
            out: &mut out,
            sleeper: &sleeper,
            grace_period: Duration::from_secs(5),
        };
        let outcome = Command::Exit.execute(&mut session, &mut ctx).unwrap();
        assert_eq!(outcome, Some(PromptOutcome::Exiting));
        assert_eq!(String::from_utf8(out).unwrap(), "Exiting\n");
    }

    #[test]
    fn test_execute_disconnect_failure_is_fatal() {
        let mut card = mock_card();
        card.expect_disconnect()
            .returning(|| Err(ReaderError::Pcsc(pcsc::Error::ReaderUnavailable)));

        let sleeper = idle_sleeper();
        let mut session = CardSession::open(card).unwrap();
        let mut out = Vec::new();
        let mut ctx = CommandContext {
            out: &mut out,
            sleeper: &sleeper,
            grace_period: Duration::from_secs(5),
        };
        assert!(Command::Disconnect.execute(&mut session, &mut ctx).is_err());
    }
}
