//! Downlink command table.
//!
//! Each command parses its argument into a typed value and validates it before
//! any collaborator is called. Failures are returned as [`CommandError`] and
//! only logged by the runtime; the sender never gets a reply.

use log::{debug, error, info, trace, warn};

use super::publisher::PublisherHandle;
use super::traits::Board;
use crate::config::{ConfigPatch, SharedConfig};
use crate::error::CommandError;

/// Accepted reference range for forced CO2 recalibration, in ppm.
pub const CALIBRATION_RANGE: core::ops::RangeInclusive<u16> = 400..=2000;
/// Largest accepted temperature offset magnitude, in degrees Celsius.
pub const MAX_TEMPERATURE_OFFSET: f32 = 10.0;

/// A validated downlink command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Calibrate(u16),
    SetTemperatureOffset(f32),
    SetSps30AutoCleanInterval(u32),
    CleanSps30,
    GetConfig,
    SetConfig(ConfigPatch),
    ResetWifi,
    Ota,
    Reboot,
}

type Parser = fn(&str) -> Result<Command, CommandError>;

/// Command names as they appear after `down/`, with their argument parsers.
const COMMANDS: &[(&str, Parser)] = &[
    ("calibrate", parse_calibrate),
    ("setTemperatureOffset", parse_temperature_offset),
    ("setSPS30AutoCleanInterval", parse_auto_clean_interval),
    ("cleanSPS30", |_| Ok(Command::CleanSps30)),
    ("getConfig", |_| Ok(Command::GetConfig)),
    ("setConfig", parse_config_patch),
    ("resetWifi", |_| Ok(Command::ResetWifi)),
    ("ota", |_| Ok(Command::Ota)),
    ("reboot", |_| Ok(Command::Reboot)),
];

fn parse_config_patch(arg: &str) -> Result<Command, CommandError> {
    ConfigPatch::parse(arg.as_bytes()).map(Command::SetConfig)
}

fn parse_calibrate(arg: &str) -> Result<Command, CommandError> {
    let reference: i32 = arg.trim().parse().map_err(|_| CommandError::InvalidArgument)?;
    u16::try_from(reference)
        .ok()
        .filter(|r| CALIBRATION_RANGE.contains(r))
        .map(Command::Calibrate)
        .ok_or(CommandError::OutOfRange)
}

fn parse_temperature_offset(arg: &str) -> Result<Command, CommandError> {
    let offset: f32 = arg.trim().parse().map_err(|_| CommandError::InvalidArgument)?;
    // Lower bound exclusive, upper inclusive. NaN fails both comparisons.
    if -MAX_TEMPERATURE_OFFSET < offset && offset <= MAX_TEMPERATURE_OFFSET {
        Ok(Command::SetTemperatureOffset(offset))
    } else {
        Err(CommandError::OutOfRange)
    }
}

fn parse_auto_clean_interval(arg: &str) -> Result<Command, CommandError> {
    arg.trim()
        .parse()
        .map(Command::SetSps30AutoCleanInterval)
        .map_err(|_| CommandError::InvalidArgument)
}

impl Command {
    /// Looks up `name` and parses `argument` for it.
    pub fn parse(name: &str, argument: &str) -> Result<Self, CommandError> {
        let (_, parser) = COMMANDS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .ok_or(CommandError::UnknownCommand)?;
        parser(argument)
    }
}

/// Executes downlink commands against the board and the shared configuration.
#[derive(Clone, Copy)]
pub struct CommandRegistry<'a> {
    board: Board<'a>,
    config: &'a SharedConfig,
    publisher: PublisherHandle<'a>,
}

impl<'a> CommandRegistry<'a> {
    pub fn new(board: Board<'a>, config: &'a SharedConfig, publisher: PublisherHandle<'a>) -> Self {
        Self {
            board,
            config,
            publisher,
        }
    }

    /// Parses, validates and runs one command.
    pub async fn dispatch(&self, name: &str, argument: &str) -> Result<(), CommandError> {
        let command = Command::parse(name, argument)?;
        info!("received command [{}]", name);
        self.execute(command).await
    }

    /// Like [`Self::dispatch`], but logs and swallows every failure.
    pub async fn handle(&self, name: &str, argument: &str) {
        match self.dispatch(name, argument).await {
            Ok(()) => {}
            Err(CommandError::UnknownCommand) => debug!("ignoring unknown command [{}]", name),
            Err(CommandError::InvalidArgument | CommandError::OutOfRange) => {
                trace!("ignoring [{}] with argument [{}]", name, argument)
            }
            Err(CommandError::MalformedPayload) => {
                warn!("failed to parse message for [{}]: {}", name, argument)
            }
            Err(CommandError::Persist(e)) => error!("failed to save configuration: {:?}", e),
        }
    }

    async fn execute(&self, command: Command) -> Result<(), CommandError> {
        let board = &self.board;
        match command {
            Command::Calibrate(reference) => board.sensors.calibrate_co2(reference),
            Command::SetTemperatureOffset(offset) => board.sensors.set_temperature_offset(offset),
            Command::SetSps30AutoCleanInterval(seconds) => {
                board.sensors.set_auto_clean_interval(seconds)
            }
            Command::CleanSps30 => board.sensors.clean_particulate_sensor(),
            Command::GetConfig => self.publisher.request_config().await,
            Command::SetConfig(patch) => {
                let updated = self.config.update(|config| {
                    patch.apply(config);
                    config.clone()
                });
                board.store.save(&updated).map_err(CommandError::Persist)?;
            }
            Command::ResetWifi => board.wifi.reset_credentials(),
            Command::Ota => board.ota.check_for_update(),
            Command::Reboot => board.system.restart(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibrate_accepts_inclusive_range() {
        assert_eq!(Command::parse("calibrate", "400"), Ok(Command::Calibrate(400)));
        assert_eq!(Command::parse("calibrate", "2000"), Ok(Command::Calibrate(2000)));
        assert_eq!(Command::parse("calibrate", " 415\n"), Ok(Command::Calibrate(415)));
    }

    #[test]
    fn calibrate_rejects_outside_range() {
        for arg in ["399", "2001", "0", "-400", "70000"] {
            assert_eq!(Command::parse("calibrate", arg), Err(CommandError::OutOfRange), "{arg}");
        }
        assert_eq!(Command::parse("calibrate", "abc"), Err(CommandError::InvalidArgument));
    }

    #[test]
    fn temperature_offset_bounds() {
        assert_eq!(
            Command::parse("setTemperatureOffset", "10"),
            Ok(Command::SetTemperatureOffset(10.0))
        );
        assert_eq!(
            Command::parse("setTemperatureOffset", "-9.5"),
            Ok(Command::SetTemperatureOffset(-9.5))
        );
        assert_eq!(
            Command::parse("setTemperatureOffset", "-10"),
            Err(CommandError::OutOfRange)
        );
        assert_eq!(
            Command::parse("setTemperatureOffset", "10.1"),
            Err(CommandError::OutOfRange)
        );
        assert_eq!(
            Command::parse("setTemperatureOffset", "NaN"),
            Err(CommandError::OutOfRange)
        );
    }

    #[test]
    fn auto_clean_interval_takes_any_unsigned() {
        assert_eq!(
            Command::parse("setSPS30AutoCleanInterval", "604800"),
            Ok(Command::SetSps30AutoCleanInterval(604_800))
        );
        assert_eq!(
            Command::parse("setSPS30AutoCleanInterval", "-1"),
            Err(CommandError::InvalidArgument)
        );
    }

    #[test]
    fn argumentless_commands_ignore_payload() {
        assert_eq!(Command::parse("reboot", "now please"), Ok(Command::Reboot));
        assert_eq!(Command::parse("getConfig", ""), Ok(Command::GetConfig));
    }

    #[test]
    fn names_match_exactly() {
        assert_eq!(Command::parse("reboo", ""), Err(CommandError::UnknownCommand));
        assert_eq!(Command::parse("Reboot", ""), Err(CommandError::UnknownCommand));
        assert_eq!(Command::parse("", ""), Err(CommandError::UnknownCommand));
    }
}
