//! Topic naming and downlink routing.
//!
//! All topics hang off the configured prefix:
//!
//! - uplink: `<prefix>/<deviceId>/up/{sensors,config,status}`
//! - device downlink: `<prefix>/<deviceId>/down/<command>`
//! - class downlink: `<prefix>/down/<command>`, addressed to every device
//!   sharing the prefix.

use core::fmt::Write;

use heapless::String;
use log::debug;

use crate::error::EncodeError;

/// Maximum length for a single topic string.
pub const MAX_TOPIC_LEN: usize = 128;

pub type Topic = String<MAX_TOPIC_LEN>;

/// Uplink channels published by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplink {
    Sensors,
    Config,
    Status,
}

impl Uplink {
    fn suffix(self) -> &'static str {
        match self {
            Uplink::Sensors => "sensors",
            Uplink::Config => "config",
            Uplink::Status => "status",
        }
    }
}

/// Which downlink pattern a command arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scope {
    DeviceSpecific,
    DeviceClassWide,
}

/// A downlink message split into command and argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInvocation<'m> {
    pub command: &'m str,
    pub argument: &'m str,
    pub scope: Scope,
}

fn format_topic(args: core::fmt::Arguments<'_>) -> Result<Topic, EncodeError> {
    let mut topic = Topic::new();
    topic.write_fmt(args).map_err(|_| EncodeError::TopicTooLong)?;
    Ok(topic)
}

/// `<prefix>/<deviceId>/up/<channel>`
pub fn uplink_topic(prefix: &str, device_id: u16, channel: Uplink) -> Result<Topic, EncodeError> {
    format_topic(format_args!("{}/{}/up/{}", prefix, device_id, channel.suffix()))
}

/// The two wildcard filters the device subscribes to, device-specific first.
pub fn downlink_filters(prefix: &str, device_id: u16) -> Result<[Topic; 2], EncodeError> {
    Ok([
        format_topic(format_args!("{}/{}/down/#", prefix, device_id))?,
        format_topic(format_args!("{}/down/#", prefix))?,
    ])
}

/// Matches `topic` against both downlink patterns.
///
/// The device-specific pattern is checked first, then the class-wide one, and
/// a class-wide match replaces a device-specific one. With a numeric device id
/// the two prefixes diverge right after `<prefix>/`, so a topic cannot match
/// both today; the order still decides precedence if the id format changes.
pub fn route<'m>(
    topic: &'m str,
    payload: &'m str,
    prefix: &str,
    device_id: u16,
) -> Option<CommandInvocation<'m>> {
    let mut found = None;

    let device_prefix = format_topic(format_args!("{}/{}/down/", prefix, device_id)).ok()?;
    if let Some(command) = topic.strip_prefix(device_prefix.as_str()) {
        debug!("device specific downlink message arrived [{}]", topic);
        found = Some((command, Scope::DeviceSpecific));
    }

    let class_prefix = format_topic(format_args!("{}/down/", prefix)).ok()?;
    if let Some(command) = topic.strip_prefix(class_prefix.as_str()) {
        debug!("device agnostic downlink message arrived [{}]", topic);
        found = Some((command, Scope::DeviceClassWide));
    }

    found.map(|(command, scope)| CommandInvocation {
        command,
        argument: payload,
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_specific_topic_routes_to_command() {
        let inv = route("myco2/42/down/reboot", "", "myco2", 42).unwrap();
        assert_eq!(inv.command, "reboot");
        assert_eq!(inv.scope, Scope::DeviceSpecific);
    }

    #[test]
    fn class_wide_topic_routes_to_command() {
        let inv = route("myco2/down/calibrate", "415", "myco2", 42).unwrap();
        assert_eq!(inv.command, "calibrate");
        assert_eq!(inv.argument, "415");
        assert_eq!(inv.scope, Scope::DeviceClassWide);
    }

    #[test]
    fn other_devices_and_prefixes_are_dropped() {
        assert_eq!(route("myco2/43/down/reboot", "", "myco2", 42), None);
        assert_eq!(route("other/down/reboot", "", "myco2", 42), None);
        assert_eq!(route("myco2/42/up/sensors", "", "myco2", 42), None);
    }

    #[test]
    fn command_keeps_trailing_segments() {
        let inv = route("myco2/42/down/setConfig/extra", "{}", "myco2", 42).unwrap();
        assert_eq!(inv.command, "setConfig/extra");
    }

    #[test]
    fn topics_follow_prefix_and_device() {
        assert_eq!(
            uplink_topic("myco2", 42, Uplink::Sensors).unwrap().as_str(),
            "myco2/42/up/sensors"
        );
        let [device, class] = downlink_filters("myco2", 42).unwrap();
        assert_eq!(device.as_str(), "myco2/42/down/#");
        assert_eq!(class.as_str(), "myco2/down/#");
    }

    #[test]
    fn overlong_prefix_is_reported() {
        let prefix = [b'p'; 130];
        let prefix = core::str::from_utf8(&prefix).unwrap();
        assert_eq!(
            uplink_topic(prefix, 1, Uplink::Status),
            Err(EncodeError::TopicTooLong)
        );
    }
}
