//! Omni Robot link protocol.
//!
//! The five fixed channels, their UUIDs and wire encodings, and the
//! text command grammar understood by the robot firmware. The command
//! strings produced here are the compatibility surface with the ESP32
//! and must be reproduced exactly.

use std::fmt;

use crate::domain::models::{ConfigDocument, StickVector};
use crate::error::LinkError;

/// Advertised device name the discovery filter matches on.
pub const DEVICE_NAME: &str = "Omni Robot";

/// Primary control service UUID (must match the ESP32 firmware).
pub const SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

const COMMAND_CHAR_UUID: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";
const JOYSTICK_CHAR_UUID: &str = "ca73b3ba-39f6-4ab3-91ae-186dc9577d99";
const SPEED_CHAR_UUID: &str = "1c95d5e3-d8f7-413a-bf3d-7a2e5d7be87e";
const CONFIG_CHAR_UUID: &str = "d4e1f1a2-8b5c-4d3e-9f7a-6c8b5a4d3e2f";
const TEST_CHAR_UUID: &str = "a3b2c1d4-5e6f-7a8b-9c0d-1e2f3a4b5c6d";

/// Logical position count: four motors on the omni frame.
pub const MOTOR_POSITIONS: u8 = 4;

/// The five logical channels of the control link.
///
/// All five must be resolved before the session reaches `Connected`;
/// partial resolution is a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Movement and config text commands.
    Command,
    /// 2-byte signed stick vector.
    Joystick,
    /// 1-byte unsigned speed scalar.
    Speed,
    /// JSON config document, readable and subscribable.
    Config,
    /// Motor test text commands.
    Test,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        ChannelKind::Command,
        ChannelKind::Joystick,
        ChannelKind::Speed,
        ChannelKind::Config,
        ChannelKind::Test,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Command => "command",
            ChannelKind::Joystick => "joystick",
            ChannelKind::Speed => "speed",
            ChannelKind::Config => "config",
            ChannelKind::Test => "test",
        }
    }

    pub fn uuid(self) -> &'static str {
        match self {
            ChannelKind::Command => COMMAND_CHAR_UUID,
            ChannelKind::Joystick => JOYSTICK_CHAR_UUID,
            ChannelKind::Speed => SPEED_CHAR_UUID,
            ChannelKind::Config => CONFIG_CHAR_UUID,
            ChannelKind::Test => TEST_CHAR_UUID,
        }
    }
}

/// Encode a stick vector into the joystick channel's two signed bytes.
///
/// Each axis is rescaled from the logical `[-255, 255]` domain into the
/// firmware's signed-byte range and clamped to `[-128, 127]` to guard
/// against rounding overshoot. The asymmetric lower bound is the
/// firmware's defined wire contract.
pub fn encode_joystick(vector: StickVector) -> [u8; 2] {
    [scale_axis(vector.x) as u8, scale_axis(vector.y) as u8]
}

fn scale_axis(value: i16) -> i8 {
    (f64::from(value) * 127.0 / 255.0).clamp(-128.0, 127.0).round() as i8
}

/// Encode a speed value into the speed channel's unsigned byte,
/// saturating at the representable range.
pub fn encode_speed(speed: i32) -> [u8; 1] {
    [speed.clamp(0, 255) as u8]
}

/// Decode a config channel payload. Malformed JSON is an explicit
/// decode error; callers keep their previously cached document.
pub fn decode_config(payload: &[u8]) -> Result<ConfigDocument, LinkError> {
    serde_json::from_slice(payload).map_err(|err| LinkError::Decode(err.to_string()))
}

/// Movement commands sent over the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Forward,
    Backward,
    Left,
    Right,
    RotateLeft,
    RotateRight,
    Stop,
}

impl MotionCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            MotionCommand::Forward => "forward",
            MotionCommand::Backward => "backward",
            MotionCommand::Left => "left",
            MotionCommand::Right => "right",
            MotionCommand::RotateLeft => "rotate_left",
            MotionCommand::RotateRight => "rotate_right",
            MotionCommand::Stop => "stop",
        }
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestDirection {
    Forward,
    Backward,
}

impl TestDirection {
    fn as_str(self) -> &'static str {
        match self {
            TestDirection::Forward => "fwd",
            TestDirection::Backward => "bwd",
        }
    }
}

/// Single-motor test command, `test_<motor>_<fwd|bwd>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCommand {
    motor: u8,
    direction: TestDirection,
}

impl TestCommand {
    pub fn new(motor: u8, direction: TestDirection) -> Result<Self, LinkError> {
        if motor >= MOTOR_POSITIONS {
            return Err(LinkError::EncodeRange {
                context: "test motor index",
            });
        }
        Ok(Self { motor, direction })
    }
}

impl fmt::Display for TestCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test_{}_{}", self.motor, self.direction.as_str())
    }
}

/// Config mutation commands, sent as text over the command channel.
///
/// Field-at-a-time writes avoid read-modify-write races against the
/// robot's authoritative document; `Save` asks the firmware to persist
/// its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    SetMapping { position: u8, actuator: u8 },
    SetInvert { position: u8, inverted: bool },
    Save,
}

impl ConfigCommand {
    pub fn set_mapping(position: u8, actuator: u8) -> Result<Self, LinkError> {
        Self::check_position(position)?;
        Ok(ConfigCommand::SetMapping { position, actuator })
    }

    pub fn set_invert(position: u8, inverted: bool) -> Result<Self, LinkError> {
        Self::check_position(position)?;
        Ok(ConfigCommand::SetInvert { position, inverted })
    }

    fn check_position(position: u8) -> Result<(), LinkError> {
        if position >= MOTOR_POSITIONS {
            return Err(LinkError::EncodeRange {
                context: "config position",
            });
        }
        Ok(())
    }
}

impl fmt::Display for ConfigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigCommand::SetMapping { position, actuator } => {
                write!(f, "set_map:{position}:{actuator}")
            }
            ConfigCommand::SetInvert { position, inverted } => {
                write!(f, "set_inv:{position}:{inverted}")
            }
            ConfigCommand::Save => f.write_str("save_config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_five_channels_have_distinct_names_and_uuids() {
        let mut names: Vec<_> = ChannelKind::ALL.iter().map(|c| c.name()).collect();
        let mut uuids: Vec<_> = ChannelKind::ALL.iter().map(|c| c.uuid()).collect();
        names.sort_unstable();
        names.dedup();
        uuids.sort_unstable();
        uuids.dedup();
        assert_eq!(names.len(), 5);
        assert_eq!(uuids.len(), 5);
        assert!(!uuids.contains(&SERVICE_UUID));
    }

    #[test]
    fn joystick_encoding_scales_into_signed_bytes() {
        assert_eq!(encode_joystick(StickVector { x: 255, y: 0 }), [127, 0]);
        assert_eq!(
            encode_joystick(StickVector { x: -255, y: 255 }),
            [(-127i8) as u8, 127]
        );
        assert_eq!(encode_joystick(StickVector::default()), [0, 0]);
    }

    #[test]
    fn joystick_round_trip_stays_within_one_unit() {
        for value in [-255i16, -128, -1, 0, 1, 100, 254, 255] {
            let byte = encode_joystick(StickVector { x: value, y: 0 })[0] as i8;
            let expected = (f64::from(value) * 127.0 / 255.0).round() as i8;
            assert!(
                (i16::from(byte) - i16::from(expected)).abs() <= 1,
                "value {value} encoded to {byte}, expected about {expected}"
            );
        }
    }

    #[test]
    fn joystick_encoding_guards_overshoot() {
        // values past the logical domain saturate instead of wrapping
        assert_eq!(encode_joystick(StickVector { x: 300, y: -300 })[0] as i8, 127);
        assert_eq!(encode_joystick(StickVector { x: 300, y: -300 })[1] as i8, -128);
    }

    #[test]
    fn speed_encoding_saturates() {
        assert_eq!(encode_speed(300), [255]);
        assert_eq!(encode_speed(-5), [0]);
        assert_eq!(encode_speed(200), [200]);
    }

    #[test]
    fn config_decodes_the_firmware_shape() {
        let doc =
            decode_config(br#"{"mapping":[1,2,3,4],"invert":[false,false,true,false]}"#).unwrap();
        assert_eq!(doc.mapping, [1, 2, 3, 4]);
        assert_eq!(doc.invert, [false, false, true, false]);
    }

    #[test]
    fn malformed_config_is_a_decode_error() {
        let err = decode_config(b"{\"mapping\":[1,2").unwrap_err();
        assert!(matches!(err, LinkError::Decode(_)));
    }

    #[test]
    fn command_grammar_matches_the_firmware() {
        assert_eq!(MotionCommand::RotateLeft.to_string(), "rotate_left");
        assert_eq!(MotionCommand::Stop.to_string(), "stop");
        assert_eq!(
            TestCommand::new(2, TestDirection::Backward).unwrap().to_string(),
            "test_2_bwd"
        );
        assert_eq!(
            ConfigCommand::set_mapping(0, 3).unwrap().to_string(),
            "set_map:0:3"
        );
        assert_eq!(
            ConfigCommand::set_invert(1, true).unwrap().to_string(),
            "set_inv:1:true"
        );
        assert_eq!(ConfigCommand::Save.to_string(), "save_config");
    }

    #[test]
    fn out_of_range_grammar_values_are_rejected() {
        assert!(matches!(
            TestCommand::new(4, TestDirection::Forward),
            Err(LinkError::EncodeRange { .. })
        ));
        assert!(matches!(
            ConfigCommand::set_mapping(4, 1),
            Err(LinkError::EncodeRange { .. })
        ));
        assert!(matches!(
            ConfigCommand::set_invert(9, false),
            Err(LinkError::EncodeRange { .. })
        ));
    }
}
