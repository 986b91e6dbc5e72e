//! Bricklet helpers built on top of the connection engine.
//!
//! Each wrapper only constructs packets with device-specific function codes
//! and decodes their payloads; all transport concerns stay in
//! [`Connection`](crate::Connection).

pub mod ledstrip;
pub mod tilt;
pub mod uid;

use std::fmt;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::Packet;

/// Function code for the identity query supported by every brick and
/// bricklet.
pub const FUNCTION_GET_IDENTITY: u8 = 255;

/// Send a request and return the (error-checked) reply.
pub(crate) async fn request(conn: &Connection, packet: Packet) -> Result<Packet> {
    match conn.send(packet).await? {
        Some(reply) => {
            if let Some(e) = reply.error() {
                return Err(e.into());
            }
            Ok(reply)
        }
        // Response-expected requests always resolve to a reply or an error
        None => Err(Error::Closed),
    }
}

/// A brick or bricklet version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version(pub [u8; 3]);

impl Version {
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self([major, minor, patch])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Identity information reported by a brick or bricklet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrickletIdentity {
    /// Base58-printed UID of the device itself.
    pub uid: String,
    /// Base58-printed UID of the brick it is connected to.
    pub connected_uid: String,
    /// Port the device is connected to.
    pub position: char,
    pub hardware_version: Version,
    pub firmware_version: Version,
    pub device_identifier: u16,
}

impl BrickletIdentity {
    /// Human readable device name for the identifier, if known.
    pub fn device_name(&self) -> Option<&'static str> {
        device_name(self.device_identifier)
    }
}

/// Query identity information from the device with the given UID.
pub async fn identity(conn: &Connection, uid: u32) -> Result<BrickletIdentity> {
    let reply = request(conn, Packet::new(uid, FUNCTION_GET_IDENTITY, true, Vec::new())?).await?;

    let mut r = reply.reader();
    let display_uid = r.read_bytes::<8>()?;
    let connected_uid = r.read_bytes::<8>()?;
    let position = r.read_u8()?;
    let hardware = r.read_bytes::<3>()?;
    let firmware = r.read_bytes::<3>()?;
    let device_identifier = r.read_u16()?;

    Ok(BrickletIdentity {
        uid: decode_uid_string(&display_uid),
        connected_uid: decode_uid_string(&connected_uid),
        position: position as char,
        hardware_version: Version(hardware),
        firmware_version: Version(firmware),
        device_identifier,
    })
}

/// Fixed-width UID strings come NUL-padded off the wire.
fn decode_uid_string(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Translate a device identifier into a human readable name.
pub fn device_name(device_identifier: u16) -> Option<&'static str> {
    let name = match device_identifier {
        11 => "Brick DC",
        13 => "Brick Master",
        14 => "Brick Servo",
        15 => "Brick Stepper",
        16 => "Brick IMU",
        17 => "Brick RED",
        21 => "Bricklet Ambient Light",
        23 => "Bricklet Current12",
        24 => "Bricklet Current25",
        25 => "Bricklet Distance IR",
        26 => "Bricklet Dual Relay",
        27 => "Bricklet Humidity",
        28 => "Bricklet IO-16",
        29 => "Bricklet IO-4",
        210 => "Bricklet Joystick",
        211 => "Bricklet LCD 16x2",
        212 => "Bricklet LCD 20x4",
        213 => "Bricklet Linear Poti",
        214 => "Bricklet Piezo Buzzer",
        215 => "Bricklet Rotary Poti",
        216 => "Bricklet Temperature",
        217 => "Bricklet Temperature IR",
        218 => "Bricklet Voltage",
        219 => "Bricklet Analog In",
        220 => "Bricklet Analog Out",
        221 => "Bricklet Barometer",
        222 => "Bricklet GPS",
        223 => "Bricklet Industrial Digital In 4",
        224 => "Bricklet Industrial Digital Out 4",
        225 => "Bricklet Industrial Quad Relay",
        226 => "Bricklet PTC",
        227 => "Bricklet Voltage/Current",
        228 => "Bricklet Industrial Dual 0-20mA",
        229 => "Bricklet Distance US",
        230 => "Bricklet Dual Button",
        231 => "Bricklet LED Strip",
        232 => "Bricklet Moisture",
        233 => "Bricklet Motion Detector",
        234 => "Bricklet Multi Touch",
        235 => "Bricklet Remote Switch",
        236 => "Bricklet Rotary Encoder",
        237 => "Bricklet Segment Display 4x7",
        238 => "Bricklet Sound Intensity",
        239 => "Bricklet Tilt",
        240 => "Bricklet Hall Effect",
        241 => "Bricklet Line",
        242 => "Bricklet Piezo Speaker",
        243 => "Bricklet Color",
        244 => "Bricklet Solid State Relay",
        245 => "Bricklet Heart Rate",
        246 => "Bricklet NFC/RFID",
        _ => return None,
    };
    Some(name)
}
