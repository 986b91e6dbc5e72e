//! LED strip bricklet.

use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::{Packet, PayloadWriter};

use super::{request, uid::uid_from_base58, BrickletIdentity};

const FUNCTION_SET_RGB_VALUES: u8 = 1;
const FUNCTION_GET_RGB_VALUES: u8 = 2;
const FUNCTION_SET_FRAME_DURATION: u8 = 3;
const FUNCTION_GET_FRAME_DURATION: u8 = 4;
const FUNCTION_GET_SUPPLY_VOLTAGE: u8 = 5;
const CALLBACK_FRAME_RENDERED: u8 = 6;
const FUNCTION_SET_CLOCK_FREQUENCY: u8 = 7;
const FUNCTION_GET_CLOCK_FREQUENCY: u8 = 8;
const FUNCTION_SET_CHIP_TYPE: u8 = 9;
const FUNCTION_GET_CHIP_TYPE: u8 = 10;

/// The protocol moves at most 16 LEDs per request.
const CHUNK: usize = 16;

/// One LED color value (8 bits per channel).
pub type Color = [u8; 3];

/// Standard color mapping (R→R, G→G, B→B).
pub const COLOR_MAP_RGB: [usize; 3] = [0, 1, 2];

/// Color mapping for strips with red and blue flipped.
pub const COLOR_MAP_BGR: [usize; 3] = [2, 1, 0];

/// Supported LED driver chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ChipType {
    Ws2801 = 2801,
    Ws2811 = 2811,
    Ws2812 = 2812,
}

impl ChipType {
    fn from_u16(v: u16) -> Option<Self> {
        match v {
            2801 => Some(Self::Ws2801),
            2811 => Some(Self::Ws2811),
            2812 => Some(Self::Ws2812),
            _ => None,
        }
    }
}

/// Control handle for an LED strip bricklet.
pub struct LedStrip<'a> {
    conn: &'a Connection,
    uid: u32,
    color_map: [usize; 3],
    rev_color_map: [usize; 3],
}

impl<'a> LedStrip<'a> {
    /// Create a control handle for the bricklet with the given UID.
    pub fn new(conn: &'a Connection, uid: u32) -> Self {
        Self {
            conn,
            uid,
            color_map: COLOR_MAP_RGB,
            rev_color_map: COLOR_MAP_RGB,
        }
    }

    /// Create a control handle from a Base58-printed UID.
    pub fn from_base58(conn: &'a Connection, uid: &str) -> Result<Self> {
        Ok(Self::new(conn, uid_from_base58(uid)?))
    }

    /// Apply a channel mapping for strips whose chips expect a different
    /// channel order.
    pub fn with_color_map(mut self, map: [usize; 3]) -> Self {
        let mut rev = [0usize; 3];
        for (i, &m) in map.iter().enumerate() {
            rev[m] = i;
        }
        self.color_map = map;
        self.rev_color_map = rev;
        self
    }

    /// Set up to 16 color values starting at `index`.
    pub async fn set_rgb_values(&self, index: u16, colors: &[Color]) -> Result<()> {
        let colors = &colors[..colors.len().min(CHUNK)];

        let (mut r, mut g, mut b) = ([0u8; CHUNK], [0u8; CHUNK], [0u8; CHUNK]);
        for (i, c) in colors.iter().enumerate() {
            r[i] = c[self.color_map[0]];
            g[i] = c[self.color_map[1]];
            b[i] = c[self.color_map[2]];
        }

        let mut params = PayloadWriter::new();
        params.push_u16(index);
        params.push_u8(colors.len() as u8);
        params.push_bytes(&r);
        params.push_bytes(&g);
        params.push_bytes(&b);

        self.conn
            .send(Packet::new(
                self.uid,
                FUNCTION_SET_RGB_VALUES,
                false,
                params.finish(),
            )?)
            .await?;
        Ok(())
    }

    /// Set all color values starting at `index`, chunking as needed.
    pub async fn set_all_rgb_values(&self, mut index: u16, mut colors: &[Color]) -> Result<()> {
        while !colors.is_empty() {
            self.set_rgb_values(index, colors).await?;
            colors = &colors[colors.len().min(CHUNK)..];
            index += CHUNK as u16;
        }
        Ok(())
    }

    /// Retrieve up to 16 currently set color values starting at `index`.
    pub async fn rgb_values(&self, index: u16, length: u8) -> Result<Vec<Color>> {
        let length = length.min(CHUNK as u8);

        let mut params = PayloadWriter::new();
        params.push_u16(index);
        params.push_u8(length);

        let reply = request(
            self.conn,
            Packet::new(self.uid, FUNCTION_GET_RGB_VALUES, true, params.finish())?,
        )
        .await?;

        let mut reader = reply.reader();
        let r = reader.read_bytes::<CHUNK>()?;
        let g = reader.read_bytes::<CHUNK>()?;
        let b = reader.read_bytes::<CHUNK>()?;

        let mut colors = vec![[0u8; 3]; length as usize];
        for (i, c) in colors.iter_mut().enumerate() {
            c[self.rev_color_map[0]] = r[i];
            c[self.rev_color_map[1]] = g[i];
            c[self.rev_color_map[2]] = b[i];
        }
        Ok(colors)
    }

    /// Set the number of milliseconds between frames.
    pub async fn set_frame_duration(&self, ms: u16) -> Result<()> {
        let mut params = PayloadWriter::new();
        params.push_u16(ms);
        self.conn
            .send(Packet::new(
                self.uid,
                FUNCTION_SET_FRAME_DURATION,
                false,
                params.finish(),
            )?)
            .await?;
        Ok(())
    }

    /// Currently set number of milliseconds between frames.
    pub async fn frame_duration(&self) -> Result<u16> {
        let reply = request(
            self.conn,
            Packet::new(self.uid, FUNCTION_GET_FRAME_DURATION, true, Vec::new())?,
        )
        .await?;
        reply.reader().read_u16()
    }

    /// Voltage currently drawn by the LEDs, in mV.
    pub async fn supply_voltage(&self) -> Result<u16> {
        let reply = request(
            self.conn,
            Packet::new(self.uid, FUNCTION_GET_SUPPLY_VOLTAGE, true, Vec::new())?,
        )
        .await?;
        reply.reader().read_u16()
    }

    /// Set the clock frequency in Hz (10 kHz to 2 MHz); the bricklet rounds
    /// to the next achievable frequency.
    pub async fn set_clock_frequency(&self, frequency: u32) -> Result<()> {
        let mut params = PayloadWriter::new();
        params.push_u32(frequency);
        self.conn
            .send(Packet::new(
                self.uid,
                FUNCTION_SET_CLOCK_FREQUENCY,
                false,
                params.finish(),
            )?)
            .await?;
        Ok(())
    }

    /// Currently used clock frequency in Hz.
    pub async fn clock_frequency(&self) -> Result<u32> {
        let reply = request(
            self.conn,
            Packet::new(self.uid, FUNCTION_GET_CLOCK_FREQUENCY, true, Vec::new())?,
        )
        .await?;
        reply.reader().read_u32()
    }

    /// Select the driver chip the strip is built from.
    pub async fn set_chip_type(&self, chip: ChipType) -> Result<()> {
        let mut params = PayloadWriter::new();
        params.push_u16(chip as u16);
        self.conn
            .send(Packet::new(
                self.uid,
                FUNCTION_SET_CHIP_TYPE,
                false,
                params.finish(),
            )?)
            .await?;
        Ok(())
    }

    /// Currently configured driver chip, if recognized.
    pub async fn chip_type(&self) -> Result<Option<ChipType>> {
        let reply = request(
            self.conn,
            Packet::new(self.uid, FUNCTION_GET_CHIP_TYPE, true, Vec::new())?,
        )
        .await?;
        Ok(ChipType::from_u16(reply.reader().read_u16()?))
    }

    /// Subscribe to frame-rendered callbacks. Each packet carries the length
    /// of the rendered frame as a `u16`.
    pub async fn frame_rendered_events(&self, depth: usize) -> Result<mpsc::Receiver<Packet>> {
        let (tx, rx) = mpsc::channel(depth);
        self.conn
            .subscribe(self.uid, CALLBACK_FRAME_RENDERED, tx)
            .await?;
        Ok(rx)
    }

    /// Query identity information for this bricklet.
    pub async fn identity(&self) -> Result<BrickletIdentity> {
        super::identity(self.conn, self.uid).await
    }
}
