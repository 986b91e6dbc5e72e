//! Tilt sensor bricklet.

use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::{ProtocolError, Result};
use crate::protocol::Packet;

use super::{request, BrickletIdentity};

const FUNCTION_GET_TILT_STATE: u8 = 1;
const FUNCTION_ENABLE_TILT_STATE_CALLBACK: u8 = 2;
const FUNCTION_DISABLE_TILT_STATE_CALLBACK: u8 = 3;
const FUNCTION_IS_TILT_STATE_CALLBACK_ENABLED: u8 = 4;
const CALLBACK_TILT_STATE: u8 = 5;

/// State reported by the tilt switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TiltState {
    /// Switch closed (sensor level).
    Closed = 0,
    /// Switch open (sensor tilted).
    Open = 1,
    /// Switch closed but vibrating.
    ClosedVibrating = 2,
}

impl TiltState {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Closed),
            1 => Ok(Self::Open),
            2 => Ok(Self::ClosedVibrating),
            _ => Err(ProtocolError::InvalidParameter.into()),
        }
    }
}

/// Control handle for a tilt bricklet.
pub struct Tilt<'a> {
    conn: &'a Connection,
    uid: u32,
}

impl<'a> Tilt<'a> {
    /// Create a control handle for the bricklet with the given UID.
    pub fn new(conn: &'a Connection, uid: u32) -> Self {
        Self { conn, uid }
    }

    /// Current state of the tilt switch.
    pub async fn state(&self) -> Result<TiltState> {
        let reply = request(
            self.conn,
            Packet::new(self.uid, FUNCTION_GET_TILT_STATE, true, Vec::new())?,
        )
        .await?;
        TiltState::from_u8(reply.reader().read_u8()?)
    }

    /// Enable the state-change callback.
    pub async fn enable_state_callback(&self) -> Result<()> {
        self.conn
            .send(Packet::new(
                self.uid,
                FUNCTION_ENABLE_TILT_STATE_CALLBACK,
                false,
                Vec::new(),
            )?)
            .await?;
        Ok(())
    }

    /// Disable the state-change callback.
    pub async fn disable_state_callback(&self) -> Result<()> {
        self.conn
            .send(Packet::new(
                self.uid,
                FUNCTION_DISABLE_TILT_STATE_CALLBACK,
                false,
                Vec::new(),
            )?)
            .await?;
        Ok(())
    }

    /// Whether the state-change callback is enabled.
    pub async fn state_callback_enabled(&self) -> Result<bool> {
        let reply = request(
            self.conn,
            Packet::new(
                self.uid,
                FUNCTION_IS_TILT_STATE_CALLBACK_ENABLED,
                true,
                Vec::new(),
            )?,
        )
        .await?;
        reply.reader().read_bool()
    }

    /// Subscribe to state-change callbacks.
    ///
    /// The callback must also be enabled on the device via
    /// [`enable_state_callback`](Self::enable_state_callback). Decode each
    /// received packet with [`decode_state`](Self::decode_state).
    pub async fn state_events(&self, depth: usize) -> Result<mpsc::Receiver<Packet>> {
        let (tx, rx) = mpsc::channel(depth);
        self.conn
            .subscribe(self.uid, CALLBACK_TILT_STATE, tx)
            .await?;
        Ok(rx)
    }

    /// Decode the state carried by a state-change callback packet.
    pub fn decode_state(packet: &Packet) -> Result<TiltState> {
        TiltState::from_u8(packet.reader().read_u8()?)
    }

    /// Query identity information for this bricklet.
    pub async fn identity(&self) -> Result<BrickletIdentity> {
        super::identity(self.conn, self.uid).await
    }
}
