//! The two I2C halves of the ring.
//!
//! Duplex I2C between two boards is unreliable, so each direction gets its own peripheral: every board is the bus
//! controller of its outbound bus (I2C0) and the target of its inbound bus (I2C1). Since each bus connects exactly two
//! boards, a single address serves the whole ring.

use defmt::*;
use embassy_rp::{
    i2c::{self, Async, I2c},
    i2c_slave::{self, Command, I2cSlave},
    peripherals::{I2C0, I2C1},
};
use embedded_hal_async::i2c::I2c as _;
use pico_piano_lib::{
    configuration::LINK_ADDRESS,
    error::Error,
    frame::{FRAME_LEN, Packet},
    link::{LinkRx, LinkTx},
};

/// Bus speed of both halves.
pub const LINK_FREQUENCY: u32 = 100_000;

/// Configuration of the outbound bus.
pub fn controller_config() -> i2c::Config {
    let mut config = i2c::Config::default();
    config.frequency = LINK_FREQUENCY;
    config
}

/// Configuration of the inbound bus.
pub fn target_config() -> i2c_slave::Config {
    let mut config = i2c_slave::Config::default();
    config.addr = u16::from(LINK_ADDRESS);
    config
}

/// Writes frames to the next board.
pub struct I2cLinkTx {
    i2c: I2c<'static, I2C0, Async>,
}

impl I2cLinkTx {
    pub fn new(i2c: I2c<'static, I2C0, Async>) -> Self {
        Self { i2c }
    }
}

impl LinkTx for I2cLinkTx {
    async fn send(&mut self, packet: &Packet) -> Result<(), Error> {
        self.i2c.write(LINK_ADDRESS, packet).await.map_err(|e| {
            warn!("Link write failed: {}", Debug2Format(&e));
            Error::LinkWrite
        })
    }
}

/// Receives frames from the previous board.
pub struct I2cLinkRx {
    target: I2cSlave<'static, I2C1>,
}

impl I2cLinkRx {
    pub fn new(target: I2cSlave<'static, I2C1>) -> Self {
        Self { target }
    }
}

impl LinkRx for I2cLinkRx {
    async fn receive(&mut self) -> Result<Packet, Error> {
        let mut packet = Packet::default();
        loop {
            let command = self.target.listen(&mut packet).await.map_err(|e| {
                warn!("Link read failed: {}", Debug2Format(&e));
                Error::LinkRead
            })?;
            match command {
                Command::Write(FRAME_LEN) => return Ok(packet),
                // the previous board only ever writes; anything else is line noise
                Command::Read => {
                    let _ = self.target.respond_to_read(&[0; FRAME_LEN]).await;
                }
                other => debug!("Ignoring I2C transaction {}", Debug2Format(&other)),
            }
        }
    }
}
