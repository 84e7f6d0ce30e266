//! Key distance sensing on the RP2040's ADC (GPIO 26, 27 and 28).

use defmt::*;
use embassy_rp::adc::{Adc, Async, Channel};
use pico_piano_lib::{application::Sensor, configuration::CHANNELS_PER_NODE, error::Error};

pub struct AdcSensor {
    adc: Adc<'static, Async>,
    channels: [Channel<'static>; CHANNELS_PER_NODE],
}

impl AdcSensor {
    pub fn new(adc: Adc<'static, Async>, channels: [Channel<'static>; CHANNELS_PER_NODE]) -> Self {
        Self { adc, channels }
    }
}

impl Sensor<CHANNELS_PER_NODE> for AdcSensor {
    async fn sample(&mut self) -> Result<[u16; CHANNELS_PER_NODE], Error> {
        let mut readings = [0; CHANNELS_PER_NODE];
        for (reading, channel) in readings.iter_mut().zip(self.channels.iter_mut()) {
            *reading = self.adc.read(channel).await.map_err(|e| {
                error!("ADC read failed: {}", Debug2Format(&e));
                Error::Sampling
            })?;
        }
        Ok(readings)
    }
}
