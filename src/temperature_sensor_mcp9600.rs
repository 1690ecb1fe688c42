use crate::log::*;
use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_time::{with_timeout, Duration, Ticker};
use embedded_hal_async::i2c::I2c;

use crate::fault_arbiter::SensorReading;
use crate::mcp9600::{Error, Mcp9600, MCP9600_I2C_BASE_ADDR};
use crate::resources_rp2040::I2c0Bus;
use crate::SENSOR_READINGS;

const SAMPLE_PERIOD: Duration = Duration::from_millis(100);
const READ_TIMEOUT: Duration = Duration::from_millis(50);
/// The second amplifier has all address straps set.
const SECOND_ADDR: u8 = MCP9600_I2C_BASE_ADDR + 7;

async fn read_channel<I2C: I2c>(sensor: &mut Mcp9600<I2C>) -> Result<SensorReading, Error<I2C::Error>> {
    let status = sensor.read_status().await?;
    let hot = sensor.read_hot_c().await?;
    let cold = sensor.read_cold_c().await?;
    Ok(SensorReading::new(hot, cold, status.thermocouple_fault()))
}

#[embassy_executor::task]
pub async fn run_temperature_sensor(i2c_bus: &'static I2c0Bus) -> ! {
    let mut sensors = [
        Mcp9600::new(I2cDevice::new(i2c_bus), MCP9600_I2C_BASE_ADDR),
        Mcp9600::new(I2cDevice::new(i2c_bus), SECOND_ADDR),
    ];

    info!("Starting temperature sensor task");
    for (channel, sensor) in sensors.iter_mut().enumerate() {
        if let Err(e) = sensor.init().await {
            error!("Thermocouple {} init failed: {}", channel + 1, Debug2Format(&e));
        }
    }

    let sender = SENSOR_READINGS.sender();
    let mut ticker = Ticker::every(SAMPLE_PERIOD);
    loop {
        let mut readings = [SensorReading::default(); 2];
        for (channel, sensor) in sensors.iter_mut().enumerate() {
            // A failed read is reported as the all-zero "no reply" reading.
            match with_timeout(READ_TIMEOUT, read_channel(sensor)).await {
                Ok(Ok(reading)) => readings[channel] = reading,
                Ok(Err(e)) => trace!("Thermocouple {} read failed: {}", channel + 1, Debug2Format(&e)),
                Err(_) => trace!("Thermocouple {} read timed out", channel + 1),
            }
        }
        sender.send(readings);
        ticker.next().await;
    }
}
