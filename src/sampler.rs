//! Sensor acquisition loop

use crate::logger::DataLogger;
use crate::record::Record;
use crate::signals::ShutdownSignal;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

/// Raw reading as the power monitor reports it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub micro_amps: i32,
    pub milli_volts: i32,
}

impl SensorReading {
    /// Convert to a record: current in milliamps, voltage in millivolts.
    pub fn into_record(self, timestamp: i64) -> Record {
        Record::new(timestamp, self.micro_amps as f32 / 1000.0, self.milli_volts as f32)
    }
}

pub trait Sensor: Send + 'static {
    fn read(&mut self) -> SensorReading;
}

/// Random walk around a nominal load, for hosts without the hardware
pub struct SimulatedSensor {
    micro_amps: i32,
    milli_volts: i32,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self {
            micro_amps: 1_500,
            milli_volts: 220_000,
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for SimulatedSensor {
    fn read(&mut self) -> SensorReading {
        let mut rng = rand::thread_rng();
        self.micro_amps = (self.micro_amps + rng.gen_range(-50..=50)).clamp(0, 20_000);
        self.milli_volts = (self.milli_volts + rng.gen_range(-200..=200)).clamp(200_000, 240_000);
        SensorReading {
            micro_amps: self.micro_amps,
            milli_volts: self.milli_volts,
        }
    }
}

/// Sample `sensor` every `interval` until shutdown.
pub async fn run_sampler<S: Sensor>(
    mut sensor: S,
    logger: Arc<DataLogger>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<ShutdownSignal>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(interval_ms = interval.as_millis() as u64, "Sampler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let record = sensor.read().into_record(chrono::Utc::now().timestamp());
                tracing::trace!(
                    timestamp = record.timestamp,
                    a = record.measurement_a,
                    b = record.measurement_b,
                    "Sample"
                );
                logger.observe(record);
            }
            _ = shutdown.recv() => {
                tracing::info!("Sampler stopping");
                break;
            }
        }
    }
}
