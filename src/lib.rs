#![cfg_attr(not(test), no_std)]

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, ReadReady, Write};
use log::{debug, warn};

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod command;
pub use command::*;

mod frame;
pub use frame::*;

#[cfg(test)]
mod test_support;

/// Represents an SDS011 air quality sensor.
///
/// Every operation takes `&mut self`: the protocol has no request id, so only one command
/// may be outstanding at a time.
///
/// # Type Parameters
///
/// * `Serial`: The serial interface used to communicate with the sensor. It must implement
///   `embedded_io_async::Read`, `embedded_io_async::Write` and `embedded_io_async::ReadReady`.
/// * `Delay`: Waits between two polls of the serial interface while awaiting a reply.
pub struct Sds011<Serial, Delay> {
    serial: Serial,
    delay: Delay,
    config: Config,
    // Survives between requests so a frame split across reads, or read together with
    // the reply to an earlier command, is not lost.
    decoder: Decoder,
    rx: [u8; 2 * REPLY_FRAME_LEN],
    rx_start: usize,
    rx_end: usize,
}

impl<S, D> Sds011<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    /// Creates a new `Sds011` sensor instance.
    ///
    /// # Arguments
    ///
    /// * `serial`: The serial interface for communication with the sensor.
    /// * `delay`: The delay used between polls while awaiting a reply.
    /// * `config`: The initial configuration for the sensor.
    pub fn new(serial: S, delay: D, config: Config) -> Self {
        Self {
            serial,
            delay,
            config,
            decoder: Decoder::new(),
            rx: [0; 2 * REPLY_FRAME_LEN],
            rx_start: 0,
            rx_end: 0,
        }
    }

    /// Current driver state: the addressed device id and the last known reporting mode.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gives back the serial interface and the delay.
    pub fn release(self) -> (S, D) {
        (self.serial, self.delay)
    }

    /// Initializes the SDS011 sensor according to the provided configuration.
    ///
    /// This involves:
    /// - Flushing the serial buffer.
    /// - Setting the reporting mode (Active or Passive).
    /// - If Passive mode, putting the sensor to sleep initially.
    /// - If Active mode, setting the working period to continuous.
    pub async fn init(&mut self) -> Result<(), Error> {
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?;

        let mode = self.config.mode;
        self.set_reporting_mode(mode).await.map_err(|e| {
            log::error!(
                "Failed to set reporting mode to {:?} during init: {:?}",
                mode,
                e
            );
            e
        })?;

        if mode == DeviceMode::Passive {
            self.set_operational_state(OperationalState::Sleeping)
                .await
                .map_err(|e| {
                    log::error!(
                        "Failed to set state to sleep during init (Passive Mode): {:?}",
                        e
                    );
                    e
                })?;
        } else {
            self.set_working_period(0).await.map_err(|e| {
                log::error!(
                    "Failed to set working period to continuous during init (Active Mode): {:?}",
                    e
                );
                e
            })?;
        }

        debug!("SDS011 init sequence complete.");
        Ok(())
    }

    /// Reads a single data sample from the SDS011 sensor.
    ///
    /// In Passive mode the sensor is woken up, queried, then put back to sleep.
    /// In Active mode this is the same as [`Sds011::query_measurement`].
    pub async fn read_sample(&mut self) -> Result<Measurement, Error> {
        if self.config.mode == DeviceMode::Passive {
            debug!("Waking up sensor (Passive Mode)");
            self.set_operational_state(OperationalState::Working)
                .await
                .map_err(|e| {
                    log::error!("Failed to wake up sensor: {:?}", e);
                    e
                })?;
        }

        let data = self.query_measurement().await.map_err(|e| {
            log::error!("Failed to query sensor data: {:?}", e);
            e
        })?;

        if self.config.mode == DeviceMode::Passive {
            debug!("Putting sensor back to sleep (Passive Mode)");
            self.set_operational_state(OperationalState::Sleeping)
                .await
                .map_err(|e| {
                    log::error!("Failed to put sensor to sleep: {:?}", e);
                    e
                })?;
        }
        Ok(data)
    }

    /// Reads one measurement.
    ///
    /// In Passive mode a query data command is sent and its data report awaited. In Active
    /// mode nothing is sent: the next report the sensor emits on its own is returned.
    pub async fn query_measurement(&mut self) -> Result<Measurement, Error> {
        let frame = match self.config.mode {
            DeviceMode::Passive => {
                debug!("Querying sensor data (CMD 0x04)");
                self.exchange(Command::QueryData).await?
            }
            DeviceMode::Active => {
                debug!("Waiting for the next data report (Active Mode)");
                let target = self.config.id;
                self.await_frame(|frame| {
                    frame.kind == FrameKind::Measurement
                        && (target.is_broadcast() || frame.device_id() == target)
                })
                .await?
            }
        };
        let data = frame.measurement().ok_or(Error::UnexpectedFrame)?;
        debug!(
            "Processed frame - PM2.5: {}, PM10: {}",
            data.pm2_5, data.pm10
        );
        Ok(data)
    }

    /// Sends `command` and waits for the reply answering it.
    ///
    /// `target` defaults to the tracked device id. Frames that do not answer the command,
    /// such as data reports emitted in Active mode, are dropped while waiting.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(frame))` with the matching reply.
    /// * `Ok(None)` when a wake-up command went unanswered, which a sleeping sensor may do.
    /// * `Err(Error)` when the poll budget runs out or the serial interface fails.
    pub async fn request(
        &mut self,
        command: Command,
        target: Option<DeviceID>,
    ) -> Result<Option<InboundFrame>, Error> {
        let target = target.unwrap_or(self.config.id);
        self.write(&command.encode(target)).await?;

        let reply = self
            .await_frame(|frame| answers(&command, target, frame))
            .await;
        match reply {
            Ok(frame) => Ok(Some(frame)),
            Err(e @ (Error::Timeout | Error::UnexpectedFrame))
                if command.may_go_unanswered() =>
            {
                debug!("No reply to {:?} ({:?}), treating as acknowledged", command, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Sets the sensor's reporting mode (Active or Passive).
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the sensor echoed the requested mode. The tracked mode is updated.
    /// * `Err(Error::Rejected)` if the sensor echoed anything else.
    pub async fn set_reporting_mode(&mut self, mode: DeviceMode) -> Result<(), Error> {
        debug!("Setting reporting mode to: {:?}", mode);
        let frame = self
            .exchange(Command::ReportingMode(Setting::Set(mode)))
            .await?;
        match frame.reply()? {
            Reply::ReportingMode {
                set: true,
                mode: echoed,
                ..
            } if echoed == mode => {
                self.config.mode = mode;
                debug!("Reporting mode set to {:?}", mode);
                Ok(())
            }
            _ => {
                log::error!(
                    "Failed to set reporting mode, unexpected reply: {:02X?}",
                    frame.to_bytes()
                );
                Err(Error::Rejected)
            }
        }
    }

    /// Queries the sensor's current reporting mode. The tracked mode is updated.
    pub async fn get_reporting_mode(&mut self) -> Result<DeviceMode, Error> {
        debug!("Querying reporting mode (CMD 0x02, Query)");
        let frame = self.exchange(Command::ReportingMode(Setting::Query)).await?;
        match frame.reply()? {
            Reply::ReportingMode {
                set: false, mode, ..
            } => {
                self.config.mode = mode;
                debug!("Queried reporting mode: {:?}", mode);
                Ok(mode)
            }
            _ => Err(unexpected_reply("get_reporting_mode", &frame)),
        }
    }

    /// Sets the sensor's operational state (Sleeping or Working).
    ///
    /// Waking a sleeping sensor may not be acknowledged; that is reported as success.
    pub async fn set_operational_state(&mut self, state: OperationalState) -> Result<(), Error> {
        debug!("Setting operational state to: {:?}", state);
        let command = Command::WorkState(Setting::Set(state));
        let Some(frame) = self.request(command, None).await? else {
            return Ok(());
        };
        match frame.reply()? {
            Reply::WorkState {
                set: true,
                state: echoed,
                ..
            } if echoed == state => {
                debug!("Operational state set to {:?}", state);
                Ok(())
            }
            _ => {
                log::error!(
                    "Failed to set operational state, unexpected reply: {:02X?}",
                    frame.to_bytes()
                );
                Err(Error::Rejected)
            }
        }
    }

    /// Queries the sensor's current operational state.
    pub async fn get_operational_state(&mut self) -> Result<OperationalState, Error> {
        debug!("Querying operational state (CMD 0x06, Query)");
        let frame = self.exchange(Command::WorkState(Setting::Query)).await?;
        match frame.reply()? {
            Reply::WorkState {
                set: false, state, ..
            } => {
                debug!("Queried operational state: {:?}", state);
                Ok(state)
            }
            _ => Err(unexpected_reply("get_operational_state", &frame)),
        }
    }

    /// Sets the sensor's working period.
    ///
    /// - A value of `0` sets the sensor to continuous working mode.
    /// - Values from `1` to `30` make the sensor work for 30 seconds, then sleep for the rest
    ///   of the `period` minutes, reporting data once per period.
    ///
    /// # Returns
    ///
    /// * `Err(Error::InvalidArg)` if `period` is greater than 30. Nothing is sent.
    /// * `Err(Error::Rejected)` if the sensor echoed a different period.
    pub async fn set_working_period(&mut self, period: u8) -> Result<(), Error> {
        if period > MAX_WORKING_PERIOD {
            log::error!("Working period {} out of range (0-30)", period);
            return Err(Error::InvalidArg);
        }
        debug!("Setting working period to: {} minutes", period);
        let frame = self
            .exchange(Command::WorkingPeriod(Setting::Set(period)))
            .await?;
        match frame.reply()? {
            Reply::WorkingPeriod {
                set: true, minutes, ..
            } if minutes == period => {
                debug!("Working period set to {}", period);
                Ok(())
            }
            _ => {
                log::error!(
                    "Failed to set working period, unexpected reply: {:02X?}",
                    frame.to_bytes()
                );
                Err(Error::Rejected)
            }
        }
    }

    /// Queries the sensor's current working period, in minutes (0 = continuous).
    pub async fn get_working_period(&mut self) -> Result<u8, Error> {
        debug!("Querying working period (CMD 0x08, Query)");
        let frame = self.exchange(Command::WorkingPeriod(Setting::Query)).await?;
        match frame.reply()? {
            Reply::WorkingPeriod {
                set: false, minutes, ..
            } => {
                debug!("Queried working period: {} minutes", minutes);
                Ok(minutes)
            }
            _ => Err(unexpected_reply("get_working_period", &frame)),
        }
    }

    /// Sets the device ID of the sensor currently addressed.
    ///
    /// The new id is adopted locally only when the command was addressed to a specific
    /// sensor. A broadcast id change may have reached several sensors, so the driver keeps
    /// addressing them by broadcast.
    pub async fn set_device_id(&mut self, new_id: DeviceID) -> Result<(), Error> {
        debug!("Setting device ID to: {:02X}{:02X}", new_id.id1, new_id.id2);
        let previous = self.config.id;
        let frame = self.exchange(Command::SetDeviceId(new_id)).await?;
        match frame.reply()? {
            Reply::DeviceId { id } if id == new_id => {
                if previous.is_broadcast() {
                    debug!("Device ID changed through broadcast, keeping broadcast addressing");
                } else {
                    self.config.id = new_id;
                    debug!(
                        "Device ID updated locally to {:02X}{:02X}",
                        new_id.id1, new_id.id2
                    );
                }
                Ok(())
            }
            _ => {
                log::error!(
                    "Failed to set device ID, unexpected reply: {:02X?}",
                    frame.to_bytes()
                );
                Err(Error::Rejected)
            }
        }
    }

    /// Reads the id of the addressed sensor from a firmware version reply.
    ///
    /// Useful to discover the id of a single sensor while addressing it by broadcast.
    /// The tracked id is left unchanged.
    pub async fn get_device_id(&mut self) -> Result<DeviceID, Error> {
        let frame = self.exchange(Command::FirmwareVersion).await?;
        match frame.reply()? {
            Reply::Firmware { id, .. } => {
                debug!("Queried device ID: {:02X}{:02X}", id.id1, id.id2);
                Ok(id)
            }
            _ => Err(unexpected_reply("get_device_id", &frame)),
        }
    }

    /// Retrieves the firmware version of the sensor as a build date.
    pub async fn get_firmware(&mut self) -> Result<FirmwareVersion, Error> {
        debug!("Getting firmware version (CMD 0x07)");
        let frame = self.exchange(Command::FirmwareVersion).await?;
        match frame.reply()? {
            Reply::Firmware { version, .. } => {
                debug!(
                    "Firmware version: 20{:02}-{:02}-{:02}",
                    version.year, version.month, version.day
                );
                Ok(version)
            }
            _ => Err(unexpected_reply("get_firmware", &frame)),
        }
    }

    // Sends a command to the tracked id for which a reply is mandatory.
    async fn exchange(&mut self, command: Command) -> Result<InboundFrame, Error> {
        self.request(command, None).await?.ok_or(Error::Timeout)
    }

    // Writes a 19-byte command frame to the serial port.
    async fn write(&mut self, command: &[u8; COMMAND_FRAME_LEN]) -> Result<(), Error> {
        debug!("Executing command: {:02X?}", command);
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?;
        self.serial
            .write_all(command)
            .await
            .map_err(|_| Error::WriteFailure)?;
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?;
        Ok(())
    }

    // Polls the serial port until a frame accepted by `matches` is decoded or the poll
    // budget runs out. Bytes left over from the previous read are decoded first; each poll
    // then either reads what is pending or waits one poll interval.
    async fn await_frame<F>(&mut self, matches: F) -> Result<InboundFrame, Error>
    where
        F: Fn(&InboundFrame) -> bool,
    {
        let mut unexpected = false;
        let mut discarded = None;
        let mut polls = 0;

        loop {
            while self.rx_start < self.rx_end {
                let byte = self.rx[self.rx_start];
                self.rx_start += 1;
                match self.decoder.push(byte) {
                    Decoded::Pending => {}
                    Decoded::Frame(frame) if matches(&frame) => {
                        debug!("Successfully read and validated frame: {:02X?}", frame.to_bytes());
                        return Ok(frame);
                    }
                    Decoded::Frame(frame) => {
                        warn!("Discarding unrelated frame: {:02X?}", frame.to_bytes());
                        unexpected = true;
                    }
                    Decoded::Discarded(reason) => discarded = Some(reason),
                }
            }

            if polls == self.config.max_polls {
                break;
            }
            polls += 1;

            let ready = self.serial.read_ready().map_err(|_| Error::ReadFailure)?;
            if !ready {
                self.delay.delay_ms(self.config.poll_interval_ms).await;
                continue;
            }

            let bytes_read = self.serial.read(&mut self.rx).await.map_err(|e| {
                debug!("Serial read error: {:?}", e);
                Error::ReadFailure
            })?;
            self.rx_start = 0;
            self.rx_end = bytes_read;
        }

        let err = if unexpected {
            Error::UnexpectedFrame
        } else {
            discarded.unwrap_or(Error::Timeout)
        };
        debug!(
            "No matching frame after {} polls: {:?}",
            self.config.max_polls, err
        );
        Err(err)
    }
}

// Whether `frame` is the reply to `command` sent to `target`.
fn answers(command: &Command, target: DeviceID, frame: &InboundFrame) -> bool {
    let same_kind = match command {
        Command::QueryData => frame.kind == FrameKind::Measurement,
        _ => frame.echoed_command() == Some(command.code()),
    };
    // A get must not take the echo of an earlier set of the same setting, nor the reverse.
    let same_action = command
        .action()
        .map_or(true, |action| frame.payload[1] == action);
    // A device id reply carries the new id, not the one the command was addressed to.
    let from_target = target.is_broadcast()
        || matches!(command, Command::SetDeviceId(_))
        || frame.device_id() == target;
    same_kind && same_action && from_target
}

fn unexpected_reply(operation: &str, frame: &InboundFrame) -> Error {
    warn!(
        "{}: Unexpected reply structure: {:02X?}",
        operation,
        frame.to_bytes()
    );
    Error::UnexpectedFrame
}
