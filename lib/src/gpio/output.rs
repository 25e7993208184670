// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::line::{self, consumer_label};
use super::DigitalOutputConfig;
use crate::permission::Interface;
use crate::{Context, Device, DeviceKind, DigitalState, Error, Result, UapiCall};
use boardio_uapi::FileDescriptor;
use std::path::{Path, PathBuf};

/// A GPIO line requested as an output.
#[derive(Debug)]
pub struct DigitalOutput {
    config: DigitalOutputConfig,
    chip: PathBuf,
    lf: FileDescriptor,
}

impl DigitalOutput {
    /// Request the line described by the config.
    ///
    /// The line is driven to the initial state, if any, as it is requested.
    pub fn initialize(ctx: &Context, config: DigitalOutputConfig) -> Result<DigitalOutput> {
        let chip = config.chip_path();
        ctx.check_access(&chip, Interface::Gpio)?;
        let lc = line::output_config(config.initial);
        let lf = line::acquire(ctx, &chip, config.offset, &consumer_label(&config.id), lc)?;
        tracing::info!(
            id = %config.id,
            chip = %chip.display(),
            offset = config.offset,
            initial = ?config.initial,
            "digital output initialized"
        );
        Ok(DigitalOutput { config, chip, lf })
    }

    pub fn config(&self) -> &DigitalOutputConfig {
        &self.config
    }

    pub fn chip(&self) -> &Path {
        &self.chip
    }

    /// The state the line is being driven to.
    pub fn state(&self) -> Result<DigitalState> {
        self.ensure_open()?;
        line::read_value(&self.lf)
    }

    pub fn set_state(&self, state: DigitalState) -> Result<()> {
        self.ensure_open()?;
        line::write_value(&self.lf, state)?;
        tracing::trace!(id = %self.config.id, %state, "set");
        Ok(())
    }

    pub fn high(&self) -> Result<()> {
        self.set_state(DigitalState::High)
    }

    pub fn low(&self) -> Result<()> {
        self.set_state(DigitalState::Low)
    }

    /// Invert the state of the line, returning the new state.
    pub fn toggle(&self) -> Result<DigitalState> {
        let state = self.state()?.not();
        self.set_state(state)?;
        Ok(state)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lf.is_closed() {
            return Err(Error::Closed(self.config.id.clone()));
        }
        Ok(())
    }
}

impl Device for DigitalOutput {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::DigitalOutput
    }

    /// Drive the line to the shutdown state, if any, and release it.
    fn shutdown(&self, ctx: &Context) -> Result<()> {
        ctx.registry().unregister(self.id());
        self.ensure_open()?;
        if let Some(state) = self.config.shutdown {
            if let Err(e) = line::write_value(&self.lf, state) {
                tracing::warn!(id = %self.config.id, error = %e, "setting shutdown state failed");
            }
        }
        self.lf
            .close()
            .map_err(|e| Error::from_uapi(UapiCall::Close, e))?;
        tracing::info!(id = %self.config.id, "digital output shut down");
        Ok(())
    }
}
