// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::line::{self, consumer_label};
use super::watcher::{Listeners, WatchSettings, Watcher};
use super::{DigitalInputConfig, ListenerId, StateChange, WatcherStatus};
use crate::permission::Interface;
use crate::{Context, Device, DeviceKind, DigitalState, Error, Result, UapiCall};
use boardio_uapi::FileDescriptor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// The time shutdown waits for the event watcher to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// A GPIO line requested as an input.
///
/// Changes in the line state are delivered to listeners by a watcher
/// thread, which is started when the first listener is added.
#[derive(Debug)]
pub struct DigitalInput {
    config: DigitalInputConfig,
    chip: PathBuf,
    // taken on shutdown
    lf: Mutex<Option<Arc<FileDescriptor>>>,
    listeners: Arc<Listeners>,
    watcher: Mutex<Option<Watcher>>,
}

impl DigitalInput {
    /// Request the line described by the config.
    pub fn initialize(ctx: &Context, config: DigitalInputConfig) -> Result<DigitalInput> {
        let chip = config.chip_path();
        ctx.check_access(&chip, Interface::Gpio)?;
        let lc = line::input_config(config.pull, config.debounce_us());
        let lf = line::acquire(ctx, &chip, config.offset, &consumer_label(&config.id), lc)?;
        tracing::info!(
            id = %config.id,
            chip = %chip.display(),
            offset = config.offset,
            pull = ?config.pull,
            debounce_us = config.debounce_us(),
            "digital input initialized"
        );
        Ok(DigitalInput {
            config,
            chip,
            lf: Mutex::new(Some(Arc::new(lf))),
            listeners: Arc::default(),
            watcher: Mutex::default(),
        })
    }

    pub fn config(&self) -> &DigitalInputConfig {
        &self.config
    }

    pub fn chip(&self) -> &Path {
        &self.chip
    }

    /// The current state of the line.
    pub fn state(&self) -> Result<DigitalState> {
        line::read_value(&*self.line()?)
    }

    /// Add a function to be called with each change in the line state.
    ///
    /// The first listener starts the event watcher.
    pub fn add_listener<F>(&self, f: F) -> Result<ListenerId>
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let lf = self.line()?;
        let mut watcher = self.lock_watcher();
        let id = self.listeners.add(f);
        if watcher.is_none() {
            let settings = WatchSettings {
                edges: self.config.edges,
                batching: self.config.batching,
                timeout: self.config.watch_timeout(),
            };
            match Watcher::spawn(
                &self.config.id,
                lf,
                settings,
                self.listeners.clone(),
            ) {
                Ok(w) => *watcher = Some(w),
                Err(e) => {
                    self.listeners.remove(id);
                    return Err(e);
                }
            }
        }
        Ok(id)
    }

    /// Remove a listener.
    ///
    /// Returns false if the listener was not found.
    /// The watcher keeps running until the input is shut down.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn watcher_status(&self) -> WatcherStatus {
        self.lock_watcher()
            .as_ref()
            .map(Watcher::status)
            .unwrap_or_default()
    }

    fn line(&self) -> Result<Arc<FileDescriptor>> {
        self.lf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Closed(self.config.id.clone()))
    }

    fn lock_watcher(&self) -> std::sync::MutexGuard<'_, Option<Watcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Device for DigitalInput {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::DigitalInput
    }

    fn shutdown(&self, ctx: &Context) -> Result<()> {
        ctx.registry().unregister(self.id());
        let lf = self
            .lf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Closed(self.config.id.clone()))?;
        if let Some(w) = self.lock_watcher().as_mut() {
            w.join(SHUTDOWN_GRACE);
        }
        // the line may still be in use by the watcher or a concurrent read
        let res = match Arc::try_unwrap(lf) {
            Ok(lf) => lf.close().map_err(|e| Error::from_uapi(UapiCall::Close, e)),
            Err(_) => {
                tracing::debug!(id = %self.config.id, "line released by its last user");
                Ok(())
            }
        };
        tracing::info!(id = %self.config.id, "digital input shut down");
        res
    }
}

impl Drop for DigitalInput {
    fn drop(&mut self) {
        let watcher = self.watcher.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(w) = watcher.as_mut() {
            w.join(SHUTDOWN_GRACE);
        }
    }
}
