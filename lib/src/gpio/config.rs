// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{chip_path, Offset};
use crate::DigitalState;
use boardio_uapi::gpio::LineEdgeEventKind;
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The time the event watcher waits for an event before flushing any
/// buffered events.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(25);

/// The bias applied to an input line.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Pull {
    /// No bias is requested, so the line keeps whatever bias it has.
    #[default]
    Off,
    PullUp,
    PullDown,
}

/// The edges reported to listeners.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EdgeDetection {
    /// Transitions from low to high.
    RisingEdge,

    /// Transitions from high to low.
    FallingEdge,

    #[default]
    BothEdges,
}

impl EdgeDetection {
    /// True if events of the kind are reported.
    pub fn matches(&self, kind: LineEdgeEventKind) -> bool {
        match self {
            EdgeDetection::RisingEdge => kind == LineEdgeEventKind::RisingEdge,
            EdgeDetection::FallingEdge => kind == LineEdgeEventKind::FallingEdge,
            EdgeDetection::BothEdges => true,
        }
    }
}

/// How edge events are grouped before being delivered to listeners.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Batching {
    /// Deliver once at least this many events are buffered.
    ///
    /// A count of 1 delivers every event as soon as it is read.
    Count(usize),

    /// Deliver the buffered events once the period has elapsed since the
    /// last delivery.
    Period(Duration),
}

impl Default for Batching {
    fn default() -> Self {
        Batching::Count(1)
    }
}

/// The configuration of a [`DigitalInput`].
///
/// [`DigitalInput`]: super::DigitalInput
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct DigitalInputConfig {
    /// The id the device is registered under.
    pub id: String,

    /// The number of the GPIO chip, as in `/dev/gpiochip<N>`.
    pub chip: u32,

    pub offset: Offset,

    pub pull: Pull,

    /// The debounce period applied by the kernel.
    ///
    /// None or a zero value means no debounce.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub debounce: Option<Duration>,

    pub batching: Batching,

    /// The time the watcher waits for events when batching by count.
    pub poll_timeout: Duration,

    pub edges: EdgeDetection,
}

impl DigitalInputConfig {
    pub fn new<S: Into<String>>(id: S, chip: u32, offset: Offset) -> Self {
        DigitalInputConfig {
            id: id.into(),
            chip,
            offset,
            pull: Pull::default(),
            debounce: None,
            batching: Batching::default(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            edges: EdgeDetection::default(),
        }
    }

    pub fn with_pull(mut self, pull: Pull) -> Self {
        self.pull = pull;
        self
    }

    pub fn with_debounce(mut self, period: Duration) -> Self {
        self.debounce = Some(period);
        self
    }

    pub fn with_batching(mut self, batching: Batching) -> Self {
        self.batching = batching;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_edges(mut self, edges: EdgeDetection) -> Self {
        self.edges = edges;
        self
    }

    pub fn chip_path(&self) -> PathBuf {
        chip_path(self.chip)
    }

    /// The debounce period in microseconds, if non-zero.
    pub(crate) fn debounce_us(&self) -> Option<u32> {
        self.debounce
            .map(|d| u32::try_from(d.as_micros()).unwrap_or(u32::MAX))
            .filter(|us| *us > 0)
    }

    /// The time the watcher waits in each poll.
    pub(crate) fn watch_timeout(&self) -> Duration {
        match self.batching {
            Batching::Period(period) => period,
            Batching::Count(_) => self.poll_timeout,
        }
    }
}

/// The configuration of a [`DigitalOutput`].
///
/// [`DigitalOutput`]: super::DigitalOutput
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct DigitalOutputConfig {
    pub id: String,

    pub chip: u32,

    pub offset: Offset,

    /// The state the line is driven to when requested.
    ///
    /// If None the kernel picks, typically low.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub initial: Option<DigitalState>,

    /// The state the line is driven to before it is released.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub shutdown: Option<DigitalState>,
}

impl DigitalOutputConfig {
    pub fn new<S: Into<String>>(id: S, chip: u32, offset: Offset) -> Self {
        DigitalOutputConfig {
            id: id.into(),
            chip,
            offset,
            initial: None,
            shutdown: None,
        }
    }

    pub fn with_initial_state(mut self, state: DigitalState) -> Self {
        self.initial = Some(state);
        self
    }

    pub fn with_shutdown_state(mut self, state: DigitalState) -> Self {
        self.shutdown = Some(state);
        self
    }

    pub fn chip_path(&self) -> PathBuf {
        chip_path(self.chip)
    }
}
