// SPDX-FileCopyrightText: 2024 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::common;
use anyhow::{Context as _, Result};
use boardio::gpio::{chips, Chip};
use boardio::Context;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(aliases(["c", "detect"]))]
pub struct Opts {
    /// The chips to report
    ///
    /// If none specified then all chips are returned.
    ///
    /// Chips may be identified by number, name, or path.
    /// e.g. the following all select the same chip:
    ///     0
    ///     gpiochip0
    ///     /dev/gpiochip0
    #[arg(name = "chip", verbatim_doc_comment)]
    chips: Vec<String>,

    #[arg(from_global)]
    pub verbose: bool,
}

pub fn cmd(opts: &Opts) -> Result<bool> {
    let ctx = Context::linux();
    let mut success = true;
    let paths: Vec<PathBuf> = if opts.chips.is_empty() {
        chips().context("unable to find any chips")?
    } else {
        let mut paths = Vec::new();
        for id in &opts.chips {
            match common::chip_number(id) {
                Ok(n) => paths.push(boardio::gpio::chip_path(n)),
                Err(e) => {
                    common::emit_error(opts.verbose, &e);
                    success = false;
                }
            }
        }
        paths
    };
    for p in paths {
        match Chip::from_path(&ctx, &p).and_then(|c| c.info()) {
            Ok(ci) => println!("{} [{}] ({} lines)", ci.name, ci.label, ci.num_lines),
            Err(e) if opts.verbose => {
                eprintln!("unable to open '{}': {:#}", p.display(), e);
                success = false;
            }
            Err(_) => {
                eprintln!("unable to open '{}'", p.display());
                success = false;
            }
        }
    }
    Ok(success)
}
