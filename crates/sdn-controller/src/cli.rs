// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Command-line surface, in the `clap::Parser` shape
//! `hdds-discovery-server/src/main.rs`'s `Args` uses.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sdn-controller")]
#[command(author, version, about = "OpenFlow 1.3 SDN controller daemon", long_about = None)]
pub struct Args {
    /// Controller configuration file (JSON).
    #[arg(long, default_value = "network-settings.json")]
    pub conf: PathBuf,

    /// Directory containing auxiliary tools invoked by the controller.
    #[arg(long)]
    pub tooldir: Option<PathBuf>,

    /// Directory containing editable runtime configuration fragments.
    #[arg(long)]
    pub etcdir: Option<PathBuf>,

    /// Directory flow-table and topology snapshots are dumped to on request.
    #[arg(long)]
    pub dumpdir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
