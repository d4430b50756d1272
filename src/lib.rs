// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Launcher for the worker daemon

pub mod config;
pub mod defaults;
pub mod dirs;
mod error;
pub mod exec;
pub mod launcher;
pub mod locate;
pub mod logging;

pub use config::LaunchConfig;
pub use error::{Error, ErrorKind};
pub use launcher::{Launcher, Outcome};
