// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// `RUST_LOG` if set, otherwise only warnings and errors
///
/// The quiet default keeps the absent and disabled exits silent.
pub fn default_env_filter() -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .parse_lossy("")
    }
}

/// Logs go to stderr, the daemon inherits stdout and stderr untouched
pub fn setup_logger() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(default_env_filter())
        .compact()
        .with_target(false)
        .init();
}
