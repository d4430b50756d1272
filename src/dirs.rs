// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::ErrorKind;
use crate::Error;

/// Creates each directory and any missing parents, existing directories are left alone.
pub fn ensure_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<(), Error> {
    for dir in dirs {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| ErrorKind::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        debug!("ensured directory: {}", dir.display());
    }

    Ok(())
}
