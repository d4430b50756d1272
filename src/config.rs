// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The fixed description of the worker service and the means to override it

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executables tried in order, the first that is executable is launched
pub const DAEMON_CANDIDATES: &[&str] = &["/usr/bin/grr_server", "/usr/local/bin/grr_server"];
pub const DEFAULTS_FILE: &str = "/etc/default/grr-worker";
pub const LOG_DIR: &str = "/var/log/grr";
pub const RUNTIME_DIR: &str = "/var/run/grr/tmp/worker";
pub const DAEMON_CONFIG: &str = "/etc/grr/grr-server.yaml";

pub const START_WORKER_FLAG: &str = "--start_worker";
pub const STRICT_CONFIG_FLAG: &str = "--disallow_missing_config_definitions";
pub const CONFIG_FLAG: &str = "--config";

/// Variables always pointed at the runtime directory before the daemon starts
pub const CACHE_VARS: &[&str] = &["PYTHON_EGG_CACHE", "MPLCONFIGDIR"];

/// Grace period the supervisor should allow between the stop signal and a forced kill
pub const STOP_TIMEOUT: Duration = Duration::from_secs(300);

/// Everything the launcher needs to know, passed explicitly through each step.
///
/// `LaunchConfig::default()` is the built-in worker descriptor, the `with_*` methods
/// allow each of the fixed paths to be relocated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    candidates: Vec<PathBuf>,
    defaults_file: PathBuf,
    log_dir: PathBuf,
    runtime_dir: PathBuf,
    daemon_config: PathBuf,
    stop_timeout: Duration,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            candidates: DAEMON_CANDIDATES.iter().map(PathBuf::from).collect(),
            defaults_file: PathBuf::from(DEFAULTS_FILE),
            log_dir: PathBuf::from(LOG_DIR),
            runtime_dir: PathBuf::from(RUNTIME_DIR),
            daemon_config: PathBuf::from(DAEMON_CONFIG),
            stop_timeout: STOP_TIMEOUT,
        }
    }
}

impl LaunchConfig {
    /// Replaces the candidate list, order is preserved
    pub fn with_candidates<I, P>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_defaults_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.defaults_file = path.into();
        self
    }

    pub fn with_log_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_dir = path.into();
        self
    }

    /// The cache variables follow the runtime directory
    pub fn with_runtime_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.runtime_dir = path.into();
        self
    }

    pub fn with_daemon_config<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.daemon_config = path.into();
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn defaults_file(&self) -> &Path {
        &self.defaults_file
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Directories that must exist before the daemon is started
    pub fn runtime_dirs(&self) -> Vec<&Path> {
        vec![self.log_dir.as_path(), self.runtime_dir.as_path()]
    }

    /// The complete argument list handed to the daemon, excluding argv[0]
    pub fn daemon_args(&self) -> Vec<OsString> {
        let mut config = OsString::from(CONFIG_FLAG);
        config.push("=");
        config.push(&self.daemon_config);

        vec![
            OsString::from(START_WORKER_FLAG),
            OsString::from(STRICT_CONFIG_FLAG),
            config,
        ]
    }

    /// Cache hints set for the daemon regardless of the defaults file
    pub fn cache_env(&self) -> Vec<(OsString, OsString)> {
        CACHE_VARS
            .iter()
            .map(|var| (OsString::from(var), self.runtime_dir.clone().into_os_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptor() {
        let config = LaunchConfig::default();

        assert_eq!(
            config.candidates(),
            &[
                PathBuf::from("/usr/bin/grr_server"),
                PathBuf::from("/usr/local/bin/grr_server")
            ]
        );
        assert_eq!(config.defaults_file(), Path::new("/etc/default/grr-worker"));
        assert_eq!(
            config.runtime_dirs(),
            vec![Path::new("/var/log/grr"), Path::new("/var/run/grr/tmp/worker")]
        );
        assert_eq!(
            config.daemon_args(),
            vec![
                OsString::from("--start_worker"),
                OsString::from("--disallow_missing_config_definitions"),
                OsString::from("--config=/etc/grr/grr-server.yaml"),
            ]
        );
        assert_eq!(config.stop_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_cache_env_follows_runtime_dir() {
        let config = LaunchConfig::default().with_runtime_dir("/tmp/scratch");

        assert_eq!(
            config.cache_env(),
            vec![
                (OsString::from("PYTHON_EGG_CACHE"), OsString::from("/tmp/scratch")),
                (OsString::from("MPLCONFIGDIR"), OsString::from("/tmp/scratch")),
            ]
        );
    }

    #[test]
    fn test_daemon_config_override() {
        let config = LaunchConfig::default().with_daemon_config("/opt/worker.yaml");

        assert_eq!(
            config.daemon_args().last(),
            Some(&OsString::from("--config=/opt/worker.yaml"))
        );
    }
}
