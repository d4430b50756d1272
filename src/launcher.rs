// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsString;

use tracing::debug;

use crate::config::LaunchConfig;
use crate::defaults::{Overlay, StartDecision};
use crate::dirs::ensure_dirs;
use crate::exec::Invocation;
use crate::locate::select_daemon;
use crate::Error;

/// The result of deciding whether to start the daemon
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// None of the candidate executables exist
    NotConfigured,
    /// The defaults file turned the daemon off
    Disabled,
    /// Ready to replace this process
    Launch(Invocation),
}

/// Launch the worker daemon
///
/// Rules:
/// - create the log and runtime directories, even if nothing is launched
/// - a missing daemon or `START` other than `yes` is a clean exit, not an error
/// - the daemon replaces this process, nothing is supervised
#[derive(Debug)]
pub struct Launcher {
    config: LaunchConfig,
    inherited: Vec<(OsString, OsString)>,
}

impl Launcher {
    /// The daemon will inherit a snapshot of this process' environment
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            inherited: std::env::vars_os().collect(),
        }
    }

    /// Use `vars` as the base environment instead of this process' environment
    pub fn with_inherited_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.inherited = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Runs every step up to, but not including, replacing the process
    ///
    /// Every assignment in the defaults file reaches the daemon's environment, `START` and
    ///   variables the file never `export`s included. References in the file see earlier
    ///   assignments before the inherited environment. The cache variables are applied last.
    pub fn prepare(&self) -> Result<Outcome, Error> {
        ensure_dirs(&self.config.runtime_dirs())?;

        let daemon = match select_daemon(self.config.candidates()) {
            Some(daemon) => daemon,
            None => {
                debug!("no daemon executable found, nothing to launch");
                return Ok(Outcome::NotConfigured);
            }
        };

        let overlay = Overlay::load(self.config.defaults_file(), &self.inherited)?;
        if !StartDecision::from_overlay(overlay.as_ref()).should_start() {
            debug!(
                "daemon disabled by {}",
                self.config.defaults_file().display()
            );
            return Ok(Outcome::Disabled);
        }

        let mut invocation = Invocation::new(daemon, self.config.daemon_args());
        invocation.envs(self.inherited.iter().cloned());
        if let Some(overlay) = &overlay {
            invocation.envs(overlay.iter());
        }
        invocation.envs(self.config.cache_env());

        Ok(Outcome::Launch(invocation))
    }

    /// Replaces this process with the daemon
    ///
    /// Only returns when the daemon is absent or disabled, or on failure.
    pub fn run(self) -> Result<(), Error> {
        match self.prepare()? {
            Outcome::NotConfigured | Outcome::Disabled => Ok(()),
            Outcome::Launch(invocation) => Err(invocation.exec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.root.path().join(name)
        }

        fn daemon(&self, name: &str) -> PathBuf {
            let path = self.path(name);
            fs::write(&path, b"#!/bin/sh\nexit 0\n").unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn defaults(&self, contents: &str) {
            fs::write(self.path("defaults"), contents).unwrap();
        }

        fn launcher(&self, candidates: &[PathBuf]) -> Launcher {
            let config = LaunchConfig::default()
                .with_candidates(candidates.to_vec())
                .with_defaults_file(self.path("defaults"))
                .with_log_dir(self.path("log/grr"))
                .with_runtime_dir(self.path("run/grr/tmp/worker"))
                .with_daemon_config(self.path("grr-server.yaml"));

            Launcher::new(config).with_inherited_env(vec![
                ("PATH", "/usr/bin:/bin"),
                ("MPLCONFIGDIR", "/somewhere/else"),
            ])
        }

        fn launch(&self, candidates: &[PathBuf]) -> Invocation {
            match self.launcher(candidates).prepare().unwrap() {
                Outcome::Launch(invocation) => invocation,
                other => panic!("expected launch: {:?}", other),
            }
        }
    }

    #[test]
    fn test_not_configured_still_creates_dirs() {
        let fixture = Fixture::new();
        let outcome = fixture
            .launcher(&[fixture.path("missing")])
            .prepare()
            .unwrap();

        assert_eq!(outcome, Outcome::NotConfigured);
        assert!(fixture.path("log/grr").is_dir());
        assert!(fixture.path("run/grr/tmp/worker").is_dir());
    }

    #[test]
    fn test_not_configured_ignores_defaults_file() {
        let fixture = Fixture::new();
        fixture.defaults("this is not an assignment\n");

        let outcome = fixture.launcher(&[]).prepare().unwrap();
        assert_eq!(outcome, Outcome::NotConfigured);
    }

    #[test]
    fn test_no_defaults_file_launches_with_fixed_flags() {
        let fixture = Fixture::new();
        let daemon = fixture.daemon("grr_server");

        let invocation = fixture.launch(&[daemon.clone()]);
        let config = format!("--config={}", fixture.path("grr-server.yaml").display());

        assert_eq!(invocation.program(), daemon.as_path());
        assert_eq!(
            invocation.args(),
            &[
                OsString::from("--start_worker"),
                OsString::from("--disallow_missing_config_definitions"),
                OsString::from(config),
            ]
        );
    }

    #[test]
    fn test_start_no_disables() {
        let fixture = Fixture::new();
        let daemon = fixture.daemon("grr_server");
        fixture.defaults("START=no\n");

        let outcome = fixture.launcher(&[daemon]).prepare().unwrap();
        assert_eq!(outcome, Outcome::Disabled);
    }

    #[test]
    fn test_disabled_run_is_ok() {
        let fixture = Fixture::new();
        let daemon = fixture.daemon("grr_server");
        fixture.defaults("START=no\n");

        fixture.launcher(&[daemon]).run().unwrap();
        fixture.launcher(&[fixture.path("missing")]).run().unwrap();
    }

    #[test]
    fn test_environment_layering() {
        let fixture = Fixture::new();
        let daemon = fixture.daemon("grr_server");
        fixture.defaults("START=yes\nPATH=/opt/grr/bin\nPYTHON_EGG_CACHE=/ignored\nWORKERS=8\n");

        let invocation = fixture.launch(&[daemon]);
        let runtime = fixture.path("run/grr/tmp/worker");

        assert_eq!(invocation.get_env("PATH"), Some(OsStr::new("/opt/grr/bin")));
        assert_eq!(invocation.get_env("WORKERS"), Some(OsStr::new("8")));
        assert_eq!(invocation.get_env("START"), Some(OsStr::new("yes")));
        assert_eq!(
            invocation.get_env("PYTHON_EGG_CACHE").map(Path::new),
            Some(runtime.as_path())
        );
        assert_eq!(
            invocation.get_env("MPLCONFIGDIR").map(Path::new),
            Some(runtime.as_path())
        );
    }

    #[test]
    fn test_file_reference_shadows_inherited_env() {
        let fixture = Fixture::new();
        let daemon = fixture.daemon("grr_server");
        fixture.defaults("GATE=yes\nSTART=$GATE\nEXTRA_PATH=$PATH:/opt/grr\n");

        let launcher = fixture
            .launcher(&[daemon])
            .with_inherited_env(vec![("GATE", "no"), ("PATH", "/usr/bin:/bin")]);
        let invocation = match launcher.prepare().unwrap() {
            Outcome::Launch(invocation) => invocation,
            other => panic!("expected launch: {:?}", other),
        };

        assert_eq!(invocation.get_env("START"), Some(OsStr::new("yes")));
        assert_eq!(
            invocation.get_env("EXTRA_PATH"),
            Some(OsStr::new("/usr/bin:/bin:/opt/grr"))
        );
    }

    #[test]
    fn test_first_candidate_preferred() {
        let fixture = Fixture::new();
        let first = fixture.daemon("first");
        let second = fixture.daemon("second");

        let invocation = fixture.launch(&[first.clone(), second]);
        assert_eq!(invocation.program(), first.as_path());
    }

    #[test]
    fn test_prepare_twice_is_idempotent() {
        let fixture = Fixture::new();
        let daemon = fixture.daemon("grr_server");
        let launcher = fixture.launcher(&[daemon]);

        assert!(launcher.prepare().is_ok());
        assert!(launcher.prepare().is_ok());
    }
}
