// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;
use std::ffi::{CString, OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::unistd::execve;
use tracing::info;

use crate::error::ErrorKind;
use crate::Error;

/// A complete description of the process that will replace this one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
}

impl Invocation {
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            program,
            args,
            env: BTreeMap::new(),
        }
    }

    /// Sets a variable, replacing any earlier value
    pub fn env<K: Into<OsString>, V: Into<OsString>>(&mut self, key: K, value: V) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        for (k, v) in vars {
            self.env(k, v);
        }
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_env(&self, key: &str) -> Option<&OsStr> {
        self.env.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    /// A printable form of this invocation, limited to the named variables
    pub fn preview<'a, I>(&'a self, vars: I) -> Preview<'a>
    where
        I: IntoIterator<Item = &'a OsStr>,
    {
        Preview {
            invocation: self,
            shown: vars.into_iter().collect(),
        }
    }

    /// Replaces the current process with the daemon
    ///
    /// This only returns if the daemon could not be executed, the returned error describes why.
    pub fn exec(self) -> Error {
        match self.try_exec() {
            Ok(never) => match never {},
            Err(e) => e,
        }
    }

    fn try_exec(self) -> Result<std::convert::Infallible, Error> {
        let program = cstring(self.program.as_os_str())?;

        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(program.clone());
        for arg in &self.args {
            argv.push(cstring(arg)?);
        }

        let mut envp = Vec::with_capacity(self.env.len());
        for (k, v) in &self.env {
            let mut pair = k.clone();
            pair.push("=");
            pair.push(v);
            envp.push(cstring(&pair)?);
        }

        info!("executing: {}", self.program.display());
        execve(&program, &argv[..], &envp[..]).map_err(|source| {
            ErrorKind::Exec {
                program: self.program.clone(),
                source,
            }
            .into()
        })
    }
}

fn cstring(s: &OsStr) -> Result<CString, Error> {
    Ok(CString::new(s.as_bytes())?)
}

/// Renders as `VAR=value ... program args`, only variables the launcher set are shown
pub struct Preview<'a> {
    invocation: &'a Invocation,
    shown: Vec<&'a OsStr>,
}

impl<'a> fmt::Display for Preview<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for key in &self.shown {
            if let Some(value) = self.invocation.env.get(*key) {
                write!(
                    f,
                    "{}={} ",
                    key.to_string_lossy(),
                    value.to_string_lossy()
                )?;
            }
        }

        write!(f, "{}", self.invocation.program.display())?;
        for arg in &self.invocation.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> Invocation {
        let mut inv = Invocation::new(
            PathBuf::from("/usr/bin/grr_server"),
            vec![OsString::from("--start_worker")],
        );
        inv.env("PATH", "/usr/bin").env("MPLCONFIGDIR", "/var/run/grr");
        inv
    }

    #[test]
    fn test_later_env_replaces_earlier() {
        let mut inv = invocation();
        inv.envs(vec![("PATH", "/bin"), ("EXTRA", "1")]);

        assert_eq!(inv.get_env("PATH"), Some(OsStr::new("/bin")));
        assert_eq!(inv.get_env("EXTRA"), Some(OsStr::new("1")));
    }

    #[test]
    fn test_preview_shows_selected_vars() {
        let inv = invocation();
        let preview = inv.preview(vec![OsStr::new("MPLCONFIGDIR"), OsStr::new("UNSET")]);

        assert_eq!(
            preview.to_string(),
            "MPLCONFIGDIR=/var/run/grr /usr/bin/grr_server --start_worker"
        );
    }

    #[test]
    fn test_nul_in_argument_is_reported() {
        let inv = Invocation::new(
            PathBuf::from("/bin/true"),
            vec![OsString::from("bad\0arg")],
        );

        match inv.exec().kind() {
            ErrorKind::NulError(_) => (),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let inv = Invocation::new(dir.path().join("gone"), vec![]);

        match inv.exec().kind() {
            ErrorKind::Exec { source, .. } => assert_eq!(*source, nix::errno::Errno::ENOENT),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
