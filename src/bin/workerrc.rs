// Copyright 2019 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::OsStr;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing::error;

use workerrc::config::{self, LaunchConfig};
use workerrc::logging;
use workerrc::{Error, Launcher, Outcome};

const LAUNCH: &str = "launch";
const PLAN: &str = "plan";

const CANDIDATE: &str = "candidate";
const DEFAULTS_FILE: &str = "defaults-file";
const LOG_DIR: &str = "log-dir";
const RUNTIME_DIR: &str = "runtime-dir";
const DAEMON_CONFIG: &str = "daemon-config";

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
    fn default_launch_opts(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }

    fn default_launch_opts(self) -> Self {
        self.arg(
            Arg::with_name(CANDIDATE)
                .long(CANDIDATE)
                .value_name("PATH")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("daemon executable to try, in order (replaces the built-in list)"),
        )
        .arg(path_arg(DEFAULTS_FILE, config::DEFAULTS_FILE, "optional defaults file"))
        .arg(path_arg(LOG_DIR, config::LOG_DIR, "log directory to create"))
        .arg(path_arg(
            RUNTIME_DIR,
            config::RUNTIME_DIR,
            "runtime directory to create, also used for the cache variables",
        ))
        .arg(path_arg(
            DAEMON_CONFIG,
            config::DAEMON_CONFIG,
            "configuration file passed to the daemon",
        ))
    }
}

fn path_arg<'a, 'b>(name: &'static str, default: &'static str, help: &'static str) -> Arg<'a, 'b> {
    Arg::with_name(name)
        .long(name)
        .value_name("PATH")
        .takes_value(true)
        .default_value(default)
        .help(help)
}

fn main() {
    let args = App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(AppSettings::VersionlessSubcommands)
        .default_launch_opts()
        .subcommand(
            SubCommand::with_name(LAUNCH)
                .about("start the daemon, replacing this process (default)")
                .default_launch_opts(),
        )
        .subcommand(
            SubCommand::with_name(PLAN)
                .about("print what would be launched without starting the daemon")
                .default_launch_opts(),
        )
        .get_matches();

    logging::setup_logger();

    let result = match args.subcommand() {
        (PLAN, Some(sub)) => plan(launcher_from(sub, &args)),
        (LAUNCH, Some(sub)) => launcher_from(sub, &args).run(),
        (_, _) => launcher_from(&args, &args).run(),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Options may be given before or after the subcommand, the subcommand's wins
fn explicit<'a, 'b>(
    name: &str,
    sub: &'a ArgMatches<'b>,
    top: &'a ArgMatches<'b>,
) -> &'a ArgMatches<'b> {
    if sub.occurrences_of(name) == 0 && top.occurrences_of(name) > 0 {
        top
    } else {
        sub
    }
}

fn launcher_from(sub: &ArgMatches<'_>, top: &ArgMatches<'_>) -> Launcher {
    let mut config = LaunchConfig::default();

    if let Some(candidates) = explicit(CANDIDATE, sub, top).values_of_os(CANDIDATE) {
        config = config.with_candidates(candidates);
    }
    if let Some(path) = explicit(DEFAULTS_FILE, sub, top).value_of_os(DEFAULTS_FILE) {
        config = config.with_defaults_file(path);
    }
    if let Some(path) = explicit(LOG_DIR, sub, top).value_of_os(LOG_DIR) {
        config = config.with_log_dir(path);
    }
    if let Some(path) = explicit(RUNTIME_DIR, sub, top).value_of_os(RUNTIME_DIR) {
        config = config.with_runtime_dir(path);
    }
    if let Some(path) = explicit(DAEMON_CONFIG, sub, top).value_of_os(DAEMON_CONFIG) {
        config = config.with_daemon_config(path);
    }

    Launcher::new(config)
}

fn plan(launcher: Launcher) -> Result<(), Error> {
    match launcher.prepare()? {
        Outcome::NotConfigured => println!("not configured: no daemon executable found"),
        Outcome::Disabled => println!(
            "disabled: START is not yes in {}",
            launcher.config().defaults_file().display()
        ),
        Outcome::Launch(invocation) => {
            println!(
                "launch: {}",
                invocation.preview(config::CACHE_VARS.iter().map(OsStr::new))
            );
            println!(
                "stop timeout: {}s",
                launcher.config().stop_timeout().as_secs()
            );
        }
    }

    Ok(())
}
