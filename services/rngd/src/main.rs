// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Binary entrypoint: supervise the daemon until it exits.

use log::error;

use rngd::config::Config;

const USAGE: &str = "rngd [--user <account>]\n\n\
    Serve random bytes over the local RPC endpoints.\n\n\
      --user <account>   unprivileged account to drop to (default: nobody)\n\
      --help             show this text\n";

fn main() {
    env_logger::init();

    let mut config = Config::from_env();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user" => match args.next() {
                Some(user) => config.username = user,
                None => {
                    eprintln!("rngd: --user requires an argument");
                    std::process::exit(2);
                }
            },
            "--help" | "-h" => {
                print!("{USAGE}");
                return;
            }
            other => {
                eprintln!("rngd: unknown argument {other:?}");
                std::process::exit(2);
            }
        }
    }

    if let Err(err) = rngd::supervisor::init(&config) {
        error!("rngd: {err}");
        std::process::exit(1);
    }
}
