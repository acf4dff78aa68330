//! withlockfile: serialize command execution across processes.
//!
//! `withlockfile <lockfile> <command> [args..]` takes an exclusive lock on
//! `<lockfile>`, waiting for other holders, runs the command to completion
//! inside a containment group, releases the lock and exits with the
//! command's status.

mod cli;
mod error;
mod exit_codes;
mod launcher;
mod locks;
mod logging;
mod run;

use cli::Cli;

fn main() {
    let cli = match Cli::parse_args() {
        Ok(cli) => cli,
        Err(code) => std::process::exit(code),
    };
    logging::init_logging(cli.log_level);

    let code = match run::run(&cli.into_request()) {
        Ok(status) => status,
        Err(err) => {
            eprintln!("error: {}", err);
            err.exit_code()
        }
    };

    // Not `ExitCode`: OS status codes do not fit in a u8 on every platform.
    // Every guard has been dropped inside `run` by now.
    std::process::exit(code);
}
