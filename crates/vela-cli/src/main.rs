//! `vela`: the generic muxer
//!
//! Runs the application named on the command line with the runtime that
//! lives next to this executable. Refuses to run under any other name.

use vela_host::{host_main, LauncherMode};

fn main() {
    std::process::exit(host_main(LauncherMode::Muxer));
}
