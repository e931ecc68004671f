//! `vela-apphost`: the apphost template
//!
//! `vela-hostwriter bind` copies this executable and embeds the path of
//! one application in it. An unpatched copy exits with
//! `AppHostExeNotBoundFailure`.

use vela_host::{host_main, LauncherMode};

fn main() {
    std::process::exit(host_main(LauncherMode::BoundApp));
}
