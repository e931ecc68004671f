//! vela-hostwriter
//!
//! Post-build tool for Vela launchers:
//! - **bind**: embed an application path in a copy of the apphost template
//! - **bundle**: append application files to a bound apphost
//! - **inspect**: report binding and bundle state of an executable

mod commands;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use output::{resolve_color_choice, StyledOutput};

#[derive(Parser)]
#[command(name = "vela-hostwriter")]
#[command(about = "Bind and bundle Vela apphost executables", long_about = None)]
#[command(version)]
struct Cli {
    /// Colorize output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind a copy of the apphost template to an application
    Bind {
        /// Unbound apphost template
        template: PathBuf,
        /// Application binary, relative to the apphost's directory
        #[arg(short, long)]
        app: String,
        /// Output executable
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Append application files to a bound apphost
    Bundle {
        /// Bound apphost
        host: PathBuf,
        /// Directory the bundled paths are relative to
        #[arg(short, long)]
        source: PathBuf,
        /// Output executable
        #[arg(short, long)]
        output: PathBuf,
        /// Glob patterns selecting files under the source directory
        #[arg(default_value = "**/*")]
        patterns: Vec<String>,
    },

    /// Show the binding and bundle state of an executable
    Inspect {
        /// Executable to inspect
        executable: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Bind {
            template,
            app,
            output,
        } => commands::bind::execute(&mut out, &template, &app, &output),
        Commands::Bundle {
            host,
            source,
            output,
            patterns,
        } => commands::bundle::execute(&mut out, &host, &source, &output, &patterns),
        Commands::Inspect { executable } => commands::inspect::execute(&mut out, &executable),
    };

    out.flush();
    if let Err(e) = result {
        out.stderr_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
