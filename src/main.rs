//! daisyc - DAISY compiler CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser as ClapParser, Subcommand};
use tracing_subscriber::EnvFilter;

use daisy::driver::{compile_project, BuildOptions};
use daisy::{parser, pretty, DaisyError, SourceFile, LANGUAGE_NAME, VERSION};

#[derive(ClapParser, Debug)]
#[command(name = "daisyc")]
#[command(version = VERSION)]
#[command(about = "The DAISY compiler", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Verbose phase logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile one file and its imports to C11 under build/
    Build {
        input: PathBuf,

        /// Output directory for build artifacts
        #[arg(long, default_value = "build")]
        build_dir: PathBuf,

        /// Write <module>.ir.txt next to the emitted C
        #[arg(long)]
        emit_ir: bool,

        /// Write per-phase timings to build/profile.json
        #[arg(long)]
        profile: bool,

        /// Emit runtime bounds/null/socket guards
        #[arg(long)]
        rt_checks: bool,

        /// Opt in to link-time optimization (recorded for the link step)
        #[arg(long)]
        lto: bool,

        /// Sanitizer for the link step (e.g. address)
        #[arg(long)]
        sanitize: Option<String>,
    },

    /// Run the front and middle end without emitting artifacts
    Check { input: PathBuf },

    /// Print the canonical English-surface form of a source file
    Fmt { input: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter = if args.verbose { "daisy=debug" } else { "daisy=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Commands::Build { input, build_dir, emit_ir, profile, rt_checks, lto, sanitize } => {
            let options =
                BuildOptions { build_dir, emit_ir, profile, rt_checks, lto, sanitize };
            compile_project(&input, &options).map(|outcome| {
                for path in &outcome.c_paths {
                    println!("{}", path.display());
                }
            })
        }
        Commands::Check { input } => {
            let options = BuildOptions {
                build_dir: std::env::temp_dir().join("daisy-check"),
                ..Default::default()
            };
            compile_project(&input, &options).map(|_| {
                println!("ok");
            })
        }
        Commands::Fmt { input } => fmt_file(&input),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{LANGUAGE_NAME}: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn fmt_file(input: &PathBuf) -> Result<(), DaisyError> {
    let source = SourceFile::read(0, input)?;
    let module = parser::parse(&source)?;
    print!("{}", pretty::print_module(&module));
    Ok(())
}
