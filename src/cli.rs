//! Command-line interface implementation for pdfbaker.
//! Provides argument parsing and help text formatting using clap.

use clap::{error::ErrorKind, Args as ClapArgs, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use crate::baker::BakerOptions;
use crate::logger::Verbosity;
use crate::scaffold::ScaffoldOptions;

/// Command-line arguments structure for pdfbaker.
#[derive(Parser, Debug)]
#[command(author, version, about = "pdfbaker: create PDF documents from YAML-configured SVG templates", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the documents of a main configuration file
    Bake(BakeArgs),

    /// Create a new project from an existing SVG
    Create(CreateArgs),
}

#[derive(ClapArgs, Debug)]
pub struct BakeArgs {
    /// Main configuration file
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: PathBuf,

    /// Documents to build (all when omitted)
    #[arg(value_name = "DOCUMENTS")]
    pub documents: Vec<String>,

    /// Show errors only
    #[arg(short, long, conflicts_with_all = ["verbose", "trace"])]
    pub quiet: bool,

    /// Show debug information
    #[arg(short, long, conflicts_with = "trace")]
    pub verbose: bool,

    /// Show trace information (even more detailed than --verbose)
    #[arg(short, long)]
    pub trace: bool,

    /// Keep the build directory afterwards
    #[arg(long)]
    pub keep_build: bool,

    /// Debug mode, implies --verbose and --keep-build
    #[arg(long)]
    pub debug: bool,

    /// Render everything but do not write any file
    #[arg(long)]
    pub dry_run: bool,

    /// Fail instead of overwriting an existing PDF
    #[arg(long)]
    pub fail_if_exists: bool,

    /// Stop at the first document that fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Number of pages to build in parallel
    #[arg(short, long, value_name = "N", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: u16,
}

impl BakeArgs {
    pub fn verbosity(&self) -> Verbosity {
        if self.trace {
            Verbosity::Trace
        } else if self.verbose || self.debug {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    pub fn options(&self) -> BakerOptions {
        BakerOptions {
            keep_build: self.keep_build || self.debug,
            dry_run: self.dry_run,
            fail_if_exists: self.fail_if_exists,
            fail_fast: self.fail_fast,
            jobs: usize::from(self.jobs),
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct CreateArgs {
    /// SVG file to build the project around
    #[arg(value_name = "SVG")]
    pub svg: PathBuf,

    /// Directory where the project will be created
    #[arg(value_name = "PROJECT_DIR")]
    pub project_dir: PathBuf,

    /// Document name (defaults to the SVG file name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Write into an existing directory without asking
    #[arg(short, long)]
    pub force: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

impl CreateArgs {
    pub fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    pub fn options(&self) -> ScaffoldOptions {
        ScaffoldOptions { name: self.name.clone(), force: self.force }
    }
}

/// Parses command line arguments and returns the Args structure.
///
/// # Returns
/// * `Args` - Parsed command line arguments
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if matches!(
                e.kind(),
                ErrorKind::MissingRequiredArgument
                    | ErrorKind::MissingSubcommand
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
