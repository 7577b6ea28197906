//! pdfbaker's main application entry point.
//! Parses the command line, sets up logging and runs the requested command.

use pdfbaker::{
    baker::Baker,
    cli::{get_args, Args, BakeArgs, Commands, CreateArgs},
    error::{default_error_handler, Result},
    logger::init_logger,
    prompt::DialoguerPrompter,
    scaffold::create_from,
};

/// Main application entry point.
fn main() {
    let args = get_args();
    let verbosity = match &args.command {
        Commands::Bake(bake) => bake.verbosity(),
        Commands::Create(create) => create.verbosity(),
    };
    init_logger(verbosity);

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => default_error_handler(err),
    }
}

/// Runs the command.
///
/// # Returns
/// * `Result<bool>` - Whether every document was built
fn run(args: Args) -> Result<bool> {
    match args.command {
        Commands::Bake(bake) => run_bake(bake),
        Commands::Create(create) => run_create(create),
    }
}

fn run_bake(args: BakeArgs) -> Result<bool> {
    let baker = Baker::new(&args.config_file, args.options())?;
    let report = baker.bake(&args.documents)?;
    Ok(report.success())
}

fn run_create(args: CreateArgs) -> Result<bool> {
    let prompt = DialoguerPrompter::new();
    let scaffold = create_from(&args.svg, &args.project_dir, &args.options(), &prompt)?;
    for file in &scaffold.files {
        println!("Created: '{}'", file.display());
    }
    println!("Bake it with: pdfbaker bake {}", scaffold.main_config.display());
    Ok(true)
}
