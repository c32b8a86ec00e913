//! taskbridge CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use taskbridge::cli::commands;
use taskbridge::cli::commands::tasks::AddArgs;
use taskbridge::cli::{Cli, Commands, Context};
use taskbridge::config::EnvSnapshot;
use taskbridge::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,reqwest=info,hyper_util=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let ctx = Context {
        config: cli.config.clone(),
        cwd: std::env::current_dir()?,
        env: EnvSnapshot::capture(),
        json,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::List { status, dirty } => commands::tasks::list(&ctx, *status, *dirty),
        Commands::Show { id } => commands::tasks::show(&ctx, id),
        Commands::Add {
            title,
            id,
            description,
            priority,
            owner,
            tags,
        } => commands::tasks::add(
            &ctx,
            &AddArgs {
                title,
                id: id.as_deref(),
                description: description.as_deref(),
                priority: priority.as_deref(),
                owner: owner.as_deref(),
                tags,
            },
        ),
        Commands::NewId { length, attempts } => commands::tasks::new_id(&ctx, *length, *attempts),
        Commands::Doc { command } => commands::doc::execute(&ctx, command),
        Commands::Export { out } => commands::export::execute(&ctx, out.as_ref()),
        Commands::Sync {
            direction,
            conflict,
            yes,
        } => commands::sync::execute(&ctx, direction, *conflict, *yes),
    }
}
