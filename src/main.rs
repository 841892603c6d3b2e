use clap::Parser;

use querydoc::cli::commands::{self, index::IndexOptions};
use querydoc::cli::{Cli, Commands};
use querydoc::config::Settings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    });

    querydoc::logging::init_with_config(&settings.logging);

    if let Err(e) = settings.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    let result = match &cli.command {
        Commands::Init { force } => commands::init::run_init(*force),
        Commands::Config => commands::init::run_config(&settings),
        Commands::Index {
            input,
            force,
            timeout,
            threads,
            no_progress,
        } => commands::index::run(
            &settings,
            input,
            IndexOptions {
                force: *force,
                timeout: *timeout,
                threads: *threads,
                progress: !no_progress,
            },
        ),
        Commands::Search(args) => commands::query::run_search(&settings, args),
        Commands::Ask(args) => commands::query::run_ask(&settings, args).await,
        Commands::Serve(args) => commands::serve::run(&settings, args).await,
        Commands::List { json } => commands::library::run_list(&settings, *json),
        Commands::Delete { document } => commands::library::run_delete(&settings, document),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
