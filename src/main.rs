use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;

use brt::cli::{Cli, Commands};
use brt::core::Config;

fn main() -> Result<()> {
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let global = &cli.global;
    match cli.command {
        Commands::Init(args) => brt::cli::commands::init::run(args, global),
        Commands::Batch(cmd) => brt::cli::commands::batch::run(cmd, global),
        Commands::Dev(cmd) => brt::cli::commands::dev::run(cmd, global),
        Commands::Bmr(cmd) => brt::cli::commands::bmr::run(cmd, global),
        Commands::Release(cmd) => brt::cli::commands::release::run(cmd, global),
        Commands::Audit(cmd) => brt::cli::commands::audit::run(cmd, global),
        Commands::Status(args) => brt::cli::commands::status::run(args, global),
        Commands::Completions(args) => brt::cli::commands::completions::run(args),
    }
}

/// Log to stderr; BRT_LOG wins, then --verbose, then the configured filter
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("BRT_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("brt=debug")
        } else {
            let config = Config::load().unwrap_or_default();
            EnvFilter::new(config.log_filter())
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
