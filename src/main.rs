use clap::Parser;
use miette::Result;
use mft::cli::commands;
use mft::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
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
    let global = cli.global;
    mft::logging::init(global.quiet, global.verbose);

    match cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Config(cmd) => commands::config::run(cmd, &global),
        Commands::Session(cmd) => commands::session::run(cmd, &global),
        Commands::Fetch(args) => commands::fetch::run(args, &global),
        Commands::Trace(cmd) => commands::trace::run(cmd, &global),
        Commands::Capacity(cmd) => commands::capacity::run(cmd, &global),
        Commands::Schedule(cmd) => commands::schedule::run(cmd, &global),
        Commands::Form(cmd) => commands::form::run(cmd, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
