use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sqlbind",
    about = "Run statements through pooled, per-worker database bindings",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to sqlbind.toml
    #[arg(short, long, global = true, default_value = "sqlbind.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one statement inside a request scope and print the rows as JSON.
    ///
    /// Writes are rolled back at the end of the request unless --commit is
    /// given.
    Query {
        /// Logical database name from [databases.<name>]
        #[arg(short, long, default_value = sqlbind::DEFAULT_NAME)]
        name: String,
        /// Commit before the request ends
        #[arg(long)]
        commit: bool,
        /// Statement with `?` placeholders
        statement: String,
        /// Positional parameters (integers, floats, NULL, or text)
        params: Vec<String>,
    },
    /// Validate the config file and list configured databases
    Check,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlbind=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            name,
            commit,
            statement,
            params,
        } => commands::query::run(&cli.config, &name, commit, &statement, &params),
        Commands::Check => commands::check::run(&cli.config),
    }
}
