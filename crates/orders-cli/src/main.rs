mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand,
    order::{ActionArgs, ListArgs},
    ScheduleArgs,
};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "orders",
    about = "Standing orders: recurring automations with schedules and action pipelines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .orders/ or .git/)
    #[arg(long, global = true, env = "ORDERS_ROOT")]
    root: Option<PathBuf>,

    /// Owner the command acts for
    #[arg(long, global = true, env = "ORDERS_OWNER")]
    owner: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .orders/ in the current project
    Init,

    /// Create a standing order
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        actions: ActionArgs,
        /// Store the order without activating it
        #[arg(long)]
        inactive: bool,
    },

    /// List the owner's standing orders
    List {
        #[command(flatten)]
        args: ListArgs,
    },

    /// Show one standing order
    Show { id: Uuid },

    /// Change name, description, schedule, or actions
    Edit {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[command(flatten)]
        actions: ActionArgs,
    },

    /// Activate an inactive order or deactivate an active one
    Toggle { id: Uuid },

    /// Delete a standing order
    Delete { id: Uuid },

    /// Executor: mark an order as running
    Start {
        id: Uuid,
        /// RFC 3339 start time (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Executor: record the outcome of a run
    Record {
        id: Uuid,
        /// Record a failed run (default: success)
        #[arg(long)]
        failed: bool,
        /// RFC 3339 execution time (default: now)
        #[arg(long)]
        at: Option<String>,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
    },

    /// Executor: list orders due at a point in time
    Due {
        /// RFC 3339 time to check against (default: now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Show the run history of an order
    Runs { id: Uuid },

    /// Preview the next run of a schedule without storing anything
    NextRun {
        #[command(flatten)]
        schedule: ScheduleArgs,
        /// RFC 3339 reference time (default: now)
        #[arg(long)]
        from: Option<String>,
        /// Number of successive runs to show (1-1000)
        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..=1000)
        )]
        count: u16,
    },

    /// Inspect and validate .orders/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let owner = cli.owner.as_deref();
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Create {
            name,
            description,
            schedule,
            actions,
            inactive,
        } => cmd::order::create(
            &root,
            owner,
            cmd::order::CreateInput {
                name,
                description,
                schedule,
                actions,
                inactive,
            },
            json,
        ),
        Commands::List { args } => cmd::order::list(&root, owner, args, json),
        Commands::Show { id } => cmd::order::show(&root, owner, id, json),
        Commands::Edit {
            id,
            name,
            description,
            schedule,
            actions,
        } => cmd::order::edit(
            &root,
            owner,
            id,
            cmd::order::EditInput {
                name,
                description,
                schedule,
                actions,
            },
            json,
        ),
        Commands::Toggle { id } => cmd::order::toggle(&root, owner, id, json),
        Commands::Delete { id } => cmd::order::delete(&root, owner, id, json),
        Commands::Start { id, at } => cmd::executor::start(&root, id, at.as_deref(), json),
        Commands::Record {
            id,
            failed,
            at,
            duration_ms,
        } => cmd::executor::record(&root, id, !failed, at.as_deref(), duration_ms, json),
        Commands::Due { at } => cmd::executor::due(&root, at.as_deref(), json),
        Commands::Runs { id } => cmd::executor::runs(&root, owner, id, json),
        Commands::NextRun {
            schedule,
            from,
            count,
        } => cmd::next_run::run(schedule, from.as_deref(), count, json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
