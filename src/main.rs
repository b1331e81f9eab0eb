//! Strata CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Versioned architecture diagrams over a shared entity pool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Workspace root holding the entity file and views (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty entity pool
    Init {
        /// Title of the architecture
        #[arg(long)]
        title: Option<String>,
    },
    /// Manage views
    View {
        #[command(subcommand)]
        command: ViewCommand,
    },
    /// Print the current snapshot of a view as JSON
    Render { view: String },
    /// Manage a view's snapshot timeline
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },
    /// Show what changed between two snapshots
    Diff {
        view: String,
        from: String,
        /// Defaults to the current snapshot
        to: Option<String>,
    },
    /// Check the entity pool and views for broken references
    Validate {
        /// Only check this view
        view: Option<String>,
    },
    /// Manage global nodes
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },
    /// Start the canvas server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7890")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum ViewCommand {
    /// Create a view with one empty snapshot
    Create {
        id: String,
        #[arg(long)]
        title: String,
        /// context, container, component, deployment, landscape or freeform
        #[arg(long = "type", default_value = "context")]
        diagram_type: String,
    },
    /// List views
    List,
}

#[derive(Subcommand)]
enum SnapshotCommand {
    List {
        view: String,
    },
    /// Copy the current snapshot and switch to the copy
    Create {
        view: String,
        label: String,
        #[arg(long)]
        description: Option<String>,
        /// Free-form point in time, e.g. "2027 Q1"
        #[arg(long)]
        timestamp: Option<String>,
    },
    Switch {
        view: String,
        snapshot: String,
    },
    Rename {
        view: String,
        snapshot: String,
        label: String,
    },
    Delete {
        view: String,
        snapshot: String,
    },
    /// Set the timeline order; every snapshot id exactly once
    Reorder {
        view: String,
        #[arg(required = true)]
        order: Vec<String>,
    },
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Place a node on a view, creating the global node if needed
    Add {
        view: String,
        label: String,
        #[arg(long = "type", default_value = "system")]
        kind: String,
        #[arg(long)]
        technology: Option<String>,
        #[arg(long, default_value = "0")]
        x: f64,
        #[arg(long, default_value = "0")]
        y: f64,
    },
    /// Remove a node from the pool and from every view and snapshot
    Delete {
        node: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("strata={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Workspace root: {}", cli.root.display());

    let root = cli.root;
    match cli.command {
        Commands::Init { title } => commands::init(&root, title).await,
        Commands::View { command } => match command {
            ViewCommand::Create {
                id,
                title,
                diagram_type,
            } => commands::create_view(&root, &id, &title, &diagram_type).await,
            ViewCommand::List => commands::list_views(&root).await,
        },
        Commands::Render { view } => commands::render(&root, &view).await,
        Commands::Snapshot { command } => match command {
            SnapshotCommand::List { view } => commands::list_snapshots(&root, &view).await,
            SnapshotCommand::Create {
                view,
                label,
                description,
                timestamp,
            } => {
                commands::create_snapshot(&root, &view, &label, description, timestamp).await
            }
            SnapshotCommand::Switch { view, snapshot } => {
                commands::switch_snapshot(&root, &view, &snapshot).await
            }
            SnapshotCommand::Rename {
                view,
                snapshot,
                label,
            } => commands::rename_snapshot(&root, &view, &snapshot, &label).await,
            SnapshotCommand::Delete { view, snapshot } => {
                commands::delete_snapshot(&root, &view, &snapshot).await
            }
            SnapshotCommand::Reorder { view, order } => {
                commands::reorder_snapshots(&root, &view, order).await
            }
        },
        Commands::Diff { view, from, to } => commands::diff(&root, &view, &from, to).await,
        Commands::Validate { view } => commands::validate(&root, view).await,
        Commands::Node { command } => match command {
            NodeCommand::Add {
                view,
                label,
                kind,
                technology,
                x,
                y,
            } => commands::add_node(&root, &view, &label, &kind, technology, x, y).await,
            NodeCommand::Delete { node, yes } => commands::delete_node(&root, &node, yes).await,
        },
        Commands::Serve { port, host } => commands::serve(&root, host, port).await,
        Commands::Version => {
            println!("Strata v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
