//! Chronograph CLI — event-sourced graph store.
//!
//! Usage:
//!   chronograph list [--db path]
//!   chronograph show <aggregate> [--after N] [--db path]
//!   chronograph verify <aggregate> [--db path]
//!   chronograph append <aggregate> --event-type T --data JSON [--expected-version N] [--db path]

use chronograph::{DistributedEventStore, EventPayload, EventStore, EventStoreConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "chronograph",
    version,
    about = "Content-addressed, event-sourced graph store"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true, default_value = "chronograph.db")]
    db: PathBuf,

    /// Log store activity to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all aggregates in the store
    List,
    /// Show the event history of an aggregate
    Show {
        /// Aggregate identifier
        aggregate: String,
        /// Only events with sequence greater than this
        #[arg(long)]
        after: Option<u64>,
    },
    /// Recompute every CID and check chain continuity
    Verify {
        /// Aggregate identifier
        aggregate: String,
    },
    /// Append an event to an aggregate
    Append {
        /// Aggregate identifier
        aggregate: String,
        /// Event type tag
        #[arg(long)]
        event_type: String,
        /// Event data as a JSON document
        #[arg(long)]
        data: String,
        /// Expected current version (defaults to the actual current version)
        #[arg(long)]
        expected_version: Option<u64>,
    },
}

async fn cmd_list(store: &DistributedEventStore) -> i32 {
    let aggregates = match store.list_aggregates().await {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if aggregates.is_empty() {
        println!("No aggregates stored.");
        return 0;
    }
    println!("{:<36}  {:>8}", "AGGREGATE", "VERSION");
    println!("{}", "-".repeat(46));
    for aggregate in aggregates {
        match store.current_version(&aggregate).await {
            Ok(version) => println!("{:<36}  {:>8}", aggregate, version),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    0
}

async fn cmd_show(store: &DistributedEventStore, aggregate: &str, after: Option<u64>) -> i32 {
    let envelopes = match after {
        Some(after) => store.load_from(aggregate, after).await,
        None => store.load(aggregate).await,
    };
    let envelopes = match envelopes {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if envelopes.is_empty() {
        println!("No events for aggregate '{}'.", aggregate);
        return 0;
    }
    for envelope in envelopes {
        println!(
            "seq {:>5}  {}  {}",
            envelope.sequence,
            envelope.timestamp.to_rfc3339(),
            envelope.event.payload.event_type
        );
        println!("           cid      {}", envelope.event.cid);
        match envelope.event.previous_cid {
            Some(previous) => println!("           previous {}", previous),
            None => println!("           previous (genesis)"),
        }
    }
    0
}

async fn cmd_verify(store: &DistributedEventStore, aggregate: &str) -> i32 {
    match store.verify_chain(aggregate).await {
        Ok(()) => {
            let version = store.current_version(aggregate).await.unwrap_or(0);
            println!("Chain verified for '{}' ({} events).", aggregate, version);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_append(
    store: &DistributedEventStore,
    aggregate: &str,
    event_type: &str,
    data: &str,
    expected_version: Option<u64>,
) -> i32 {
    let data: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: --data is not valid JSON: {}", e);
            return 1;
        }
    };
    let expected = match expected_version {
        Some(v) => v,
        None => match store.current_version(aggregate).await {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
    };
    match store
        .append(aggregate, expected, vec![EventPayload::new(event_type, data)])
        .await
    {
        Ok(envelopes) => {
            for envelope in envelopes {
                println!("Appended seq {} cid {}", envelope.sequence, envelope.cid());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let store = match DistributedEventStore::open(&cli.db, EventStoreConfig::default()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::List => cmd_list(&store).await,
        Commands::Show { aggregate, after } => cmd_show(&store, &aggregate, after).await,
        Commands::Verify { aggregate } => cmd_verify(&store, &aggregate).await,
        Commands::Append {
            aggregate,
            event_type,
            data,
            expected_version,
        } => cmd_append(&store, &aggregate, &event_type, &data, expected_version).await,
    };
    std::process::exit(code);
}
