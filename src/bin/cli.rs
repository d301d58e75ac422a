use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tracing::info;
use tracing_subscriber::EnvFilter;

use replicheck::{
    ChecksumOptions, ClusterChecker, ClusterReport, MockCluster, SnapshotTimestamp,
};

/// Drives the verification suite against an in-process simulated cluster.
/// Real deployments plug their transport in through the `ClusterTransport`
/// trait and reuse the same checks.
#[derive(Parser)]
#[command(name = "replicheck")]
#[command(about = "Consistency and checksum verification for tablet-based storage clusters")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Number of simulated tablet servers
    #[arg(long, default_value = "3")]
    tablet_servers: usize,

    /// Replication factor of the simulated table
    #[arg(long, default_value = "3")]
    replication: usize,

    /// Range split points of the simulated table
    #[arg(long, value_delimiter = ',', default_value = "33,66")]
    split_points: Vec<u64>,

    /// Rows written to the simulated table before checking
    #[arg(long, default_value = "100")]
    rows: u64,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check master and tablet server liveness
    Health,

    /// Check replication factor and leadership of every tablet
    Consistency,

    /// Verify replica data agreement via distributed checksums
    Checksum {
        /// Aggregate deadline for the whole pass, in milliseconds
        #[arg(long, default_value = "30000")]
        timeout_ms: u64,

        /// Maximum simultaneously outstanding scans
        #[arg(long, default_value = "16")]
        scan_concurrency: usize,

        /// Pin all scans to one logical snapshot timestamp
        #[arg(long)]
        snapshot: bool,

        /// Explicit snapshot timestamp (defaults to the master's current
        /// timestamp at dispatch time)
        #[arg(long, requires = "snapshot")]
        snapshot_timestamp: Option<u64>,

        /// Restrict verification to these tables
        #[arg(long)]
        table: Vec<String>,

        /// Restrict verification to these tablet ids
        #[arg(long)]
        tablet: Vec<String>,

        /// Diverge one replica before checking, to demonstrate detection
        #[arg(long)]
        corrupt: bool,
    },

    /// Run the full suite: health, consistency and checksum
    Full {
        /// Stop this many tablet servers before checking
        #[arg(long, default_value = "0")]
        stop_servers: usize,

        /// Diverge one replica before checking
        #[arg(long)]
        corrupt: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct ReportRow {
    check: String,
    status: String,
    message: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("replicheck=debug,info")
    } else {
        EnvFilter::new("replicheck=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(passed) => {
            if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{} {}", "✗ Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn build_cluster(cli: &Cli) -> (Arc<MockCluster>, Vec<String>) {
    let cluster = MockCluster::new(cli.tablet_servers);
    let tablets = cluster.create_table("demo", cli.replication, &cli.split_points);
    for key in 0..cli.rows {
        let _ = cluster.insert_row("demo", key, key as i64 * 7);
    }
    info!(
        tablet_servers = cli.tablet_servers,
        tablets = tablets.len(),
        rows = cli.rows,
        "simulated cluster ready"
    );
    (Arc::new(cluster), tablets)
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let (cluster, tablets) = build_cluster(&cli);
    let mut checker = ClusterChecker::new(cluster.clone());

    match &cli.command {
        Commands::Health => {
            checker.fetch_table_and_tablet_info().await?;
            checker.check_master_running()?;
            checker.check_tablet_servers_running()?;
            println!("{}", "✓ master and all tablet servers running".green());
            Ok(true)
        }

        Commands::Consistency => {
            checker.fetch_table_and_tablet_info().await?;
            checker.check_tables_consistency()?;
            println!("{}", "✓ all tables consistent".green());
            Ok(true)
        }

        Commands::Checksum {
            timeout_ms,
            scan_concurrency,
            snapshot,
            snapshot_timestamp,
            table,
            tablet,
            corrupt,
        } => {
            if *corrupt {
                if let Some(victim) = cluster.corrupt_replica(&tablets[0]) {
                    info!(tablet = %tablets[0], server = %victim, "corrupted one replica");
                }
            }
            let options = ChecksumOptions::new(
                Duration::from_millis(*timeout_ms),
                *scan_concurrency,
                *snapshot,
                match snapshot_timestamp {
                    Some(ts) => SnapshotTimestamp::At(*ts),
                    None => SnapshotTimestamp::Current,
                },
            );
            checker.fetch_table_and_tablet_info().await?;
            let report = checker.checksum_data(table, tablet, &options).await?;
            println!(
                "{} {} tablet(s) verified, all replicas match",
                "✓".green(),
                report.tablets.len()
            );
            Ok(true)
        }

        Commands::Full { stop_servers, corrupt } => {
            for uuid in cluster.tablet_server_uuids().iter().take(*stop_servers) {
                cluster.stop_tablet_server(uuid);
            }
            if *corrupt {
                cluster.corrupt_replica(&tablets[0]);
            }
            let report = checker.run_all(&ChecksumOptions::default()).await?;
            render_report(&report, cli.format)?;
            Ok(report.all_passed())
        }
    }
}

fn render_report(
    report: &ClusterReport,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            let rows: Vec<ReportRow> = report
                .checks
                .iter()
                .map(|c| ReportRow {
                    check: c.name.clone(),
                    status: c.status.to_string(),
                    message: c.message.clone(),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::rounded()));

            for failure in report.failures() {
                if let Some(details) = &failure.details {
                    println!("\n{} {}", format!("{}:", failure.name).yellow(), details);
                }
            }
            let summary = if report.all_passed() {
                format!("✓ {} check(s) passed", report.passed_count()).green()
            } else {
                format!(
                    "✗ {} of {} check(s) failed",
                    report.failed_count(),
                    report.checks.len()
                )
                .red()
            };
            println!("\n{summary}");
        }
    }
    Ok(())
}
