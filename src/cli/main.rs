use clap::{Parser, Subcommand};
use peerlens::{parse_asn, PeerLens, PeerLensConfig, PeeringReport};
use std::fs::create_dir_all;
use std::process::exit;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio::runtime::Runtime;
use tracing::{debug, error, info};

const PURGE_INTERVAL_SECS: u64 = 60 * 60;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// disable logging
    #[clap(long, global = true)]
    no_log: bool,

    /// target network ASN, overrides PEERLENS_TARGET_ASN
    #[clap(short, long, global = true)]
    target: Option<u32>,

    /// persist IXP memberships and reports to a SQLite cache file.
    /// defaults to PEERLENS_CACHE_DB, then $HOME/.peerlens/cache.sqlite3
    #[clap(long, global = true)]
    persist: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve peering reports via RESTful API
    Serve {
        /// host address
        #[clap(long, default_value = "0.0.0.0")]
        host: String,

        /// port number
        #[clap(short = 'p', long, default_value = "40080")]
        port: u16,
    },

    /// Compute the peering report for one ASN
    Report {
        /// ASN to evaluate, e.g. `3320` or `AS3320`
        asn: String,

        /// print out the report in JSON format instead of Markdown tables
        #[clap(short, long)]
        json: bool,
    },

    /// List the known ISPs
    Isps {
        /// print out the list in JSON format instead of a Markdown table
        #[clap(short, long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct SummaryRow {
    field: &'static str,
    value: String,
}

fn get_peerlens_root_dir() -> Option<String> {
    let home_dir = dirs::home_dir()?;
    let root_dir = format!("{}/.peerlens", home_dir.to_str()?);
    create_dir_all(root_dir.as_str()).ok()?;
    Some(root_dir)
}

fn default_db_file_path() -> Option<String> {
    get_peerlens_root_dir().map(|dir| format!("{}/cache.sqlite3", dir))
}

fn get_tokio_runtime() -> Runtime {
    let worker_threads = num_cpus::get();

    debug!("using {} worker threads", worker_threads);
    match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(worker_threads)
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start tokio runtime: {}", e);
            exit(1);
        }
    }
}

fn enable_logging() {
    tracing_subscriber::fmt()
        .with_ansi(true)
        .with_level(true)
        .with_target(false)
        .init();
}

fn summary_rows(report: &PeeringReport) -> Vec<SummaryRow> {
    let mut rows = vec![
        SummaryRow {
            field: "asn",
            value: format!(
                "AS{}{}",
                report.asn,
                report
                    .isp_name
                    .as_ref()
                    .map(|n| format!(" ({})", n))
                    .unwrap_or_default()
            ),
        },
        SummaryRow {
            field: "country",
            value: report.country.clone(),
        },
        SummaryRow {
            field: "target",
            value: format!("AS{}", report.target_asn),
        },
        SummaryRow {
            field: "prefixes",
            value: format!(
                "{} ({} v4, {} v6)",
                report.prefixes.total, report.prefixes.v4, report.prefixes.v6
            ),
        },
        SummaryRow {
            field: "visibility",
            value: format!(
                "avg {} / min {} / max {}",
                report.visibility.avg, report.visibility.min, report.visibility.max
            ),
        },
        SummaryRow {
            field: "low visibility",
            value: format!(
                "{} below {}",
                report.low_visibility_count, report.low_visibility_threshold
            ),
        },
        SummaryRow {
            field: "ixps",
            value: format!(
                "{} shared, ISP at {} ({:?}), target at {} ({:?})",
                report.shared_ixp_count,
                report.isp_ixp_count,
                report.isp_ixp_status,
                report.target_ixp_count,
                report.target_ixp_status,
            ),
        },
    ];
    if let Some(regional) = &report.regional {
        rows.push(SummaryRow {
            field: "regional ixp",
            value: format!(
                "{} (target present: {}, ISP present: {})",
                regional.ixp.name, regional.target_present, regional.isp_present
            ),
        });
    }
    if let Some(coverage) = &report.coverage {
        rows.push(SummaryRow {
            field: "official prefixes",
            value: format!(
                "{} exact, {} deaggregated, {} not found of {}",
                coverage.exact, coverage.deaggregated, coverage.not_found, coverage.total
            ),
        });
    }
    rows.push(SummaryRow {
        field: "score",
        value: format!(
            "{} (health {}, regional {}, overlap {}, formula {})",
            report.score.total,
            report.score.health,
            report.score.regional,
            report.score.overlap,
            report.score.formula
        ),
    });
    rows.push(SummaryRow {
        field: "route table size",
        value: report.route_table_size.to_string(),
    });
    rows
}

async fn build_lens(config: PeerLensConfig) -> PeerLens {
    for line in config.display_summary() {
        info!("{}", line);
    }
    match PeerLens::from_config(config).await {
        Ok(lens) => lens,
        Err(e) => {
            error!("failed to initialize: {}", e);
            exit(1);
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "peerlens=info,tower_http=info");
    }

    if !cli.no_log {
        enable_logging();
    }

    let mut config = PeerLensConfig::from_env();
    if let Some(target) = cli.target {
        config.target_asn = target;
    }
    if cli.persist && config.cache.db_path.is_none() {
        match default_db_file_path() {
            Some(path) => config.cache.db_path = Some(path),
            None => {
                error!("cannot determine home directory for the cache file, set PEERLENS_CACHE_DB");
                exit(1);
            }
        }
    }

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = get_tokio_runtime();
            rt.block_on(async {
                let lens = build_lens(config).await;

                let purge_lens = lens.clone();
                tokio::spawn(async move {
                    let mut interval =
                        tokio::time::interval(std::time::Duration::from_secs(PURGE_INTERVAL_SECS));
                    loop {
                        interval.tick().await;
                        if let Err(e) = purge_lens.purge_expired().await {
                            error!("failed to purge expired cache entries: {}", e);
                        }
                    }
                });

                if let Err(e) = peerlens::api::start_api_service(lens, host.as_str(), port).await {
                    error!("API service stopped: {}", e);
                    exit(1);
                }
            });
        }
        Commands::Report { asn, json } => {
            let asn = match parse_asn(asn.as_str()) {
                Ok(asn) => asn,
                Err(e) => {
                    eprintln!("{}", e);
                    exit(2);
                }
            };

            let rt = get_tokio_runtime();
            let response = rt.block_on(async {
                let lens = build_lens(config).await;
                lens.report(asn).await
            });
            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    error!("failed to compute report for AS{}: {}", asn, e);
                    exit(1);
                }
            };

            if json {
                match serde_json::to_string_pretty(&response) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        error!("failed to serialize report: {}", e);
                        exit(1);
                    }
                }
            } else {
                println!(
                    "{}",
                    Table::new(summary_rows(&response.report)).with(Style::markdown())
                );
                if !response.report.low_visibility.is_empty() {
                    println!();
                    println!(
                        "{}",
                        Table::new(&response.report.low_visibility).with(Style::markdown())
                    );
                }
                println!(
                    "\n{} in {}ms",
                    match response.cached {
                        true => "served from cache",
                        false => "computed",
                    },
                    response.elapsed_ms
                );
            }
        }
        Commands::Isps { json } => {
            let reference = match peerlens::ReferenceData::load(config.reference_path.as_deref()) {
                Ok(reference) => reference,
                Err(e) => {
                    error!("failed to load reference data: {}", e);
                    exit(1);
                }
            };
            if json {
                match serde_json::to_string_pretty(&reference.isps) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        error!("failed to serialize ISP list: {}", e);
                        exit(1);
                    }
                }
            } else {
                println!("{}", Table::new(&reference.isps).with(Style::markdown()));
            }
        }
    }
}
