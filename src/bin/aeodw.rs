use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use aeodw::llm::narrative::LlmNarrativeGenerator;
use aeodw::{AeoDW, Database, ReportRequest};

#[derive(Parser)]
#[command(name = "aeodw", about = "Answer-engine brand visibility warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.aeodw/aeodw.db)
    #[arg(long)]
    db: Option<String>,

    /// Customer scope measurements and reports belong to
    #[arg(long, default_value = "default")]
    scope: String,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a JSON-lines measurement export into the warehouse
    Ingest {
        /// Path to the export file (one JSON record per line)
        file: PathBuf,
    },
    /// Manage the reported brand
    Brand {
        #[command(subcommand)]
        action: BrandAction,
    },
    /// Manage tracked competitors
    Competitor {
        #[command(subcommand)]
        action: CompetitorAction,
    },
    /// Generate and inspect reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
    /// Maintain query display texts
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },
    /// Maintain citation-source names and impact scores
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
    /// Record daily site-traffic sessions
    Traffic {
        /// Entity the sessions belong to
        entity_id: String,
        /// Day (YYYY-MM-DD)
        date: String,
        /// Session count for that day
        sessions: i64,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum BrandAction {
    /// Register or update a brand
    Set {
        entity_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        website: Option<String>,
    },
}

#[derive(Subcommand)]
enum CompetitorAction {
    /// Track a competitor against a brand
    Add {
        brand_id: String,
        entity_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        website: Option<String>,
    },
    /// Stop tracking a competitor
    Remove { entity_id: String },
    /// List tracked competitors for a brand
    List { brand_id: String },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Assemble, narrate, and store a report
    Generate {
        brand_id: String,
        /// Reporting period length: 7, 30, 60, or 90 days
        #[arg(long, default_value = "30")]
        days: u32,
        /// Last day of the period (YYYY-MM-DD, default today)
        #[arg(long)]
        end_date: Option<String>,
        /// Skip LLM narrative generation and use the templated narrative
        #[arg(long)]
        no_llm: bool,
        /// Print the stored report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored reports for a brand
    List { brand_id: String },
    /// Print one stored report
    Show {
        report_id: i64,
        /// Print the raw snapshot JSON instead of the narrative
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum QueryAction {
    /// Set the display text for a query id
    Set { query_id: String, text: String },
}

#[derive(Subcommand)]
enum SourceAction {
    /// Set display name and impact score for a source domain
    Set {
        source_domain: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        impact: Option<f64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
    List,
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid date (expected YYYY-MM-DD): {s}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let dw = AeoDW::new(db.clone(), cli.scope.clone());

    match cli.command {
        Commands::Ingest { file } => {
            let content = std::fs::read_to_string(&file)?;
            let report = dw.ingest_jsonl(&content).await?;
            println!(
                "Ingested {} records ({} skipped)",
                report.inserted, report.skipped
            );
        }

        Commands::Brand { action } => match action {
            BrandAction::Set {
                entity_id,
                name,
                website,
            } => {
                dw.set_brand(&entity_id, &name, website.as_deref()).await?;
                println!("Brand {entity_id} set");
            }
        },

        Commands::Competitor { action } => match action {
            CompetitorAction::Add {
                brand_id,
                entity_id,
                name,
                website,
            } => {
                dw.add_competitor(&brand_id, &entity_id, &name, website.as_deref())
                    .await?;
                println!("Tracking {entity_id} against {brand_id}");
            }
            CompetitorAction::Remove { entity_id } => {
                if dw.remove_competitor(&entity_id).await? {
                    println!("Removed {entity_id}");
                } else {
                    println!("No tracked competitor {entity_id}");
                }
            }
            CompetitorAction::List { brand_id } => {
                let competitors = dw.list_competitors(&brand_id).await?;
                if competitors.is_empty() {
                    println!("No tracked competitors for {brand_id}");
                }
                for c in competitors {
                    let site = c.website_url.as_deref().unwrap_or("-");
                    println!("{}\t{}\t{}", c.entity_id, c.name, site);
                }
            }
        },

        Commands::Report { action } => match action {
            ReportAction::Generate {
                brand_id,
                days,
                end_date,
                no_llm,
                json,
            } => {
                let end_date = end_date.as_deref().map(parse_date).transpose()?;
                let request = ReportRequest {
                    brand_id,
                    period_days: days,
                    end_date,
                };

                let dw = if no_llm {
                    dw
                } else {
                    match aeodw::llm::narrative_agent(&db).await {
                        Ok(agent) => {
                            dw.with_narrative(Arc::new(LlmNarrativeGenerator::new(agent)))
                        }
                        Err(e) => {
                            log::warn!("LLM unavailable, using templated narrative: {e}");
                            dw
                        }
                    }
                };

                let stored = dw.generate_report(&request).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&stored)?);
                } else {
                    println!(
                        "Report {} for {} ({})",
                        stored.report_id, stored.brand_id, stored.period_key
                    );
                    println!();
                    println!("{}", stored.narrative);
                }
            }
            ReportAction::List { brand_id } => {
                let reports = dw.list_reports(&brand_id).await?;
                if reports.is_empty() {
                    println!("No reports for {brand_id}");
                }
                for r in reports {
                    println!(
                        "{}\t{}\t{} to {}\t{}",
                        r.report_id, r.period_key, r.period_start, r.period_end, r.generated_at
                    );
                }
            }
            ReportAction::Show { report_id, json } => match dw.get_report(report_id).await? {
                Some(report) => {
                    if json {
                        println!("{}", report.snapshot_json);
                    } else {
                        println!(
                            "Report {} for {} ({})",
                            report.report_id, report.brand_id, report.period_key
                        );
                        println!();
                        println!("{}", report.narrative);
                    }
                }
                None => println!("No report with id {report_id}"),
            },
        },

        Commands::Query { action } => match action {
            QueryAction::Set { query_id, text } => {
                dw.set_query_text(&query_id, &text).await?;
                println!("Query {query_id} set");
            }
        },

        Commands::Source { action } => match action {
            SourceAction::Set {
                source_domain,
                name,
                impact,
            } => {
                dw.set_source_info(&source_domain, name.as_deref(), impact)
                    .await?;
                println!("Source {source_domain} set");
            }
        },

        Commands::Traffic {
            entity_id,
            date,
            sessions,
        } => {
            let day = parse_date(&date)?;
            dw.add_traffic_day(&entity_id, day, sessions).await?;
            println!("Recorded {sessions} sessions for {entity_id} on {day}");
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => match dw.config_get(&key).await? {
                Some(value) => println!("{value}"),
                None => println!("(not set)"),
            },
            ConfigAction::Set { key, value } => {
                dw.config_set(&key, &value).await?;
                println!("{key} set");
            }
            ConfigAction::List => {
                for (key, value) in dw.config_list().await? {
                    println!("{key}={value}");
                }
            }
        },

        Commands::Status => {
            let status = dw.status().await?;
            println!("Records:  {}", status.records);
            println!("Reports:  {}", status.reports);
            if !status.config.is_empty() {
                println!("Config:");
                for (key, value) in status.config {
                    println!("  {key}={value}");
                }
            }
        }
    }

    Ok(())
}
