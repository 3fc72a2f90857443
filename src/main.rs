use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::WrapErr;
use serde::Serialize;
use time::{Date, macros::format_description};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use feedmirror::{
	app::App,
	config::{Config, Ressources, RessourcesRef},
	discovery::DEFAULT_TOP_K,
	mirror,
	stats::{self, StatsReport},
};

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Serve the http api
	Serve,
	/// Create the databases and bring their schema up to date
	InitDb,
	/// Register enabled feeds in the reader, fetch them and mirror the last week
	Init,
	/// Sync reader subscriptions, fetch every feed and mirror recent entries
	Update {
		/// Lookback in days, 0 mirrors everything
		#[arg(long, default_value_t = 1)]
		days: u32,
	},
	/// Mirror already fetched entries without fetching, or walk a paged feed
	Backfill {
		/// Lookback in days, 0 mirrors everything
		#[arg(long, default_value_t = 0, conflicts_with = "url")]
		days: u32,
		/// Fetch this feed and follow its `next` pages instead
		#[arg(long)]
		url: Option<String>,
		/// Stop at the first entry older than this YYYY-MM-DD date
		#[arg(long, requires = "url", value_parser = parse_date)]
		since: Option<Date>,
		/// Pages followed at most, with `--url`
		#[arg(long, default_value_t = mirror::MAX_PAGES)]
		max_pages: usize,
	},
	/// Find and add feeds advertised by a page, or by every configured target
	Discover {
		#[arg(long)]
		url: Option<String>,
		#[arg(long, default_value_t = DEFAULT_TOP_K)]
		top_k: usize,
	},
	Stats {
		#[arg(long, default_value_t = stats::DEFAULT_DAYS)]
		days: u32,
		/// Also write the report to this file
		#[arg(long)]
		out: Option<PathBuf>,
	},
	/// Add feeds listed in the configured source files
	SyncFeeds {
		/// Remove stored feeds the sources no longer list
		#[arg(long)]
		delete_missing: bool,
	},
	ImportOpml {
		file: PathBuf,
	},
	ExportOpml {
		/// Write to this file instead of stdout
		#[arg(long)]
		output: Option<PathBuf>,
	},
	Blacklist {
		#[command(subcommand)]
		command: BlacklistCommand,
	},
}

#[derive(Debug, Subcommand)]
enum BlacklistCommand {
	List,
	AddFeed { url: String },
	AddDomain { domain: String },
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
	let cli = Cli::parse();
	setup_tracing();

	let config = Config::load_file_from_env().wrap_err("could not load the config")?;
	let ressources = Ressources::init(config).wrap_err("could not init ressources")?;

	run(cli.command, ressources).await
}

async fn run(command: Command, ressources: RessourcesRef) -> eyre::Result<()> {
	match command {
		Command::Serve => App::new(ressources).serve().await?,
		Command::InitDb => print_json(&serde_json::json!({
			"ok": true,
			"store": ressources.config.store.database_url,
			"reader": ressources.config.reader.database_url,
		}))?,
		Command::Init => print_json(&ressources.crawler().init_feeds().await?)?,
		Command::Update { days } => print_json(&ressources.crawler().update_all(Some(days)).await?)?,
		Command::Backfill {
			days,
			url,
			since,
			max_pages,
		} => match url {
			Some(url) => print_json(
				&ressources
					.crawler()
					.backfill_paged(&url, since, max_pages)
					.await?,
			)?,
			None => print_json(&ressources.crawler().mirror_entries(Some(days))?)?,
		},
		Command::Discover { url, top_k } => {
			let targets = url.map_or_else(|| ressources.config.discover.targets.clone(), |url| vec![url]);
			if targets.is_empty() {
				eyre::bail!("no url given and no discovery target configured");
			}

			let service = ressources.feed_service();
			let mut summaries = Vec::with_capacity(targets.len());
			for target in &targets {
				summaries.push(service.discover_feeds(target, top_k).await?);
			}
			print_json(&summaries)?;
		}
		Command::Stats { days, out } => {
			if !(1..=stats::MAX_DAYS).contains(&days) {
				eyre::bail!("days must be between 1 and {}", stats::MAX_DAYS);
			}

			let report = StatsReport::collect(&ressources.entries, &ressources.feeds, days)?;
			if let Some(out) = out {
				let content = serde_json::to_string_pretty(&report)?;
				std::fs::write(&out, content)
					.wrap_err_with(|| format!("could not write {}", out.display()))?;
				tracing::info!(path = %out.display(), "wrote stats report");
			}
			print_json(&report)?;
		}
		Command::SyncFeeds { delete_missing } => {
			print_json(&ressources.feed_service().sync_sources(delete_missing)?)?;
		}
		Command::ImportOpml { file } => {
			let raw = std::fs::read(&file)
				.wrap_err_with(|| format!("could not read {}", file.display()))?;
			print_json(&ressources.feed_service().import_opml(&raw)?)?;
		}
		Command::ExportOpml { output } => {
			let document = ressources.feed_service().export_opml()?;
			match output {
				Some(output) => {
					std::fs::write(&output, document)
						.wrap_err_with(|| format!("could not write {}", output.display()))?;
					tracing::info!(path = %output.display(), "exported feeds");
				}
				None => println!("{document}"),
			}
		}
		Command::Blacklist { command } => {
			let service = ressources.feed_service();
			match command {
				BlacklistCommand::List => print_json(&service.blacklist()?)?,
				BlacklistCommand::AddFeed { url } => {
					print_json(&serde_json::json!({ "added": service.ban_feed(&url)? }))?;
				}
				BlacklistCommand::AddDomain { domain } => {
					print_json(&serde_json::json!({ "added": service.ban_domain(&domain)? }))?;
				}
			}
		}
	}

	Ok(())
}

fn parse_date(raw: &str) -> Result<Date, String> {
	Date::parse(raw, format_description!("[year]-[month]-[day]"))
		.map_err(|err| format!("expected a YYYY-MM-DD date: {err}"))
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

fn setup_tracing() {
	Registry::default()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info,feedmirror=debug".into()),
		)
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(std::io::stderr)
				.with_file(true)
				.with_line_number(true),
		)
		.init();
}
