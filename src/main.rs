use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use houseslot::config::Config;
use houseslot::model::{
    BlockId, OwnerId, ResourceId, ScheduleKey, TimeBlock, display_hour, format_time, parse_day,
    parse_time,
};
use houseslot::repository::{HttpRepository, MemoryRepository, ScheduleRepository};
use houseslot::schedule::{Fetch, Scheduler};

/// Book shared house locations in non-overlapping time blocks.
#[derive(Debug, Parser)]
#[command(name = "houseslot", version)]
struct Cli {
    /// Work against an in-process repository instead of the booking server.
    #[arg(long, global = true)]
    offline: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the blocks booked on a location for a day.
    List { resource: String, day: String },
    /// Book `[start, end)` on a location for a day.
    Book {
        resource: String,
        day: String,
        start: String,
        end: String,
        #[arg(long, env = "HOUSESLOT_USER_ID")]
        owner: String,
    },
    /// Delete a block by id.
    Cancel { id: String },
    /// List the configured locations.
    Locations,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    houseslot::observability::init(config.metrics_port)?;

    let repo: Arc<dyn ScheduleRepository> = if cli.offline {
        info!("offline: using in-memory repository");
        Arc::new(MemoryRepository::default())
    } else {
        info!("using {} (house {})", config.api_url, config.require_house_id()?);
        Arc::new(HttpRepository::new(&config)?)
    };
    let scheduler = Scheduler::from_config(repo, &config);

    match cli.command {
        Command::List { resource, day } => {
            let resource = ResourceId::parse(&resource)?;
            let day = parse_day(&day)?;
            match scheduler.select(ScheduleKey::new(resource, day)).await? {
                Fetch::Loaded(schedule) => print_blocks(schedule.blocks(), cli.json)?,
                other => info!("nothing loaded: {other:?}"),
            }
        }
        Command::Book { resource, day, start, end, owner } => {
            let resource = ResourceId::parse(&resource)?;
            let day = parse_day(&day)?;
            scheduler.select(ScheduleKey::new(resource, day)).await?;
            let block = scheduler
                .book(parse_time(&start)?, parse_time(&end)?, OwnerId::parse(&owner)?)
                .await?;
            print_blocks(std::slice::from_ref(&block), cli.json)?;
        }
        Command::Cancel { id } => {
            let id = BlockId::parse(&id)?;
            scheduler.remove(id.clone()).await?;
            if cli.json {
                println!("{}", serde_json::json!({ "removed": id }));
            } else {
                println!("removed {id}");
            }
        }
        Command::Locations => {
            if cli.json {
                println!("{}", serde_json::to_string(scheduler.locations())?);
            } else {
                for location in scheduler.locations() {
                    println!("{location}");
                }
            }
        }
    }
    Ok(())
}

fn print_blocks(blocks: &[TimeBlock], json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(blocks)?);
        return Ok(());
    }
    if blocks.is_empty() {
        println!("no bookings");
    }
    for block in blocks {
        println!("{}", block_line(block));
    }
    Ok(())
}

fn block_line(block: &TimeBlock) -> String {
    let span = block.span();
    let who = block
        .owner_name
        .as_deref()
        .unwrap_or(block.interval.owner.as_str());
    format!(
        "{}-{}  {:>7}-{:<7}  {:>4} min  {:<16}  {}",
        format_time(span.start),
        format_time(span.end),
        display_hour(span.start),
        display_hour(span.end),
        span.duration().num_minutes(),
        who,
        block.id
    )
}
