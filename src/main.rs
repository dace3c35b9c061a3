use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use humansize::{DECIMAL, format_size};
use show_shelf::{
    CACHE_FILE_NAME, CancelFlag, ProviderKind, SEEN_FILE_NAME, SeenMovies, SeriesCache,
    SeriesInfo, SeriesSpecifier, ShowShelfError, SyncEvent, SyncOutcome, TvMazeProvider,
    default_data_dir, ensure_updated, get_updates, refresh_dirty,
};
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "showshelf", about = "Keep a local shelf of TV series metadata")]
struct Cli {
    /// Directory holding the cache files (defaults to the platform data dir)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one series and store it on the shelf
    Fetch {
        /// TVmaze id, or a name to search for
        query: String,

        /// Also download the artwork list
        #[arg(long)]
        banners: bool,

        /// Preferred language code to remember for this series
        #[arg(long, value_name = "CODE")]
        language: Option<String>,
    },
    /// Pull the remote change feed and flag stale entries
    Update {
        /// Re-fetch every entry the change feed flagged
        #[arg(long)]
        refresh: bool,

        /// Also download artwork lists when re-fetching
        #[arg(long)]
        banners: bool,
    },
    /// List every series on the shelf
    List,
    /// Show cache location and counts
    Status,
    /// Drop one series from the shelf
    Forget {
        /// TVmaze id of the series to drop
        tvmaze_id: i64,

        /// Schedule a fresh download instead of dropping it for good
        #[arg(long)]
        retry: bool,
    },
    /// Keep only the given series and drop everything else
    Tidy {
        /// TVmaze ids to keep
        #[arg(required = true)]
        keep: Vec<i64>,
    },
    /// Record movies as seen
    Seen {
        /// Movie ids to record
        #[arg(required = true)]
        movie_ids: Vec<i64>,
    },
    /// Forget everything on the shelf
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Handles sync events and prints formatted output to stdout
fn print_sync_event(event: SyncEvent) {
    match event {
        SyncEvent::FetchingSeries { name } => {
            println!("Fetching '{}'...", name);
        }
        SyncEvent::SeriesStored { tvmaze_id, name } => {
            println!("Stored '{}' (tvmaze {})", name, tvmaze_id);
        }
        SyncEvent::SeriesFailed { name, message } => {
            eprintln!("Failed to update '{}': {}", name, message);
        }
        SyncEvent::FetchingUpdateList => {
            println!("\n=== Checking for Updates ===");
        }
        SyncEvent::UpdatesApplied {
            marked_dirty,
            total_rows,
        } => {
            println!(
                "{} of {} remote change(s) affect the shelf.",
                marked_dirty, total_rows
            );
        }
        SyncEvent::DirtyRefreshed { refreshed, failed } => {
            if failed == 0 {
                println!("\nRefreshed {} stale series.", refreshed);
            } else {
                println!("\nRefreshed {} stale series, {} failed.", refreshed, failed);
            }
        }
        SyncEvent::Cancelled => {
            println!("\nCancelled.");
        }
    }
}

fn print_series_details(series: &SeriesInfo) {
    println!("\n{} (tvmaze {})", series.name, series.tvmaze_id);
    if let Some(status) = &series.status {
        println!("  Status: {}", status);
    }
    if let Some(network) = &series.network {
        println!("  Network: {}", network);
    }
    if let Some(premiered) = &series.premiered {
        println!("  Premiered: {}", premiered);
    }
    if let Some(rating) = series.rating {
        println!("  Rating: {:.1}", rating);
    }
    println!(
        "  {} season(s), {} episode(s)",
        series.seasons.len(),
        series.episode_count()
    );
    if series.banners_loaded {
        println!("  {} artwork file(s)", series.banners.len());
    }
    if let Some(overview) = &series.overview {
        println!("\n{}", overview);
    }
}

fn run(cli: Cli) -> Result<(), ShowShelfError> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    fs::create_dir_all(&data_dir)?;
    let cache_file = data_dir.join(CACHE_FILE_NAME);
    let seen_file = data_dir.join(SEEN_FILE_NAME);

    let cache = SeriesCache::setup(Some(&cache_file), &cache_file, ProviderKind::TvMaze);
    if !cache.load_ok() {
        eprintln!("Warning: the existing cache file could not be read; it will be replaced on the next save.");
    }

    match cli.command {
        Command::Fetch {
            query,
            banners,
            language,
        } => {
            let provider = TvMazeProvider::new();
            let mut spec = match query.parse::<i64>() {
                Ok(id) if id > 0 => {
                    // Keep the cached name for progress output if we have one
                    let display = cache
                        .get(id)
                        .map(|s| s.name)
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| format!("tvmaze {id}"));
                    SeriesSpecifier::tvmaze(id, display)
                }
                _ => SeriesSpecifier::tvmaze_by_name(&query),
            };
            if let Some(code) = language {
                spec = spec.with_language(code);
            }

            let mut stored_id = None;
            ensure_updated(&provider, &cache, &spec, banners, |event| {
                if let SyncEvent::SeriesStored { tvmaze_id, .. } = &event {
                    stored_id = Some(*tvmaze_id);
                }
                print_sync_event(event);
            })?;
            cache.save()?;

            // A fresh enough entry is served straight from the shelf, so no
            // stored event fires; fall back to the id the caller gave us.
            if let Some(series) = cache.get(stored_id.unwrap_or(spec.tvmaze_id)) {
                print_series_details(&series);
            }
        }
        Command::Update { refresh, banners } => {
            let provider = TvMazeProvider::new();
            let library: Vec<SeriesSpecifier> = cache
                .snapshot()
                .into_iter()
                .map(|s| s.to_specifier(ProviderKind::TvMaze))
                .collect();

            let cancel = CancelFlag::new();
            let outcome = get_updates(&provider, &cache, &library, &cancel, print_sync_event)?;
            if refresh && outcome == SyncOutcome::Completed {
                refresh_dirty(&provider, &cache, banners, &cancel, print_sync_event)?;
            }
            cache.save()?;
        }
        Command::List => {
            let series = cache.snapshot();
            if series.is_empty() {
                println!("The shelf is empty.");
            } else {
                for entry in &series {
                    let state = if entry.is_placeholder() { "pending" } else { "loaded" };
                    let name = if entry.name.is_empty() { "(unnamed)" } else { &entry.name };
                    let stale = if entry.dirty { " (stale)" } else { "" };
                    println!(
                        "{:>8}  {:<7}  {} ({} season(s), {} episode(s)){}",
                        entry.tvmaze_id,
                        state,
                        name,
                        entry.seasons.len(),
                        entry.episode_count(),
                        stale
                    );
                }
            }
        }
        Command::Status => {
            let snapshot = cache.snapshot();
            let placeholders = snapshot.iter().filter(|s| s.is_placeholder()).count();
            let stale = snapshot.iter().filter(|s| s.dirty).count();
            let episodes: usize = snapshot.iter().map(|s| s.episode_count()).sum();

            println!("Data directory: {}", data_dir.display());
            match fs::metadata(&cache_file) {
                Ok(meta) => println!(
                    "Cache file: {} ({})",
                    cache_file.display(),
                    format_size(meta.len(), DECIMAL)
                ),
                Err(_) => println!("Cache file: {} (not saved yet)", cache_file.display()),
            }
            println!(
                "Series: {} ({} pending, {} stale)",
                snapshot.len(),
                placeholders,
                stale
            );
            println!("Episodes: {}", episodes);

            let seen = SeenMovies::load(&seen_file)?;
            println!("Seen movies: {}", seen.len());
        }
        Command::Forget { tvmaze_id, retry } => {
            if retry {
                let spec = cache
                    .get(tvmaze_id)
                    .map(|s| s.to_specifier(ProviderKind::TvMaze))
                    .unwrap_or_else(|| SeriesSpecifier::tvmaze(tvmaze_id, ""));
                cache.forget_show_for_refresh(&spec);
                println!("Series {} will be downloaded again on the next update.", tvmaze_id);
            } else {
                cache.forget_show(tvmaze_id);
                println!("Series {} removed.", tvmaze_id);
            }
            cache.save()?;
        }
        Command::Tidy { keep } => {
            cache.tidy(keep.iter().copied())?;
            println!("Kept {} series.", cache.series_count());
        }
        Command::Seen { movie_ids } => {
            let mut seen = SeenMovies::load(&seen_file)?;
            let mut added = 0;
            for id in movie_ids {
                if seen.ensure_added(id) {
                    added += 1;
                }
            }
            seen.save(&seen_file)?;
            println!("Recorded {} new movie(s), {} total.", added, seen.len());
        }
        Command::Reset { yes } => {
            let confirmed = yes
                || Confirm::new()
                    .with_prompt("Forget every cached series?")
                    .default(false)
                    .interact()
                    .unwrap_or(false);
            if confirmed {
                cache.forget_everything()?;
                println!("The shelf is empty now.");
            } else {
                println!("Left everything in place.");
            }
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
