mod config;

use std::env;
use std::io;
use std::path::{self, Path, PathBuf};

use common::SongId;
use library::{
    ApplyMethod, ApplyReport, FileOps, LoftyTags, NoTags, PlaylistStore, Reconciler, ScanStatus,
    StdFileOps, TagOps,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::PlaylistConfig;

const USAGE: &str = "usage: playlist <command> [args]
  scan <folder>
  register <folder> [files..]
  list <folder>
  check [--prune]
  reorder <folder> <position> <ids..>
  disable <folder> <ids..>
  enable <folder> <ids..>
  shuffle <folder>
  compact <folder>
  copy <folder> <target>
  series <folder> <id> <series>
  weight <folder> <id> <weight>
  rename <folder> <id> <new base name>
  export-legacy <songs.json> <orders.json>";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config::config_path_from_env();
    let (settings, created) = config::load_or_create_config(&config_path)?;
    if created {
        info!("Wrote default config to {:?}", config_path);
    }

    let store_path = config::resolve_path(&config_path, &settings.store_path);
    let legacy_songs = settings
        .legacy_songs_path
        .as_deref()
        .map(|value| config::resolve_path(&config_path, value));
    let legacy_orders = settings
        .legacy_orders_path
        .as_deref()
        .map(|value| config::resolve_path(&config_path, value));
    let mut store = PlaylistStore::open_with_legacy(
        store_path,
        legacy_songs.as_deref(),
        legacy_orders.as_deref(),
    )?;

    let mut args = env::args().skip(1);
    let command = args.next().ok_or(USAGE)?;
    let rest: Vec<String> = args.collect();

    if settings.write_tags {
        run(&command, &rest, &settings, &mut store, LoftyTags)
    } else {
        run(&command, &rest, &settings, &mut store, NoTags)
    }
}

fn run<T: TagOps>(
    command: &str,
    args: &[String],
    settings: &PlaylistConfig,
    store: &mut PlaylistStore,
    tags: T,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        "check" => return check(store, args.iter().any(|arg| arg == "--prune")),
        "export-legacy" => {
            let [songs, orders] = args else {
                return Err(USAGE.into());
            };
            store.export_legacy(Path::new(songs), Path::new(orders))?;
            println!("Exported to {} and {}", songs, orders);
            return Ok(());
        }
        _ => {}
    }

    let (folder, rest) = args.split_first().ok_or(USAGE)?;
    let folder = path::absolute(folder)?;
    let scan_options = settings.scan_options();
    let mut rec = Reconciler::new(store, settings.workspace(&folder), StdFileOps, tags)
        .with_options(settings.reconcile_options());

    match command {
        "scan" => {
            for entry in rec.scan(&scan_options)? {
                let name = common::file_name(&entry.path);
                match entry.status {
                    ScanStatus::Registered(id) => println!("{}  {}", id, name),
                    ScanStatus::Unregistered(candidate) => {
                        println!("------  {}  (new: {})", name, candidate)
                    }
                }
            }
        }
        "register" => {
            let paths: Vec<PathBuf> = if rest.is_empty() {
                rec.scan(&scan_options)?
                    .into_iter()
                    .filter(|entry| matches!(entry.status, ScanStatus::Unregistered(_)))
                    .map(|entry| entry.path)
                    .collect()
            } else {
                rest.iter()
                    .map(|arg| in_folder(&folder, arg))
                    .collect::<io::Result<_>>()?
            };
            let report = rec.register(&paths, &scan_options)?;
            for path in &report.skipped {
                warn!("Skipped {:?}", path);
            }
            for failure in &report.tag_failures {
                warn!("Tags not written for {} ({:?}): {}", failure.id, failure.path, failure.error);
            }
            println!("Registered {} songs", report.registered.len());
        }
        "list" => {
            for (song, order) in rec.songs() {
                let series = if song.series.is_empty() {
                    String::new()
                } else {
                    format!("  [{}]", song.series)
                };
                println!("{:>4}  {}  {}  w{}{}", order.to_string(), song.id, song.name, song.weight, series);
            }
        }
        "reorder" => {
            let (position, ids) = rest.split_first().ok_or(USAGE)?;
            let position: u32 = position.parse()?;
            rec.stage_manual_reorder(&song_ids(ids)?, position)?;
            apply_staged(&mut rec)?;
        }
        "disable" => {
            rec.stage_disable(&song_ids(rest)?)?;
            apply_staged(&mut rec)?;
        }
        "enable" => {
            rec.stage_enable(&song_ids(rest)?)?;
            apply_staged(&mut rec)?;
        }
        "shuffle" => {
            rec.stage_shuffle()?;
            apply_staged(&mut rec)?;
        }
        "compact" => {
            rec.stage_compact()?;
            apply_staged(&mut rec)?;
        }
        "copy" => {
            let [target] = rest else {
                return Err(USAGE.into());
            };
            let report = rec.apply(ApplyMethod::CopyToNewDirectory(path::absolute(target)?))?;
            print_report(&report);
        }
        "series" => {
            let [id, series] = rest else {
                return Err(USAGE.into());
            };
            rec.set_series(&SongId::from(id.as_str()), series)?;
        }
        "weight" => {
            let [id, weight] = rest else {
                return Err(USAGE.into());
            };
            let weight = rec.set_weight(&SongId::from(id.as_str()), weight.parse()?)?;
            println!("{} weight {}", id, weight);
        }
        "rename" => {
            let [id, base] = rest else {
                return Err(USAGE.into());
            };
            let path = rec.rename_base(&SongId::from(id.as_str()), base)?;
            println!("{} -> {:?}", id, path);
        }
        _ => return Err(USAGE.into()),
    }
    Ok(())
}

fn apply_staged<F: FileOps, T: TagOps>(
    rec: &mut Reconciler<'_, F, T>,
) -> Result<(), Box<dyn std::error::Error>> {
    let changes = rec.pending_changes();
    if changes.is_empty() {
        println!("Nothing to change");
        rec.reset_staged();
        return Ok(());
    }
    for change in &changes {
        println!("{}  {} -> {}", change.id, change.from, change.to);
    }
    let report = rec.apply(ApplyMethod::InPlace)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &ApplyReport) {
    for failure in &report.tag_failures {
        warn!("Tags not written for {} ({:?}): {}", failure.id, failure.path, failure.error);
    }
    if report.created.is_empty() {
        println!("Applied {} changes", report.applied.len());
    } else {
        println!("Created {} songs", report.created.len());
    }
}

fn check(store: &mut PlaylistStore, prune: bool) -> Result<(), Box<dyn std::error::Error>> {
    let issues = store.check();
    for issue in &issues {
        println!("{:?}", issue);
    }
    println!("{} issues", issues.len());
    if prune && store.prune_orphans() > 0 {
        store.commit()?;
    }
    Ok(())
}

fn song_ids(values: &[String]) -> Result<Vec<SongId>, Box<dyn std::error::Error>> {
    if values.is_empty() {
        return Err(USAGE.into());
    }
    Ok(values.iter().map(|value| SongId::from(value.as_str())).collect())
}

// Bare file names refer to the folder; paths are resolved against the
// working directory like the folder itself.
fn in_folder(folder: &Path, arg: &str) -> io::Result<PathBuf> {
    let path = PathBuf::from(arg);
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => path::absolute(path),
        _ => Ok(folder.join(path)),
    }
}
