//! Prints every change below the given directories until interrupted.
//!
//! `cargo run -p sd-inotify --example watch_tree -- <dir>... [--ignore <dir>]...`

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use sd_inotify::{Error, RecursiveWatchTree, StreamItem, StreamOptions, TreeConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "watch_tree")]
#[command(about = "Watch directory trees and print their changes", long_about = None)]
struct Args {
	/// Directories to watch recursively
	#[arg(value_name = "DIR", default_value = ".")]
	roots: Vec<PathBuf>,

	/// Directory to leave unwatched, together with everything below it
	#[arg(long, value_name = "DIR")]
	ignore: Vec<PathBuf>,
}

fn main() -> ExitCode {
	let args = Args::parse();

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("info,sd_inotify=debug"));
	if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
		eprintln!("Failed to set up logging: {e}");
		return ExitCode::FAILURE;
	}

	match watch(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("Watching stopped: {e}");
			ExitCode::FAILURE
		}
	}
}

fn watch(Args { roots, ignore }: Args) -> Result<(), Error> {
	let mut tree =
		RecursiveWatchTree::with_roots(&roots, TreeConfig::new().with_ignored_dirs(ignore))?;
	info!("Watching {} directories", tree.channel().watch_count());

	for item in tree.events(StreamOptions::new()) {
		match item? {
			StreamItem::Event(event) => {
				let names = event
					.names
					.iter()
					.map(ToString::to_string)
					.collect::<Vec<_>>()
					.join(",");
				println!("{} {names}", event.full_path().display());
			}
			StreamItem::Idle => {}
		}
	}

	Ok(())
}
