//!
//! # Inotify
//!
//! Spacedrive's inotify binding for Linux locations: a [`NotificationChannel`] owns one inotify
//! instance, registered for read readiness, and hands out lazily decoded events as an iterator.
//! On top of it, a [`RecursiveWatchTree`] keeps watches on every directory below a set of roots,
//! installing and dropping them as directories are created, deleted or moved around.
//!
//! Streams are pull based: nothing is read from the kernel until the next item is asked for, and
//! the caller is free to add or remove watches between two pulls.
//!
//! ## Basic example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use sd_inotify::{EventName, RecursiveWatchTree, StreamOptions, TreeConfig};
//!
//! fn main() -> sd_inotify::Result<()> {
//!     let mut tree = RecursiveWatchTree::new(
//!         "/home/user/Documents",
//!         TreeConfig::new().with_ignored_dirs(["/home/user/Documents/.git"]),
//!     )?;
//!
//!     let options = StreamOptions::new()
//!         .yield_idle(false)
//!         .timeout(Duration::from_secs(30));
//!
//!     for item in tree.events(options) {
//!         let Some(event) = item?.into_event() else {
//!             continue;
//!         };
//!
//!         if event.has(EventName::CloseWrite) {
//!             println!("{} was written", event.full_path().display());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("sd-inotify is only available on Linux and Android");

mod buffer;
mod channel;
mod config;
mod error;
mod event;
mod ignore;
mod mask;
mod poll;
mod registry;
mod sys;
mod tree;

#[cfg(test)]
mod testing;

pub use buffer::{RawEventHeader, HEADER_LEN};
pub use channel::{AddWatch, Events, NotificationChannel, RemoveMode, StopReason};
pub use config::{ChannelConfig, StreamOptions, DEFAULT_READ_CHUNK_SIZE, DEFAULT_TERMINAL_EVENTS};
pub use error::{Error, Result};
pub use event::{Event, StreamItem};
pub use ignore::IgnoredDirs;
pub use mask::{EventMask, EventName};
pub use poll::{BlockPolicy, Computed, Epoll, Readiness, DEFAULT_BLOCK_DURATION};
pub use registry::{WatchId, WatchRegistry};
pub use sys::{Facility, Inotify};
pub use tree::{RecursiveWatchTree, TreeConfig, TreeEvents};
