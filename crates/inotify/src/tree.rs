//! Recursive watching of whole directory trees.
//!
//! The tree is walked once up front, then kept in sync by reacting to directory lifecycle
//! events as they are pulled off the channel.
//!
//! Discovery is reactive and therefore racy: anything created inside a new directory before
//! its `IN_CREATE` has been pulled and its watch installed produces no events of its own. The
//! walk that installs the watch does pick up the subdirectories, so they end up watched, but
//! their creation is never reported.

use std::{
	fmt, io,
	path::{Path, PathBuf},
};

use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::{
	ChannelConfig, Epoll, Error, Event, EventMask, EventName, Events, Facility, IgnoredDirs,
	Inotify, NotificationChannel, Readiness, RemoveMode, Result, StopReason, StreamItem,
	StreamOptions,
};

/// Settings of a [`RecursiveWatchTree`].
#[derive(Debug, Default)]
pub struct TreeConfig {
	mask: Option<EventMask>,
	ignored_dirs: Vec<PathBuf>,
	tolerate_missing_dirs: bool,
	channel: ChannelConfig,
}

impl TreeConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Events the caller is interested in, `IN_ALL_EVENTS` if never set. The bits needed to
	/// keep the tree in sync are always added on top.
	#[must_use]
	pub fn with_mask(mut self, mask: EventMask) -> Self {
		self.mask = Some(mask);
		self
	}

	/// Directories to leave unwatched, together with everything below them.
	#[must_use]
	pub fn with_ignored_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
		self.ignored_dirs = dirs.into_iter().map(Into::into).collect();
		self
	}

	/// Keep going when a directory disappears while its watches are being installed, which
	/// happens under heavy rename churn. Off by default, in which case a vanished directory
	/// below a root fails the load like any other watch that could not be added.
	#[must_use]
	pub fn tolerate_missing_dirs(mut self, tolerate: bool) -> Self {
		self.tolerate_missing_dirs = tolerate;
		self
	}

	#[must_use]
	pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
		self.channel = channel;
		self
	}
}

/// What gets watched, and how, shared by the initial load and the stream.
#[derive(Debug)]
struct TreeLoader {
	mask: EventMask,
	ignored: IgnoredDirs,
	tolerate_missing: bool,
}

impl TreeLoader {
	/// Watches `root` and every directory below it that is not ignored.
	fn load<F: Facility, R: Readiness>(
		&self,
		channel: &mut NotificationChannel<F, R>,
		root: &Path,
	) -> Result<()> {
		channel.add_watch(root, self.mask)?;
		self.load_below(channel, root)
	}

	fn load_below<F: Facility, R: Readiness>(
		&self,
		channel: &mut NotificationChannel<F, R>,
		root: &Path,
	) -> Result<()> {
		let walker = WalkDir::new(root)
			.min_depth(1)
			.follow_links(false)
			.into_iter()
			.filter_entry(|entry| {
				entry.file_type().is_dir() && !self.ignored.contains_path(entry.path())
			});

		for entry in walker {
			let entry = match entry {
				Ok(entry) => entry,
				Err(e) if e.depth() > 0 && self.can_skip(&e) => {
					warn!("Skipping directory that could not be read: {e}");
					continue;
				}
				Err(e) => {
					return Err(Error::Walk {
						path: root.to_path_buf(),
						source: e,
					})
				}
			};

			match channel.add_watch(entry.path(), self.mask) {
				Ok(_) => {}
				Err(e) if self.tolerate_missing && e.is_not_found() => {
					warn!("Directory vanished before it could be watched: {e}");
				}
				Err(e) => return Err(e),
			}
		}

		Ok(())
	}

	/// Whether an unreadable directory below a root can be left out of the tree. A vanished
	/// one gets the same treatment as a watch on a vanished directory.
	fn can_skip(&self, e: &walkdir::Error) -> bool {
		match e.io_error() {
			Some(source) if source.kind() == io::ErrorKind::NotFound => self.tolerate_missing,
			_ => true,
		}
	}

	/// Adds or drops watches for the directory an event is about.
	fn maintain<F: Facility, R: Readiness>(
		&self,
		channel: &mut NotificationChannel<F, R>,
		event: &Event,
	) -> Result<()> {
		if event.has(EventName::Ignored) {
			debug!(
				"Kernel dropped a watch, forgetting it <id='{}', path='{}'>",
				event.header.wd,
				event.path.display()
			);
			channel.remove_watch_by_id(event.header.wd, RemoveMode::RegistryOnly)?;
			return Ok(());
		}

		if !event.is_dir() || event.name.is_empty() {
			return Ok(());
		}

		let full_path = event.full_path();

		if event.has(EventName::Create) || event.has(EventName::MovedTo) {
			if self.ignored.contains(&event.path, &event.name) {
				debug!(
					"Not watching new directory on the ignore list <path='{}'>",
					full_path.display()
				);
			} else if !full_path.exists() {
				debug!(
					"New directory is already gone, not watching it <path='{}'>",
					full_path.display()
				);
			} else {
				debug!(
					"A directory has been created, adding watches recursively <path='{}'>",
					full_path.display()
				);
				// The path may still be registered for a directory this one replaced.
				let loaded = channel
					.refresh_watch(&full_path, self.mask)
					.and_then(|_| self.load_below(channel, &full_path));
				match loaded {
					Err(e) if self.tolerate_missing && e.is_not_found() => {
						warn!("Directory vanished before it could be watched: {e}");
					}
					other => other?,
				}
			}
		}

		if event.has(EventName::Delete) {
			// The kernel already dropped the watch along with the directory.
			if channel.registry().contains_path(&full_path) {
				debug!(
					"A directory has been removed, forgetting its watch <path='{}'>",
					full_path.display()
				);
				channel.remove_watch(&full_path, RemoveMode::RegistryOnly)?;
			} else {
				trace!("Removed directory was not watched <path='{}'>", full_path.display());
			}
		} else if event.has(EventName::MovedFrom) {
			debug!(
				"A directory has been moved away, removing its watches <path='{}'>",
				full_path.display()
			);
			// Paths below the old location are dead too. If the directory landed inside the
			// tree, the matching IN_MOVED_TO watches it again under its new path.
			let moved: Vec<PathBuf> = channel
				.registry()
				.iter()
				.filter(|(path, _)| path.starts_with(&full_path))
				.map(|(path, _)| path.to_path_buf())
				.collect();

			for path in moved {
				match channel.remove_watch(&path, RemoveMode::Full) {
					Ok(_) => {}
					// Already invalidated, e.g. the directory was deleted right after the move.
					Err(e @ Error::RemoveWatch { .. }) => debug!("Ignoring failed removal: {e}"),
					Err(e) => return Err(e),
				}
			}
		}

		Ok(())
	}
}

/// A [`NotificationChannel`] that keeps every directory below its roots watched.
pub struct RecursiveWatchTree<F = Inotify, R = Epoll> {
	channel: NotificationChannel<F, R>,
	loader: TreeLoader,
}

impl RecursiveWatchTree {
	/// Recursively watches a single tree.
	pub fn new(root: impl AsRef<Path>, config: TreeConfig) -> Result<Self> {
		Self::with_roots([root], config)
	}

	/// Recursively watches several trees over one channel.
	pub fn with_roots(
		roots: impl IntoIterator<Item = impl AsRef<Path>>,
		mut config: TreeConfig,
	) -> Result<Self> {
		let channel = NotificationChannel::new(std::mem::take(&mut config.channel))?;
		Self::with_channel(channel, roots, config)
	}
}

impl<F: Facility, R: Readiness> RecursiveWatchTree<F, R> {
	/// Builds a tree over an existing channel; the channel settings of `config` are unused.
	pub fn with_channel(
		channel: NotificationChannel<F, R>,
		roots: impl IntoIterator<Item = impl AsRef<Path>>,
		config: TreeConfig,
	) -> Result<Self> {
		let TreeConfig {
			mask,
			ignored_dirs,
			tolerate_missing_dirs,
			..
		} = config;

		let mut tree = Self {
			channel,
			loader: TreeLoader {
				mask: mask.unwrap_or(EventMask::ALL_EVENTS) | EventMask::TREE_MAINTENANCE,
				ignored: IgnoredDirs::new(ignored_dirs),
				tolerate_missing: tolerate_missing_dirs,
			},
		};

		for root in roots {
			tree.add_tree(root)?;
		}

		Ok(tree)
	}

	/// Adds another root to the watched set.
	pub fn add_tree(&mut self, root: impl AsRef<Path>) -> Result<()> {
		let root = root.as_ref();
		debug!("Adding initial watches on tree <root='{}'>", root.display());
		self.loader.load(&mut self.channel, root)
	}

	/// The channel's event stream, with watches added and dropped as directories come and go.
	///
	/// Every event is still handed out unchanged.
	pub fn events(&mut self, options: StreamOptions) -> TreeEvents<'_, F, R> {
		let Self { channel, loader } = self;

		TreeEvents {
			events: channel.events(options),
			loader,
			pending_error: None,
			finished: false,
		}
	}

	/// Effective mask every watch is added with.
	#[must_use]
	pub fn mask(&self) -> EventMask {
		self.loader.mask
	}

	#[must_use]
	pub fn ignored_dirs(&self) -> &IgnoredDirs {
		&self.loader.ignored
	}

	#[must_use]
	pub fn channel(&self) -> &NotificationChannel<F, R> {
		&self.channel
	}

	pub fn channel_mut(&mut self) -> &mut NotificationChannel<F, R> {
		&mut self.channel
	}

	#[must_use]
	pub fn into_channel(self) -> NotificationChannel<F, R> {
		self.channel
	}
}

impl<F, R> fmt::Debug for RecursiveWatchTree<F, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RecursiveWatchTree")
			.field("channel", &self.channel)
			.field("loader", &self.loader)
			.finish()
	}
}

/// Event stream of a [`RecursiveWatchTree`].
///
/// Failing to update the watches for an event does not swallow it: the event is handed out
/// first, the error on the following pull, after which the stream ends.
pub struct TreeEvents<'t, F = Inotify, R = Epoll> {
	events: Events<'t, F, R>,
	loader: &'t TreeLoader,
	pending_error: Option<Error>,
	finished: bool,
}

impl<'t, F: Facility, R: Readiness> TreeEvents<'t, F, R> {
	#[must_use]
	pub fn stop_reason(&self) -> Option<&StopReason> {
		self.events.stop_reason()
	}

	pub fn channel(&mut self) -> &mut NotificationChannel<F, R> {
		self.events.channel()
	}
}

impl<'t, F: Facility, R: Readiness> Iterator for TreeEvents<'t, F, R> {
	type Item = Result<StreamItem>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.finished {
			return None;
		}

		if let Some(e) = self.pending_error.take() {
			self.finished = true;
			return Some(Err(e));
		}

		let item = self.events.next()?;
		if let Ok(StreamItem::Event(event)) = &item {
			if let Err(e) = self.loader.maintain(self.events.channel(), event) {
				self.pending_error = Some(e);
			}
		}

		Some(item)
	}
}

impl<'t, F: Facility, R: Readiness> std::iter::FusedIterator for TreeEvents<'t, F, R> {}

impl<F, R> fmt::Debug for TreeEvents<'_, F, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TreeEvents")
			.field("events", &self.events)
			.field("pending_error", &self.pending_error)
			.field("finished", &self.finished)
			.finish_non_exhaustive()
	}
}
