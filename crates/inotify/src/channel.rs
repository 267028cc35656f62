use std::{
	ffi::OsString,
	fmt, io,
	os::{fd::AsRawFd, unix::ffi::OsStringExt},
	path::{Path, PathBuf},
	time::Instant,
};

use tracing::{debug, trace, warn};

use crate::{
	buffer::{EventBuffer, RawRecord},
	BlockPolicy, ChannelConfig, Epoll, Error, Event, EventMask, EventName, Facility, Inotify,
	Readiness, Result, StreamItem, StreamOptions, WatchId, WatchRegistry,
};

/// How much of a watch [`NotificationChannel::remove_watch`] tears down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
	/// Forget the watch and ask the kernel to drop it.
	Full,
	/// Forget the watch without telling the kernel, for watches it already dropped on its own
	/// (a deleted directory, say). Asking it again would fail.
	RegistryOnly,
	/// Ask the kernel to drop the watch but keep resolving its id, so the final `IN_IGNORED`
	/// for it can still be matched to a path before it is forgotten.
	KernelOnly,
}

/// Outcome of [`NotificationChannel::add_watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddWatch {
	Added(WatchId),
	/// The path was already registered, nothing was asked of the kernel.
	AlreadyWatched(WatchId),
}

impl AddWatch {
	#[must_use]
	pub const fn id(self) -> WatchId {
		match self {
			Self::Added(id) | Self::AlreadyWatched(id) => id,
		}
	}
}

/// Why an event stream stopped without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
	/// No event arrived within the configured timeout.
	Timeout,
	/// The filter broke on `name` of `event`, which was not yielded.
	Predicate { name: EventName, event: Event },
}

/// A single inotify instance together with its readiness registration and watch registry.
pub struct NotificationChannel<F = Inotify, R = Epoll> {
	facility: F,
	readiness: R,
	registry: WatchRegistry,
	buffer: EventBuffer,
	read_chunk: Vec<u8>,
	block: Box<dyn BlockPolicy>,
	debug: bool,
	last_predicate_stop: Option<(EventName, Event)>,
}

impl NotificationChannel {
	/// Opens an inotify instance and registers it for read readiness.
	pub fn new(config: ChannelConfig) -> Result<Self> {
		let facility = Inotify::init().map_err(Error::Init)?;
		let readiness = Epoll::new(facility.as_raw_fd()).map_err(Error::PollSetup)?;

		Self::with_facility(facility, readiness, config)
	}
}

impl<F: Facility, R: Readiness> NotificationChannel<F, R> {
	pub fn with_facility(facility: F, readiness: R, config: ChannelConfig) -> Result<Self> {
		let ChannelConfig {
			block,
			read_chunk_size,
			debug,
			initial_paths,
			initial_mask,
		} = config;

		let mut channel = Self {
			facility,
			readiness,
			registry: WatchRegistry::new(),
			buffer: EventBuffer::new(),
			read_chunk: vec![0; read_chunk_size],
			block,
			debug,
			last_predicate_stop: None,
		};

		for path in initial_paths {
			channel.add_watch(path, initial_mask)?;
		}

		Ok(channel)
	}

	/// Starts watching `path`.
	///
	/// A path that is already registered is left alone: recursive discovery and watches added
	/// from a secondary channel can race to the same directory, so this is only logged.
	pub fn add_watch(&mut self, path: impl AsRef<Path>, mask: EventMask) -> Result<AddWatch> {
		let path = path.as_ref();
		debug!("Adding watch <path='{}'>", path.display());

		if let Some(id) = self.registry.id_of(path) {
			warn!("Path already being watched <path='{}'>", path.display());
			return Ok(AddWatch::AlreadyWatched(id));
		}

		self.install(path, mask).map(AddWatch::Added)
	}

	/// Watches `path` even if it is already registered, asking the kernel each time.
	///
	/// A directory replaced by another one (a rename over an empty directory, say) keeps its
	/// path in the registry while the kernel has moved on to a new inode. The kernel hands out
	/// a fresh id for it, which replaces the stale one.
	pub fn refresh_watch(&mut self, path: impl AsRef<Path>, mask: EventMask) -> Result<AddWatch> {
		let path = path.as_ref();
		let Some(old_id) = self.registry.id_of(path) else {
			return self.add_watch(path, mask);
		};

		let id = self.install(path, mask)?;
		if id == old_id {
			trace!("Watch still current <id='{id}', path='{}'>", path.display());
			return Ok(AddWatch::AlreadyWatched(id));
		}

		debug!(
			"Replaced stale watch <path='{}', old_id='{old_id}', id='{id}'>",
			path.display()
		);
		self.facility.forget_watch(old_id);

		Ok(AddWatch::Added(id))
	}

	fn install(&mut self, path: &Path, mask: EventMask) -> Result<WatchId> {
		let id = self
			.facility
			.add_watch(path, mask)
			.map_err(|source| Error::AddWatch {
				path: path.to_path_buf(),
				source,
			})?;

		let displaced = self.registry.insert(path.to_path_buf(), id);
		if let Some(displaced) = displaced.filter(|displaced| displaced != path) {
			debug!(
				"Watch id was already bound to another path <id='{id}', old_path='{}'>",
				displaced.display()
			);
		}
		debug!("Added watch <id='{id}', path='{}'>", path.display());

		Ok(id)
	}

	/// Stops watching `path`, returning the id it had, or `None` if it was not watched.
	pub fn remove_watch(
		&mut self,
		path: impl AsRef<Path>,
		mode: RemoveMode,
	) -> Result<Option<WatchId>> {
		let path = path.as_ref();
		let Some(id) = self.registry.id_of(path) else {
			warn!("Path not in watch list <path='{}'>", path.display());
			return Ok(None);
		};

		self.remove(id, path.to_path_buf(), mode).map(Some)
	}

	/// Same as [`remove_watch`](Self::remove_watch), by watch id.
	pub fn remove_watch_by_id(&mut self, id: WatchId, mode: RemoveMode) -> Result<Option<WatchId>> {
		let Some(path) = self.registry.path_of(id).map(Path::to_path_buf) else {
			warn!("Watch id not in watch list <id='{id}'>");
			return Ok(None);
		};

		self.remove(id, path, mode).map(Some)
	}

	fn remove(&mut self, id: WatchId, path: PathBuf, mode: RemoveMode) -> Result<WatchId> {
		debug!(
			"Removing watch <id='{id}', path='{}', mode='{mode:?}'>",
			path.display()
		);

		if mode != RemoveMode::KernelOnly {
			self.registry.remove_id(id);
			trace!(".. removed from registry");
		}

		if mode == RemoveMode::RegistryOnly {
			self.facility.forget_watch(id);
			return Ok(id);
		}

		self.facility
			.remove_watch(id)
			.map_err(|source| Error::RemoveWatch { path, id, source })?;
		trace!(".. removed from inotify");

		Ok(id)
	}

	#[must_use]
	pub fn registry(&self) -> &WatchRegistry {
		&self.registry
	}

	#[must_use]
	pub fn watch_count(&self) -> usize {
		self.registry.len()
	}

	/// The name and event a filter stopped on during the most recent stream, if any.
	#[must_use]
	pub fn last_predicate_stop(&self) -> Option<&(EventName, Event)> {
		self.last_predicate_stop.as_ref()
	}

	/// Lazily pulls events off the channel, see [`Events`].
	pub fn events(&mut self, options: StreamOptions) -> Events<'_, F, R> {
		self.last_predicate_stop = None;

		Events {
			channel: self,
			options,
			state: State::Resume,
			last_hit: Instant::now(),
			stop_reason: None,
		}
	}

	/// Decodes the next buffered record that still belongs to a registered watch.
	///
	/// Records are resolved against the registry at pull time, so watches removed between two
	/// pulls stop producing events right away.
	fn decode_next(&mut self) -> Result<Option<Event>> {
		while let Some(RawRecord { header, name }) = self.buffer.next_record() {
			let names = EventName::from_mask(header.mask)?;
			if self.debug {
				debug!(?header, ?names, "Events received in stream");
			} else {
				trace!(?header, ?names, "Events received in stream");
			}

			let Some(path) = self.registry.path_of(header.wd) else {
				trace!("Dropping event for a watch no longer registered <id='{}'>", header.wd);
				continue;
			};

			return Ok(Some(Event {
				header,
				names,
				path: path.to_path_buf(),
				name: OsString::from_vec(name),
			}));
		}

		Ok(None)
	}

	/// Reads one chunk into the pending buffer, returning whether any bytes arrived.
	fn fill(&mut self) -> Result<bool> {
		loop {
			match self.facility.read(&mut self.read_chunk) {
				Ok(0) => {
					debug!("Inotify descriptor returned end of stream");
					return Ok(false);
				}
				Ok(read) => {
					self.buffer.extend(&self.read_chunk[..read]);
					return Ok(true);
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(Error::Read(e)),
			}
		}
	}
}

impl<F, R> fmt::Debug for NotificationChannel<F, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NotificationChannel")
			.field("registry", &self.registry)
			.field("pending_bytes", &self.buffer.pending_len())
			.field("debug", &self.debug)
			.finish_non_exhaustive()
	}
}

impl<F, R> Drop for NotificationChannel<F, R> {
	fn drop(&mut self) {
		debug!("Cleaning-up inotify <watches='{}'>", self.registry.len());
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// Hand out what a previous stream left buffered, then start polling.
	Resume,
	Polling,
	/// The descriptor is readable, decode and read until it runs dry.
	Draining,
	CycleEnd,
	Finished,
}

enum Verdict {
	Stop(EventName),
	Terminal(EventName),
}

/// The event stream of a [`NotificationChannel`].
///
/// Every pull polls the descriptor as needed and hands back an [`StreamItem::Event`], an
/// [`StreamItem::Idle`] placeholder after a quiet cycle (if enabled), or ends. A terminal event
/// surfaces as [`Error::Terminal`]; after any error, or once ended, the stream stays exhausted.
/// Why it ended is available from [`stop_reason`](Self::stop_reason).
pub struct Events<'c, F = Inotify, R = Epoll> {
	channel: &'c mut NotificationChannel<F, R>,
	options: StreamOptions,
	state: State,
	last_hit: Instant,
	stop_reason: Option<StopReason>,
}

impl<'c, F: Facility, R: Readiness> Events<'c, F, R> {
	#[must_use]
	pub fn stop_reason(&self) -> Option<&StopReason> {
		self.stop_reason.as_ref()
	}

	/// The channel behind this stream, to add or remove watches between pulls.
	pub fn channel(&mut self) -> &mut NotificationChannel<F, R> {
		self.channel
	}

	fn timed_out(&self) -> bool {
		self.options
			.timeout
			.is_some_and(|timeout| self.last_hit.elapsed() > timeout)
	}

	fn stop(&mut self, reason: StopReason) {
		debug!("Event stream stopped <reason='{reason:?}'>");
		if let StopReason::Predicate { name, event } = &reason {
			self.channel.last_predicate_stop = Some((*name, event.clone()));
		}
		self.stop_reason = Some(reason);
		self.state = State::Finished;
	}

	fn fail(&mut self, e: Error) -> Error {
		self.state = State::Finished;
		e
	}

	fn verdict(&mut self, event: &Event) -> Option<Verdict> {
		let StreamOptions {
			filter,
			terminal_events,
			..
		} = &mut self.options;

		event.names.iter().copied().find_map(|name| {
			if filter
				.as_mut()
				.is_some_and(|filter| filter(name, event).is_break())
			{
				Some(Verdict::Stop(name))
			} else if terminal_events.contains(&name) {
				Some(Verdict::Terminal(name))
			} else {
				None
			}
		})
	}
}

impl<'c, F: Facility, R: Readiness> Iterator for Events<'c, F, R> {
	type Item = Result<StreamItem>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			match self.state {
				State::Finished => return None,

				State::Resume | State::Draining => {
					match self.channel.decode_next() {
						Ok(Some(event)) => {
							self.last_hit = Instant::now();
							return match self.verdict(&event) {
								None => Some(Ok(StreamItem::Event(event))),
								Some(Verdict::Stop(name)) => {
									self.stop(StopReason::Predicate { name, event });
									None
								}
								Some(Verdict::Terminal(name)) => {
									warn!("Terminal event received <name='{name}'>");
									Some(Err(self.fail(Error::Terminal {
										name,
										event: Box::new(event),
									})))
								}
							};
						}
						Ok(None) => {}
						Err(e) => return Some(Err(self.fail(e))),
					}

					match self.channel.fill() {
						Ok(true) => {}
						Ok(false) if self.state == State::Resume => self.state = State::Polling,
						Ok(false) => self.state = State::CycleEnd,
						Err(e) => return Some(Err(self.fail(e))),
					}
				}

				State::Polling => {
					let block = self.channel.block.next_block_duration();
					match self.channel.readiness.wait(block) {
						Ok(true) => self.state = State::Draining,
						Ok(false) => self.state = State::CycleEnd,
						Err(e) if e.kind() == io::ErrorKind::Interrupted => {
							trace!("Readiness poll interrupted");
							if self.timed_out() {
								self.stop(StopReason::Timeout);
								return None;
							}
						}
						Err(e) => return Some(Err(self.fail(Error::Poll(e)))),
					}
				}

				State::CycleEnd => {
					if self.timed_out() {
						self.stop(StopReason::Timeout);
						return None;
					}

					self.state = State::Polling;
					if self.options.yield_idle {
						return Some(Ok(StreamItem::Idle));
					}
				}
			}
		}
	}
}

impl<'c, F: Facility, R: Readiness> std::iter::FusedIterator for Events<'c, F, R> {}

impl<F, R> fmt::Debug for Events<'_, F, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Events")
			.field("channel", &self.channel)
			.field("options", &self.options)
			.field("state", &self.state)
			.field("stop_reason", &self.stop_reason)
			.finish_non_exhaustive()
	}
}
