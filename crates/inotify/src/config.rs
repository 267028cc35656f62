use std::{fmt, ops::ControlFlow, path::PathBuf, time::Duration};

use crate::{
	buffer::HEADER_LEN, BlockPolicy, Event, EventMask, EventName, DEFAULT_BLOCK_DURATION,
};

/// Bytes requested from the kernel per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

const NAME_MAX: usize = 255;

/// The kernel rejects reads that could not hold at least one maximal record.
const MIN_READ_CHUNK_SIZE: usize = HEADER_LEN + NAME_MAX + 1;

/// Events that invalidate the whole channel unless told otherwise.
pub const DEFAULT_TERMINAL_EVENTS: [EventName; 2] =
	[EventName::QueueOverflow, EventName::Unmount];

/// Construction-time settings of a [`NotificationChannel`](crate::NotificationChannel).
pub struct ChannelConfig {
	pub(crate) block: Box<dyn BlockPolicy>,
	pub(crate) read_chunk_size: usize,
	pub(crate) debug: bool,
	pub(crate) initial_paths: Vec<PathBuf>,
	pub(crate) initial_mask: EventMask,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			block: Box::new(DEFAULT_BLOCK_DURATION),
			read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
			debug: false,
			initial_paths: Vec::new(),
			initial_mask: EventMask::ALL_EVENTS,
		}
	}
}

impl ChannelConfig {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Fixed time every poll cycle blocks for.
	#[must_use]
	pub fn with_block_duration(self, duration: Duration) -> Self {
		self.with_block_policy(duration)
	}

	/// Dynamic block duration, asked for again before every poll cycle.
	#[must_use]
	pub fn with_block_policy(mut self, policy: impl BlockPolicy + 'static) -> Self {
		self.block = Box::new(policy);
		self
	}

	#[must_use]
	pub fn with_read_chunk_size(mut self, size: usize) -> Self {
		self.read_chunk_size = size.max(MIN_READ_CHUNK_SIZE);
		self
	}

	/// Logs every decoded record header at `debug` level instead of `trace`.
	#[must_use]
	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	/// Paths watched as soon as the channel is up.
	#[must_use]
	pub fn with_paths(
		mut self,
		paths: impl IntoIterator<Item = impl Into<PathBuf>>,
		mask: EventMask,
	) -> Self {
		self.initial_paths = paths.into_iter().map(Into::into).collect();
		self.initial_mask = mask;
		self
	}
}

impl fmt::Debug for ChannelConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChannelConfig")
			.field("read_chunk_size", &self.read_chunk_size)
			.field("debug", &self.debug)
			.field("initial_paths", &self.initial_paths)
			.field("initial_mask", &self.initial_mask)
			.finish_non_exhaustive()
	}
}

type Filter = Box<dyn FnMut(EventName, &Event) -> ControlFlow<()>>;

/// Per-stream settings passed to [`NotificationChannel::events`](crate::NotificationChannel::events).
pub struct StreamOptions {
	pub(crate) timeout: Option<Duration>,
	pub(crate) yield_idle: bool,
	pub(crate) filter: Option<Filter>,
	pub(crate) terminal_events: Vec<EventName>,
}

impl Default for StreamOptions {
	fn default() -> Self {
		Self {
			timeout: None,
			yield_idle: true,
			filter: None,
			terminal_events: DEFAULT_TERMINAL_EVENTS.to_vec(),
		}
	}
}

impl StreamOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Ends the stream once no event arrived for `timeout`.
	///
	/// Checked at poll cycle boundaries only, so the stream may outlive it by one block duration.
	#[must_use]
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Whether a [`StreamItem::Idle`](crate::StreamItem::Idle) is handed out after every quiet cycle.
	#[must_use]
	pub fn yield_idle(mut self, yield_idle: bool) -> Self {
		self.yield_idle = yield_idle;
		self
	}

	/// Called with every name of every event; breaking ends the stream without yielding that
	/// event, which is kept for [`Events::stop_reason`](crate::Events::stop_reason).
	#[must_use]
	pub fn filter(
		mut self,
		filter: impl FnMut(EventName, &Event) -> ControlFlow<()> + 'static,
	) -> Self {
		self.filter = Some(Box::new(filter));
		self
	}

	/// Names that abort the stream with [`Error::Terminal`](crate::Error::Terminal).
	#[must_use]
	pub fn terminal_events(mut self, names: impl IntoIterator<Item = EventName>) -> Self {
		self.terminal_events = names.into_iter().collect();
		self
	}
}

impl fmt::Debug for StreamOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamOptions")
			.field("timeout", &self.timeout)
			.field("yield_idle", &self.yield_idle)
			.field("filter", &self.filter.is_some())
			.field("terminal_events", &self.terminal_events)
			.finish()
	}
}
