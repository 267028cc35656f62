use std::{fmt, io, os::fd::RawFd, time::Duration};

use mio::{unix::SourceFd, Events, Interest, Poll, Token};
use tracing::trace;

const INOTIFY: Token = Token(0);

/// Default time a single poll cycle blocks for.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(1);

/// Readiness multiplexer for the inotify descriptor.
pub trait Readiness {
	/// Blocks for at most `timeout`, returning whether the descriptor became readable.
	///
	/// An interrupted wait must surface as [`io::ErrorKind::Interrupted`] so callers can retry it.
	fn wait(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// `epoll` backed readiness, through `mio`.
///
/// `mio` registrations are edge triggered, a wake-up has to be followed by reading the
/// descriptor until it would block.
#[derive(Debug)]
pub struct Epoll {
	poll: Poll,
	events: Events,
}

impl Epoll {
	pub fn new(fd: RawFd) -> io::Result<Self> {
		let poll = Poll::new()?;
		poll.registry()
			.register(&mut SourceFd(&fd), INOTIFY, Interest::READABLE)?;

		Ok(Self {
			poll,
			events: Events::with_capacity(16),
		})
	}
}

impl Readiness for Epoll {
	fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
		self.poll.poll(&mut self.events, Some(timeout))?;

		let mut readable = false;
		for event in &self.events {
			trace!(
				"Events received from epoll <token='{}', readable='{}'>",
				event.token().0,
				event.is_readable()
			);
			readable |= event.token() == INOTIFY;
		}

		Ok(readable)
	}
}

/// Decides how long the next poll cycle may block for.
///
/// Re-evaluated before every cycle, so implementations can back off dynamically.
pub trait BlockPolicy: Send {
	fn next_block_duration(&mut self) -> Duration;
}

impl BlockPolicy for Duration {
	fn next_block_duration(&mut self) -> Duration {
		*self
	}
}

/// A block duration computed by a closure on every cycle.
pub struct Computed<F>(pub F);

impl<F: FnMut() -> Duration + Send> BlockPolicy for Computed<F> {
	fn next_block_duration(&mut self) -> Duration {
		(self.0)()
	}
}

impl<F> fmt::Debug for Computed<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Computed(..)")
	}
}
