use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{Event, EventName, WatchId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to initialize inotify: {0}")]
	Init(#[source] io::Error),
	#[error("failed to set up readiness polling: {0}")]
	PollSetup(#[source] io::Error),
	#[error("failed to add watch <path='{}'>: {source}", .path.display())]
	AddWatch {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to remove watch <id='{id}', path='{}'>: {source}", .path.display())]
	RemoveWatch {
		path: PathBuf,
		id: WatchId,
		#[source]
		source: io::Error,
	},
	#[error("failed to read from inotify: {0}")]
	Read(#[source] io::Error),
	#[error("readiness poll failed: {0}")]
	Poll(#[source] io::Error),
	/// The kernel reported a condition that invalidates the whole channel.
	#[error("terminal event received: {name}")]
	Terminal { name: EventName, event: Box<Event> },
	#[error("could not resolve all event types of mask {0:#x}")]
	UnresolvedMask(u32),
	#[error("failed to walk directory tree <root='{}'>: {source}", .path.display())]
	Walk {
		path: PathBuf,
		#[source]
		source: walkdir::Error,
	},
}

impl Error {
	/// Whether the underlying I/O failure was a missing path.
	#[must_use]
	pub fn is_not_found(&self) -> bool {
		match self {
			Self::AddWatch { source, .. } | Self::RemoveWatch { source, .. } => {
				source.kind() == io::ErrorKind::NotFound
			}
			Self::Walk { source, .. } => source
				.io_error()
				.is_some_and(|e| e.kind() == io::ErrorKind::NotFound),
			_ => false,
		}
	}
}
