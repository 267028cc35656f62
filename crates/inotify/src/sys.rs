//! The kernel notification facility, on top of the `inotify` crate.

use std::{
	collections::HashMap,
	fs::File,
	io::{self, Read},
	os::fd::{AsFd, AsRawFd, RawFd},
	path::Path,
};

use inotify::{WatchDescriptor, WatchMask};
use tracing::debug;

use crate::{EventMask, WatchId};

/// Source of raw inotify records and watch bookkeeping on the kernel side.
pub trait Facility {
	fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<WatchId>;

	fn remove_watch(&mut self, id: WatchId) -> io::Result<()>;

	/// Drops any local state kept for a watch the kernel already discarded on its own.
	fn forget_watch(&mut self, _id: WatchId) {}

	/// Reads whatever bytes are available. `Ok(0)` means the descriptor was closed and
	/// [`io::ErrorKind::WouldBlock`] that nothing is pending right now.
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// An inotify instance, opened non-blocking and close-on-exec.
///
/// Records are read raw through a duplicate of the instance's descriptor and decoded by the
/// channel, so reads split across record boundaries are fine.
#[derive(Debug)]
pub struct Inotify {
	inner: inotify::Inotify,
	reader: File,
	descriptors: HashMap<WatchId, WatchDescriptor>,
}

impl Inotify {
	pub fn init() -> io::Result<Self> {
		let inner = inotify::Inotify::init()?;
		let reader = File::from(inner.as_fd().try_clone_to_owned()?);

		debug!("Inotify handle is <fd='{}'>", inner.as_raw_fd());

		Ok(Self {
			inner,
			reader,
			descriptors: HashMap::new(),
		})
	}
}

impl AsRawFd for Inotify {
	fn as_raw_fd(&self) -> RawFd {
		self.inner.as_raw_fd()
	}
}

impl Facility for Inotify {
	fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<WatchId> {
		// Event-only bits like IN_ISDIR have no meaning when adding a watch.
		let wd = self
			.inner
			.watches()
			.add(path, WatchMask::from_bits_truncate(mask.bits()))?;

		let id = WatchId(wd.get_watch_descriptor_id());
		self.descriptors.insert(id, wd);
		Ok(id)
	}

	fn remove_watch(&mut self, id: WatchId) -> io::Result<()> {
		let wd = self.descriptors.remove(&id).ok_or_else(|| {
			io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("watch id {id} was not added through this instance"),
			)
		})?;

		self.inner.watches().remove(wd)
	}

	fn forget_watch(&mut self, id: WatchId) {
		self.descriptors.remove(&id);
	}

	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.reader.read(buf)
	}
}
