//! In-memory stand-in for the kernel facility and the readiness multiplexer.

use std::{
	cell::RefCell,
	collections::{HashMap, VecDeque},
	io,
	path::{Path, PathBuf},
	rc::Rc,
	thread,
	time::Duration,
};

use crate::{EventMask, Facility, Readiness, WatchId};

/// Encodes one `struct inotify_event` the way the kernel lays it out: the name is NUL
/// terminated and padded up to a 16 byte boundary.
pub(crate) fn encode_record(wd: i32, mask: u32, cookie: u32, name: &str) -> Vec<u8> {
	let padded_len = if name.is_empty() {
		0
	} else {
		(name.len() + 1).next_multiple_of(16)
	};

	let mut bytes = Vec::with_capacity(16 + padded_len);
	bytes.extend_from_slice(&wd.to_ne_bytes());
	bytes.extend_from_slice(&mask.to_ne_bytes());
	bytes.extend_from_slice(&cookie.to_ne_bytes());
	bytes.extend_from_slice(&u32::try_from(padded_len).unwrap().to_ne_bytes());
	bytes.extend_from_slice(name.as_bytes());
	bytes.resize(16 + padded_len, 0);
	bytes
}

/// One scripted answer of [`Readiness::wait`].
#[derive(Debug)]
pub(crate) enum Step {
	/// A quiet cycle lasting this long.
	Sleep(Duration),
	/// The descriptor becomes readable with these read-sized chunks pending.
	Deliver(Vec<Vec<u8>>),
	/// The wait is interrupted by a signal after this long.
	Interrupt(Duration),
	Fail(io::ErrorKind),
}

#[derive(Debug, Default)]
pub(crate) struct Kernel {
	next_wd: i32,
	pub watches: HashMap<WatchId, PathBuf>,
	pub added: Vec<(PathBuf, EventMask)>,
	pub removed: Vec<WatchId>,
	pub forgotten: Vec<WatchId>,
	pub polls: usize,
	/// Refuse watches on paths missing from the real filesystem.
	pub require_existing: bool,
	/// Paths refused with the given error regardless of the filesystem.
	refused: HashMap<PathBuf, io::ErrorKind>,
	pending: VecDeque<Vec<u8>>,
	schedule: VecDeque<Step>,
}

/// Shared handle, one clone goes into the channel as facility, one as readiness and one
/// stays with the test.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeKernel(Rc<RefCell<Kernel>>);

impl FakeKernel {
	pub fn new() -> Self {
		Self::default()
	}

	/// A kernel that only accepts watches on existing paths.
	pub fn strict() -> Self {
		let kernel = Self::new();
		kernel.0.borrow_mut().require_existing = true;
		kernel
	}

	pub fn push(&self, step: Step) -> &Self {
		self.0.borrow_mut().schedule.push_back(step);
		self
	}

	/// Delivers `bytes` as a single read.
	pub fn deliver(&self, bytes: Vec<u8>) -> &Self {
		self.push(Step::Deliver(vec![bytes]))
	}

	/// Makes every later watch on `path` fail with `kind`.
	pub fn refuse(&self, path: impl Into<PathBuf>, kind: io::ErrorKind) -> &Self {
		self.0.borrow_mut().refused.insert(path.into(), kind);
		self
	}

	/// Drops the kernel side of the watch on `path` without any event, as happens when the
	/// directory is replaced by another one.
	pub fn replace(&self, path: impl AsRef<Path>) -> &Self {
		let path = path.as_ref();
		self.0.borrow_mut().watches.retain(|_, watched| watched != path);
		self
	}

	pub fn wd_of(&self, path: impl AsRef<Path>) -> Option<i32> {
		let path = path.as_ref();
		self.0
			.borrow()
			.watches
			.iter()
			.find_map(|(id, watched)| (watched == path).then_some(id.0))
	}

	pub fn with<T>(&self, f: impl FnOnce(&Kernel) -> T) -> T {
		f(&self.0.borrow())
	}
}

impl Facility for FakeKernel {
	fn add_watch(&mut self, path: &Path, mask: EventMask) -> io::Result<WatchId> {
		let mut kernel = self.0.borrow_mut();
		if let Some(kind) = kernel.refused.get(path) {
			return Err((*kind).into());
		}
		if kernel.require_existing && !path.exists() {
			return Err(io::ErrorKind::NotFound.into());
		}

		kernel.added.push((path.to_path_buf(), mask));
		if let Some(id) = kernel
			.watches
			.iter()
			.find_map(|(id, watched)| (watched == path).then_some(*id))
		{
			return Ok(id);
		}

		kernel.next_wd += 1;
		let id = WatchId(kernel.next_wd);
		kernel.watches.insert(id, path.to_path_buf());
		Ok(id)
	}

	fn remove_watch(&mut self, id: WatchId) -> io::Result<()> {
		let mut kernel = self.0.borrow_mut();
		kernel.removed.push(id);
		kernel
			.watches
			.remove(&id)
			.map(|_| ())
			.ok_or_else(|| io::ErrorKind::InvalidInput.into())
	}

	fn forget_watch(&mut self, id: WatchId) {
		self.0.borrow_mut().forgotten.push(id);
	}

	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let mut kernel = self.0.borrow_mut();
		let Some(mut chunk) = kernel.pending.pop_front() else {
			return Err(io::ErrorKind::WouldBlock.into());
		};

		if chunk.len() > buf.len() {
			let rest = chunk.split_off(buf.len());
			kernel.pending.push_front(rest);
		}

		buf[..chunk.len()].copy_from_slice(&chunk);
		Ok(chunk.len())
	}
}

impl Readiness for FakeKernel {
	fn wait(&mut self, timeout: Duration) -> io::Result<bool> {
		let step = {
			let mut kernel = self.0.borrow_mut();
			kernel.polls += 1;
			kernel.schedule.pop_front()
		};

		match step {
			Some(Step::Sleep(duration)) => {
				thread::sleep(duration);
				Ok(false)
			}
			Some(Step::Deliver(chunks)) => {
				self.0.borrow_mut().pending.extend(chunks);
				Ok(true)
			}
			Some(Step::Interrupt(after)) => {
				thread::sleep(after);
				Err(io::ErrorKind::Interrupted.into())
			}
			Some(Step::Fail(kind)) => Err(kind.into()),
			None if !self.0.borrow().pending.is_empty() => Ok(true),
			None => {
				thread::sleep(timeout);
				Ok(false)
			}
		}
	}
}
