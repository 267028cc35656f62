use std::{
	collections::HashMap,
	fmt,
	path::{Path, PathBuf},
};

/// Watch descriptor handed out by the kernel for a successful `inotify_add_watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WatchId(pub i32);

impl fmt::Display for WatchId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Bidirectional `path <-> watch id` mapping.
///
/// Both directions are only ever touched together, so every id maps back to the path that
/// produced it and vice versa.
#[derive(Debug, Default)]
pub struct WatchRegistry {
	by_path: HashMap<PathBuf, WatchId>,
	by_id: HashMap<WatchId, PathBuf>,
}

impl WatchRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn id_of(&self, path: impl AsRef<Path>) -> Option<WatchId> {
		self.by_path.get(path.as_ref()).copied()
	}

	#[must_use]
	pub fn path_of(&self, id: WatchId) -> Option<&Path> {
		self.by_id.get(&id).map(PathBuf::as_path)
	}

	#[must_use]
	pub fn contains_path(&self, path: impl AsRef<Path>) -> bool {
		self.by_path.contains_key(path.as_ref())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.by_path.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.by_path.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Path, WatchId)> {
		self.by_path.iter().map(|(path, id)| (path.as_path(), *id))
	}

	/// Binds `path` to `id`, returning any other path the kernel had already given this id.
	///
	/// The kernel hands out the same descriptor for two paths naming one inode (a symlink and
	/// its target, say), in which case the older path is forgotten.
	pub(crate) fn insert(&mut self, path: PathBuf, id: WatchId) -> Option<PathBuf> {
		if let Some(old_id) = self.by_path.remove(&path) {
			self.by_id.remove(&old_id);
		}

		let displaced = self.by_id.insert(id, path.clone());
		if let Some(old_path) = &displaced {
			self.by_path.remove(old_path);
		}
		self.by_path.insert(path, id);

		displaced
	}

	pub(crate) fn remove_id(&mut self, id: WatchId) -> Option<(PathBuf, WatchId)> {
		let path = self.by_id.remove(&id)?;
		self.by_path.remove(&path);
		Some((path, id))
	}

	#[cfg(test)]
	pub(crate) fn assert_consistent(&self) {
		assert_eq!(self.by_path.len(), self.by_id.len());
		for (path, id) in &self.by_path {
			assert_eq!(self.by_id.get(id), Some(path));
		}
	}
}
