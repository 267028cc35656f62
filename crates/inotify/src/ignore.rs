use std::{
	collections::{HashMap, HashSet},
	ffi::{OsStr, OsString},
	path::{Path, PathBuf},
};

use tracing::warn;

/// Directories excluded from recursive watching, as `parent -> {child names}`.
#[derive(Debug, Clone, Default)]
pub struct IgnoredDirs {
	by_parent: HashMap<PathBuf, HashSet<OsString>>,
}

impl IgnoredDirs {
	/// Splits every ignored path into its parent and final component. A bare name is taken
	/// relative to `.`.
	pub fn new(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Self {
		let mut by_parent = HashMap::<_, HashSet<_>>::new();

		for ignored in paths {
			let ignored = ignored.as_ref();
			let Some(name) = ignored.file_name() else {
				warn!("Ignored directory has no final component <path='{}'>", ignored.display());
				continue;
			};

			let parent = ignored
				.parent()
				.filter(|parent| !parent.as_os_str().is_empty())
				.unwrap_or_else(|| Path::new("."));

			by_parent
				.entry(parent.to_path_buf())
				.or_default()
				.insert(name.to_os_string());
		}

		Self { by_parent }
	}

	#[must_use]
	pub fn contains(&self, parent: &Path, name: &OsStr) -> bool {
		self.by_parent
			.get(parent)
			.is_some_and(|names| names.contains(name))
	}

	/// Whether `path` itself is one of the ignored directories.
	#[must_use]
	pub fn contains_path(&self, path: &Path) -> bool {
		match (path.parent(), path.file_name()) {
			(Some(parent), Some(name)) => self.contains(parent, name),
			_ => false,
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.by_parent.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_into_parent_and_name() {
		let ignored = IgnoredDirs::new(["/a/ignored", "/a/also/", "/b/x", "relative"]);

		assert!(ignored.contains(Path::new("/a"), OsStr::new("ignored")));
		assert!(ignored.contains(Path::new("/a"), OsStr::new("also")));
		assert!(ignored.contains(Path::new("/b"), OsStr::new("x")));
		assert!(ignored.contains(Path::new("."), OsStr::new("relative")));

		assert!(!ignored.contains(Path::new("/a"), OsStr::new("x")));
		assert!(!ignored.contains(Path::new("/b"), OsStr::new("ignored")));
	}

	#[test]
	fn matches_full_paths() {
		let ignored = IgnoredDirs::new(["/a/ignored"]);

		assert!(ignored.contains_path(Path::new("/a/ignored")));
		assert!(ignored.contains_path(Path::new("/a/ignored/")));
		assert!(!ignored.contains_path(Path::new("/a/ignored/child")));
		assert!(!ignored.contains_path(Path::new("/")));
	}

	#[test]
	fn root_without_name_is_skipped() {
		let ignored = IgnoredDirs::new(["/"]);
		assert!(ignored.is_empty());
	}
}
