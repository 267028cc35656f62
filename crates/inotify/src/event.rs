use std::{
	ffi::OsString,
	path::{Path, PathBuf},
};

use crate::{EventMask, EventName, RawEventHeader};

/// A decoded change record, resolved against the watch registry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
	pub header: RawEventHeader,
	/// Every symbolic name set in `header.mask`, in ascending bit order.
	pub names: Vec<EventName>,
	/// The watched path the event was reported on.
	pub path: PathBuf,
	/// Entry within `path` that changed; empty when the event concerns `path` itself.
	pub name: OsString,
}

impl Event {
	#[must_use]
	pub fn mask(&self) -> EventMask {
		EventMask::from_bits_retain(self.header.mask)
	}

	#[must_use]
	pub fn has(&self, name: EventName) -> bool {
		self.mask().contains(name.flag())
	}

	#[must_use]
	pub fn is_dir(&self) -> bool {
		self.has(EventName::IsDir)
	}

	/// `path` joined with `name`, or just `path` for events on the watch itself.
	#[must_use]
	pub fn full_path(&self) -> PathBuf {
		if self.name.is_empty() {
			self.path.clone()
		} else {
			self.path.join(&self.name)
		}
	}

	#[must_use]
	pub fn watched_path(&self) -> &Path {
		&self.path
	}
}

/// What a single pull from an event stream produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
	Event(Event),
	/// A poll cycle went by without a terminating condition, handed out when the stream was
	/// configured to yield idle cycles.
	Idle,
}

impl StreamItem {
	#[must_use]
	pub fn into_event(self) -> Option<Event> {
		match self {
			Self::Event(event) => Some(event),
			Self::Idle => None,
		}
	}

	#[must_use]
	pub fn as_event(&self) -> Option<&Event> {
		match self {
			Self::Event(event) => Some(event),
			Self::Idle => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::WatchId;

	fn created_dir() -> Event {
		Event {
			header: RawEventHeader {
				wd: WatchId(3),
				mask: (EventMask::CREATE | EventMask::ISDIR).bits(),
				cookie: 0,
				len: 16,
			},
			names: vec![EventName::Create, EventName::IsDir],
			path: PathBuf::from("/watched"),
			name: OsString::from("sub"),
		}
	}

	#[test]
	fn full_path_joins_the_entry_name() {
		let mut event = created_dir();
		assert!(event.is_dir());
		assert_eq!(event.full_path(), Path::new("/watched/sub"));

		event.name.clear();
		assert_eq!(event.full_path(), event.watched_path());
	}

	#[cfg(feature = "serde")]
	#[test]
	fn events_serialize_with_their_names() {
		let event = created_dir();
		let value = serde_json::to_value(&event).unwrap();

		assert_eq!(value["header"]["wd"], 3);
		assert_eq!(value["names"], serde_json::json!(["Create", "IsDir"]));
		assert_eq!(value["path"], "/watched");
		assert_eq!(serde_json::from_value::<Event>(value).unwrap(), event);

		assert_eq!(
			serde_json::to_value(event.mask()).unwrap(),
			serde_json::json!("CREATE | ISDIR")
		);
	}
}
