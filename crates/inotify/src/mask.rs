use std::fmt;

use bitflags::bitflags;

use crate::{Error, Result};

bitflags! {
	/// Bits of an inotify event mask, used both when adding a watch and when decoding events.
	#[repr(transparent)]
	#[derive(Default, Copy, Clone, Eq, PartialEq, Hash, Debug)]
	#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
	pub struct EventMask: u32 {
		/// `IN_ACCESS`
		const ACCESS = 0x0000_0001;
		/// `IN_MODIFY`
		const MODIFY = 0x0000_0002;
		/// `IN_ATTRIB`
		const ATTRIB = 0x0000_0004;
		/// `IN_CLOSE_WRITE`
		const CLOSE_WRITE = 0x0000_0008;
		/// `IN_CLOSE_NOWRITE`
		const CLOSE_NOWRITE = 0x0000_0010;
		/// `IN_OPEN`
		const OPEN = 0x0000_0020;
		/// `IN_MOVED_FROM`
		const MOVED_FROM = 0x0000_0040;
		/// `IN_MOVED_TO`
		const MOVED_TO = 0x0000_0080;
		/// `IN_CREATE`
		const CREATE = 0x0000_0100;
		/// `IN_DELETE`
		const DELETE = 0x0000_0200;
		/// `IN_DELETE_SELF`
		const DELETE_SELF = 0x0000_0400;
		/// `IN_MOVE_SELF`
		const MOVE_SELF = 0x0000_0800;

		/// `IN_UNMOUNT`
		const UNMOUNT = 0x0000_2000;
		/// `IN_Q_OVERFLOW`
		const Q_OVERFLOW = 0x0000_4000;
		/// `IN_IGNORED`
		const IGNORED = 0x0000_8000;

		/// `IN_ONLYDIR`
		const ONLYDIR = 0x0100_0000;
		/// `IN_DONT_FOLLOW`
		const DONT_FOLLOW = 0x0200_0000;
		/// `IN_EXCL_UNLINK`
		const EXCL_UNLINK = 0x0400_0000;
		/// `IN_MASK_CREATE`
		const MASK_CREATE = 0x1000_0000;
		/// `IN_MASK_ADD`
		const MASK_ADD = 0x2000_0000;
		/// `IN_ISDIR`
		const ISDIR = 0x4000_0000;
		/// `IN_ONESHOT`
		const ONESHOT = 0x8000_0000;

		/// `IN_CLOSE`
		const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
		/// `IN_MOVE`
		const MOVE = Self::MOVED_FROM.bits() | Self::MOVED_TO.bits();
		/// `IN_ALL_EVENTS`
		const ALL_EVENTS = 0x0000_0fff;
	}
}

impl EventMask {
	/// Directory lifecycle bits a recursive tree always needs to observe, whatever the caller asked for.
	pub const TREE_MAINTENANCE: Self = Self::ISDIR
		.union(Self::CREATE)
		.union(Self::DELETE)
		.union(Self::MOVED_TO)
		.union(Self::MOVED_FROM);
}

/// Symbolic name of a single event mask bit, rendered as the kernel constant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventName {
	Access,
	Modify,
	Attrib,
	CloseWrite,
	CloseNowrite,
	Open,
	MovedFrom,
	MovedTo,
	Create,
	Delete,
	DeleteSelf,
	MoveSelf,
	Unmount,
	QueueOverflow,
	Ignored,
	OnlyDir,
	DontFollow,
	ExclUnlink,
	MaskCreate,
	MaskAdd,
	IsDir,
	Oneshot,
}

impl EventName {
	/// Every name, in ascending bit order.
	pub const ALL: [Self; 22] = [
		Self::Access,
		Self::Modify,
		Self::Attrib,
		Self::CloseWrite,
		Self::CloseNowrite,
		Self::Open,
		Self::MovedFrom,
		Self::MovedTo,
		Self::Create,
		Self::Delete,
		Self::DeleteSelf,
		Self::MoveSelf,
		Self::Unmount,
		Self::QueueOverflow,
		Self::Ignored,
		Self::OnlyDir,
		Self::DontFollow,
		Self::ExclUnlink,
		Self::MaskCreate,
		Self::MaskAdd,
		Self::IsDir,
		Self::Oneshot,
	];

	#[must_use]
	pub const fn flag(self) -> EventMask {
		match self {
			Self::Access => EventMask::ACCESS,
			Self::Modify => EventMask::MODIFY,
			Self::Attrib => EventMask::ATTRIB,
			Self::CloseWrite => EventMask::CLOSE_WRITE,
			Self::CloseNowrite => EventMask::CLOSE_NOWRITE,
			Self::Open => EventMask::OPEN,
			Self::MovedFrom => EventMask::MOVED_FROM,
			Self::MovedTo => EventMask::MOVED_TO,
			Self::Create => EventMask::CREATE,
			Self::Delete => EventMask::DELETE,
			Self::DeleteSelf => EventMask::DELETE_SELF,
			Self::MoveSelf => EventMask::MOVE_SELF,
			Self::Unmount => EventMask::UNMOUNT,
			Self::QueueOverflow => EventMask::Q_OVERFLOW,
			Self::Ignored => EventMask::IGNORED,
			Self::OnlyDir => EventMask::ONLYDIR,
			Self::DontFollow => EventMask::DONT_FOLLOW,
			Self::ExclUnlink => EventMask::EXCL_UNLINK,
			Self::MaskCreate => EventMask::MASK_CREATE,
			Self::MaskAdd => EventMask::MASK_ADD,
			Self::IsDir => EventMask::ISDIR,
			Self::Oneshot => EventMask::ONESHOT,
		}
	}

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Access => "IN_ACCESS",
			Self::Modify => "IN_MODIFY",
			Self::Attrib => "IN_ATTRIB",
			Self::CloseWrite => "IN_CLOSE_WRITE",
			Self::CloseNowrite => "IN_CLOSE_NOWRITE",
			Self::Open => "IN_OPEN",
			Self::MovedFrom => "IN_MOVED_FROM",
			Self::MovedTo => "IN_MOVED_TO",
			Self::Create => "IN_CREATE",
			Self::Delete => "IN_DELETE",
			Self::DeleteSelf => "IN_DELETE_SELF",
			Self::MoveSelf => "IN_MOVE_SELF",
			Self::Unmount => "IN_UNMOUNT",
			Self::QueueOverflow => "IN_Q_OVERFLOW",
			Self::Ignored => "IN_IGNORED",
			Self::OnlyDir => "IN_ONLYDIR",
			Self::DontFollow => "IN_DONT_FOLLOW",
			Self::ExclUnlink => "IN_EXCL_UNLINK",
			Self::MaskCreate => "IN_MASK_CREATE",
			Self::MaskAdd => "IN_MASK_ADD",
			Self::IsDir => "IN_ISDIR",
			Self::Oneshot => "IN_ONESHOT",
		}
	}

	/// Resolves a raw mask into every name whose bit is set.
	///
	/// A mask carrying a bit with no known name is an invariant violation: the kernel never
	/// emits those, so we refuse to guess and return [`Error::UnresolvedMask`].
	pub fn from_mask(mask: u32) -> Result<Vec<Self>> {
		let mut unresolved = mask;
		let names = Self::ALL
			.into_iter()
			.filter(|name| {
				let bit = name.flag().bits();
				unresolved &= !bit;
				mask & bit != 0
			})
			.collect();

		if unresolved != 0 {
			return Err(Error::UnresolvedMask(mask));
		}

		Ok(names)
	}
}

impl fmt::Display for EventName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_set_bit_is_reported() {
		let mask = (EventMask::CREATE | EventMask::ISDIR).bits();
		let names = EventName::from_mask(mask).unwrap();
		assert_eq!(names, vec![EventName::Create, EventName::IsDir]);
	}

	#[test]
	fn name_count_matches_set_bits() {
		for mask in [
			EventMask::ALL_EVENTS,
			EventMask::MOVE | EventMask::ISDIR,
			EventMask::IGNORED,
			EventMask::Q_OVERFLOW | EventMask::UNMOUNT | EventMask::ONESHOT,
			EventMask::empty(),
		] {
			let names = EventName::from_mask(mask.bits()).unwrap();
			assert_eq!(names.len(), mask.bits().count_ones() as usize, "{mask:?}");
			for name in &names {
				assert!(mask.contains(name.flag()));
			}
		}
	}

	#[test]
	fn each_name_owns_a_distinct_bit() {
		let mut seen = EventMask::empty();
		for name in EventName::ALL {
			assert_eq!(name.flag().bits().count_ones(), 1, "{name}");
			assert!(!seen.intersects(name.flag()), "{name} overlaps");
			seen |= name.flag();
		}
	}

	#[test]
	fn undefined_bit_is_rejected() {
		let mask = EventMask::CREATE.bits() | 0x0000_1000;
		assert!(matches!(
			EventName::from_mask(mask),
			Err(Error::UnresolvedMask(m)) if m == mask
		));
	}

	#[test]
	fn display_uses_kernel_names() {
		assert_eq!(EventName::QueueOverflow.to_string(), "IN_Q_OVERFLOW");
		assert_eq!(EventName::CloseNowrite.to_string(), "IN_CLOSE_NOWRITE");
	}
}
