//! Reassembly of `struct inotify_event` records out of the raw byte stream.
//!
//! The kernel writes records back to back: a fixed 16 byte header followed by `len` bytes of
//! NUL padded name. Reads are not guaranteed to end on a record boundary, so whatever tail is
//! left over stays buffered until the next read completes it.

use std::mem::size_of;

use crate::WatchId;

/// Size of the fixed `wd, mask, cookie, len` header.
pub const HEADER_LEN: usize = 4 * size_of::<u32>();

/// Decoded fixed-size part of an inotify record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawEventHeader {
	pub wd: WatchId,
	pub mask: u32,
	/// Correlates the `IN_MOVED_FROM`/`IN_MOVED_TO` halves of one rename.
	pub cookie: u32,
	/// Length of the padded name that follows the header.
	pub len: u32,
}

impl RawEventHeader {
	fn parse(bytes: &[u8; HEADER_LEN]) -> Self {
		let field = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];

		Self {
			wd: WatchId(i32::from_ne_bytes(field(0))),
			mask: u32::from_ne_bytes(field(4)),
			cookie: u32::from_ne_bytes(field(8)),
			len: u32::from_ne_bytes(field(12)),
		}
	}

	/// Full record length, header included.
	#[must_use]
	pub fn record_len(&self) -> usize {
		HEADER_LEN + self.len as usize
	}
}

/// A complete record, name stripped of its NUL padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
	pub header: RawEventHeader,
	pub name: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct EventBuffer {
	pending: Vec<u8>,
}

impl EventBuffer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn extend(&mut self, bytes: &[u8]) {
		self.pending.extend_from_slice(bytes);
	}

	/// Bytes received but not yet consumed as part of a complete record.
	#[must_use]
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	/// Pops the next complete record off the front of the buffer, if there is one.
	pub fn next_record(&mut self) -> Option<RawRecord> {
		let header_bytes = self.pending.first_chunk::<HEADER_LEN>()?;
		let header = RawEventHeader::parse(header_bytes);

		let record_len = header.record_len();
		if self.pending.len() < record_len {
			return None;
		}

		let mut name = self.pending[HEADER_LEN..record_len].to_vec();
		let trimmed = name.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
		name.truncate(trimmed);

		self.pending.drain(..record_len);

		Some(RawRecord { header, name })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::encode_record;

	fn records() -> Vec<(i32, u32, u32, &'static str)> {
		vec![
			(1, 0x100, 0, "created.txt"),
			(1, 0x4000_0100, 0, "some directory with a long name"),
			(2, 0x40, 77, "from"),
			(3, 0x80, 77, "to"),
			(2, 0x400, 0, ""),
			(4, 0x2, 0, "ünïcödé"),
		]
	}

	fn stream() -> Vec<u8> {
		records()
			.into_iter()
			.flat_map(|(wd, mask, cookie, name)| encode_record(wd, mask, cookie, name))
			.collect()
	}

	fn drain(buffer: &mut EventBuffer, out: &mut Vec<RawRecord>) {
		while let Some(record) = buffer.next_record() {
			out.push(record);
		}
	}

	fn expected() -> Vec<RawRecord> {
		let mut buffer = EventBuffer::new();
		buffer.extend(&stream());
		let mut out = Vec::new();
		drain(&mut buffer, &mut out);
		out
	}

	#[test]
	fn decodes_whole_stream() {
		let decoded = expected();
		assert_eq!(decoded.len(), records().len());

		for (record, (wd, mask, cookie, name)) in decoded.iter().zip(records()) {
			assert_eq!(record.header.wd, WatchId(wd));
			assert_eq!(record.header.mask, mask);
			assert_eq!(record.header.cookie, cookie);
			assert_eq!(record.name, name.as_bytes());
			assert_eq!(record.header.len as usize % 16, 0);
		}
	}

	#[test]
	fn fragmentation_does_not_change_the_output() {
		let bytes = stream();
		let whole = expected();

		for chunk_size in [1, 2, 3, 7, 15, 16, 17, 31, 64, 1000] {
			let mut buffer = EventBuffer::new();
			let mut out = Vec::new();
			for chunk in bytes.chunks(chunk_size) {
				buffer.extend(chunk);
				drain(&mut buffer, &mut out);
			}
			assert_eq!(out, whole, "chunk size {chunk_size}");
			assert_eq!(buffer.pending_len(), 0);
		}
	}

	#[test]
	fn waits_for_complete_header_and_name() {
		let bytes = encode_record(5, 0x100, 0, "name");
		let mut buffer = EventBuffer::new();

		buffer.extend(&bytes[..HEADER_LEN - 1]);
		assert!(buffer.next_record().is_none());

		buffer.extend(&bytes[HEADER_LEN - 1..HEADER_LEN + 2]);
		assert!(buffer.next_record().is_none());
		assert_eq!(buffer.pending_len(), HEADER_LEN + 2);

		buffer.extend(&bytes[HEADER_LEN + 2..]);
		let record = buffer.next_record().unwrap();
		assert_eq!(record.name, b"name");
		assert_eq!(buffer.pending_len(), 0);
	}
}
