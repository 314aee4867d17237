use crate::error::UpstreamError;

/// Longest line accepted from an upstream, in bytes.
pub(crate) const MAX_LINE_LEN: usize = 1 << 20;

/// One meaningful line of an event-stream body.
#[derive(Debug, PartialEq)]
pub(crate) enum Event {
	/// Payload of a `data:` line.
	Data(String),
	/// The `data: [DONE]` sentinel.
	Done,
}

/// Splits an event-stream body into `data:` events as bytes arrive.
///
/// Bytes are buffered until a newline, so events and multi-byte characters
/// split across network chunks are reassembled. Comments, blank lines and
/// other fields (`event:`, `id:`) are ignored. A pending line may not grow
/// past `MAX_LINE_LEN`.
#[derive(Debug, Default)]
pub(crate) struct EventLineDecoder {
	buffer: Vec<u8>,
}

impl EventLineDecoder {
	/// Feeds bytes and returns the events of every completed line.
	///
	/// # Errors
	/// Fails if the unterminated line left in the buffer exceeds `MAX_LINE_LEN`.
	pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Event>, UpstreamError> {
		self.buffer.extend_from_slice(bytes);

		let mut events = Vec::new();
		let mut start = 0;
		while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
			let end = start + offset;
			if let Some(event) = parse_line(&self.buffer[start..end]) {
				events.push(event);
			}
			start = end + 1;
		}
		self.buffer.drain(..start);

		if self.buffer.len() > MAX_LINE_LEN {
			self.buffer = Vec::new();
			return Err(UpstreamError::Remote(format!("event line exceeds {MAX_LINE_LEN} bytes")));
		}
		Ok(events)
	}

	/// Flushes a trailing line that had no newline.
	pub fn finish(&mut self) -> Vec<Event> {
		let line = std::mem::take(&mut self.buffer);
		parse_line(&line).into_iter().collect()
	}
}

fn parse_line(line: &[u8]) -> Option<Event> {
	let line = String::from_utf8_lossy(line);
	let line = line.trim_end_matches('\r');
	let data = line.strip_prefix("data:")?.trim_start();
	match data {
		"" => None,
		"[DONE]" => Some(Event::Done),
		data => Some(Event::Data(data.to_owned())),
	}
}
