//! Throwaway HTTP upstream for remote provider tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// A base URL nothing listens on.
pub(crate) fn unreachable_base_url() -> String {
	"http://127.0.0.1:1".to_owned()
}

/// `data:` line carrying one chat completion delta.
pub(crate) fn delta_event(content: &str) -> String {
	let chunk = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
	format!("data: {chunk}")
}

fn event_body(events: &[&str]) -> String {
	events.iter().map(|event| format!("{event}\n\n")).collect()
}

/// Complete `200` event-stream response.
pub(crate) fn sse_response(events: &[&str]) -> String {
	let body = event_body(events);
	format!(
		"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
		body.len()
	)
}

/// `200` response announcing more bytes than it sends, so the body read
/// fails after the given events.
pub(crate) fn truncated_response(events: &[&str]) -> String {
	let body = event_body(events);
	format!(
		"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
		body.len() + 4096
	)
}

/// Complete `200` response whose body is one line without a newline.
pub(crate) fn unterminated_response(line: &str) -> String {
	format!(
		"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{line}",
		line.len()
	)
}

pub(crate) fn status_response(status: &str, body: &str) -> String {
	format!(
		"HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
		body.len()
	)
}

/// Answers the first connection with `response`, then closes it.
pub(crate) async fn serve_once(response: String) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test upstream");
	let addr = listener.local_addr().expect("test upstream address");
	tokio::spawn(async move {
		if let Ok((mut socket, _)) = listener.accept().await {
			read_request(&mut socket).await;
			let _ = socket.write_all(response.as_bytes()).await;
			let _ = socket.shutdown().await;
		}
	});
	format!("http://{addr}")
}

/// Answers the first connection with a chunked event stream that sends
/// `events` and then stays open.
///
/// The receiver fires once the client closes the connection.
pub(crate) async fn serve_open_stream(events: &[&str]) -> (String, oneshot::Receiver<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test upstream");
	let addr = listener.local_addr().expect("test upstream address");
	let body = event_body(events);
	let (closed_tx, closed_rx) = oneshot::channel();
	tokio::spawn(async move {
		let Ok((mut socket, _)) = listener.accept().await else { return };
		read_request(&mut socket).await;
		let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n";
		let chunk = format!("{:x}\r\n{body}\r\n", body.len());
		if socket.write_all(head.as_bytes()).await.is_err() || socket.write_all(chunk.as_bytes()).await.is_err() {
			return;
		}

		// Never finish the body; wait for the client to hang up
		let mut buf = [0u8; 1024];
		loop {
			match socket.read(&mut buf).await {
				Ok(0) | Err(_) => break,
				Ok(_) => continue,
			}
		}
		let _ = closed_tx.send(());
	});
	(format!("http://{addr}"), closed_rx)
}

/// Reads headers and a `Content-Length` body.
async fn read_request(socket: &mut TcpStream) {
	let mut data = Vec::new();
	let mut buf = [0u8; 4096];
	loop {
		let n = match socket.read(&mut buf).await {
			Ok(0) | Err(_) => return,
			Ok(n) => n,
		};
		data.extend_from_slice(&buf[..n]);

		let Some(header_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else { continue };
		let headers = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
		let length = headers
			.lines()
			.find_map(|line| line.strip_prefix("content-length:"))
			.and_then(|value| value.trim().parse::<usize>().ok())
			.unwrap_or(0);
		if data.len() >= header_end + 4 + length {
			return;
		}
	}
}
