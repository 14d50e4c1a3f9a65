//! Decoder for `text/event-stream` bodies.
//!
//! Follows the rules a browser `EventSource` applies: `data` lines are joined
//! with `\n`, a blank line dispatches the pending event, comment lines start
//! with `:`, and an event cut off by the end of the stream is discarded.
//! `retry` is accepted but ignored since streams are never reconnected.
//!
//! A read that times out is reported as [`Frame::Idle`] and the stream stays
//! usable, so a consumer can check for cancellation while the server is quiet.

use std::io::{self, BufRead};

use crate::error::Error;

const DEFAULT_EVENT_TYPE: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl Event {
    /// Events an `onmessage` handler would see: untyped or typed `message`.
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT_TYPE
    }
}

/// One step of a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(Event),
    /// A read timed out before a full line arrived; nothing is lost.
    Idle,
}

/// One step of [`EventStream::messages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Data(String),
    Idle,
}

pub struct EventStream<R> {
    reader: R,
    partial: Vec<u8>,
    skip_lf: bool,
    data: String,
    has_data: bool,
    event_type: Option<String>,
    last_event_id: Option<String>,
    finished: bool,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            skip_lf: false,
            data: String::new(),
            has_data: false,
            event_type: None,
            last_event_id: None,
            finished: false,
        }
    }

    /// Payloads of message events, in arrival order, plus idle ticks.
    pub fn messages(self) -> impl Iterator<Item = Result<Message, Error>> {
        self.filter_map(|item| match item {
            Ok(Frame::Event(event)) if event.is_message() => Some(Ok(Message::Data(event.data))),
            Ok(Frame::Event(event)) => {
                tracing::trace!(event = %event.event, "skipping non-message event");
                None
            }
            Ok(Frame::Idle) => Some(Ok(Message::Idle)),
            Err(err) => Some(Err(err)),
        })
    }

    /// Reads one line terminated by LF, CRLF or a lone CR. Bytes read before
    /// an error stay buffered for the next call. `None` means end of stream;
    /// an unterminated last line is dropped.
    fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if available.is_empty() {
                return Ok(None);
            }

            let mut start = 0;
            if self.skip_lf {
                self.skip_lf = false;
                if available[0] == b'\n' {
                    start = 1;
                }
            }

            match available[start..]
                .iter()
                .position(|byte| *byte == b'\n' || *byte == b'\r')
            {
                Some(offset) => {
                    let end = start + offset;
                    self.partial.extend_from_slice(&available[start..end]);
                    self.skip_lf = available[end] == b'\r';
                    self.reader.consume(end + 1);
                    let line = String::from_utf8_lossy(&self.partial).into_owned();
                    self.partial.clear();
                    return Ok(Some(line));
                }
                None => {
                    let len = available.len();
                    self.partial.extend_from_slice(&available[start..]);
                    self.reader.consume(len);
                }
            }
        }
    }

    fn process_line(&mut self, line: &str) -> Option<Event> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            "event" => self.event_type = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Event> {
        let event_type = self.event_type.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        let event = event_type
            .filter(|kind| !kind.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());

        Some(Event {
            event,
            data,
            id: self.last_event_id.clone(),
        })
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.next_line() {
                Ok(Some(line)) => {
                    if let Some(event) = self.process_line(&line) {
                        return Some(Ok(Frame::Event(event)));
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(err) if is_timeout(&err) => return Some(Ok(Frame::Idle)),
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}

/// Read timeouts from a plain socket surface as `TimedOut`/`WouldBlock`;
/// reqwest wraps its own timeout error in an `io::Error`.
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    ) || err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .is_some_and(reqwest::Error::is_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{BufReader, Cursor, Read};

    fn decode(input: &str) -> Vec<Event> {
        EventStream::new(Cursor::new(input.as_bytes().to_vec()))
            .map(|item| match item.unwrap() {
                Frame::Event(event) => event,
                Frame::Idle => panic!("in-memory reads never time out"),
            })
            .collect()
    }

    /// Hands out one scripted chunk per read; `None` is a read that timed out.
    struct Chunked {
        reads: VecDeque<Option<&'static [u8]>>,
    }

    impl Chunked {
        fn new(reads: Vec<Option<&'static [u8]>>) -> BufReader<Self> {
            BufReader::new(Self {
                reads: reads.into(),
            })
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(None) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn decodes_message_events_in_order() {
        let events = decode("data: The \n\ndata: answer.\n\n");
        let data: Vec<_> = events.iter().map(|event| event.data.as_str()).collect();
        assert_eq!(data, vec!["The ", "answer."]);
        assert!(events.iter().all(Event::is_message));
    }

    #[test]
    fn joins_multiline_data() {
        let events = decode("data: first\ndata: second\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn accepts_crlf_and_lone_cr() {
        let events = decode("data: a\r\n\r\ndata: b\r\rdata: c\n\n");
        let data: Vec<_> = events.iter().map(|event| event.data.as_str()).collect();
        assert_eq!(data, vec!["a", "b", "c"]);
    }

    #[test]
    fn lone_cr_dispatches_without_waiting_for_more_input() {
        let mut stream = EventStream::new(Chunked::new(vec![Some(b"data: now\r\r"), None]));
        match stream.next() {
            Some(Ok(Frame::Event(event))) => assert_eq!(event.data, "now"),
            other => panic!("expected an event, got {other:?}"),
        }
        assert!(matches!(stream.next(), Some(Ok(Frame::Idle))));
    }

    #[test]
    fn crlf_split_across_reads_is_one_terminator() {
        let stream = EventStream::new(Chunked::new(vec![
            Some(b"data: a\r"),
            Some(b"\n\r"),
            Some(b"\ndata: b\n\n"),
        ]));
        let messages: Vec<_> = stream.messages().map(|item| item.unwrap()).collect();
        assert_eq!(
            messages,
            vec![Message::Data("a".into()), Message::Data("b".into())]
        );
    }

    #[test]
    fn timed_out_read_keeps_partial_line() {
        let stream = EventStream::new(Chunked::new(vec![
            Some(b"data: hel"),
            None,
            None,
            Some(b"lo\n\n"),
        ]));
        let messages: Vec<_> = stream.messages().map(|item| item.unwrap()).collect();
        assert_eq!(
            messages,
            vec![Message::Idle, Message::Idle, Message::Data("hello".into())]
        );
    }

    #[test]
    fn skips_comments_and_unknown_fields() {
        let events = decode(": keep-alive\nretry: 1000\nfoo: bar\ndata: ok\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn blank_data_line_still_dispatches() {
        let events = decode("data:\n\n\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn only_strips_one_leading_space() {
        let events = decode("data:  indented\n\n");
        assert_eq!(events[0].data, " indented");
    }

    #[test]
    fn discards_unterminated_trailing_event() {
        let events = decode("data: done\n\ndata: partial");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "done");
    }

    #[test]
    fn named_events_are_not_messages() {
        let stream = EventStream::new(Cursor::new(
            b"event: status\ndata: thinking\n\ndata: hello\n\nevent: message\ndata: world\n\n"
                .to_vec(),
        ));
        let messages: Vec<_> = stream.messages().map(|item| item.unwrap()).collect();
        assert_eq!(
            messages,
            vec![Message::Data("hello".into()), Message::Data("world".into())]
        );
    }

    #[test]
    fn events_carry_last_event_id() {
        let events = decode("id: 7\ndata: x\n\ndata: y\n\n");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(events[1].id.as_deref(), Some("7"));
    }
}
