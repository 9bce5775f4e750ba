//! Incremental decoder for the `data: {json}\n\n` generation stream.
//!
//! Transport chunks are arbitrary: a record, a JSON payload or a multi-byte
//! UTF-8 character may be split anywhere. The decoder buffers partial input
//! and only emits complete records.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use talecraft_types::StreamMessage;

use crate::cancel::CancelToken;
use crate::error::ApiError;

/// Byte stream of a streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

/// Blank line between records (after `\r` removal)
pub const RECORD_SEPARATOR: &str = "\n\n";

const DATA_PREFIX: &str = "data:";

/// Stateful record decoder
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Bytes of a UTF-8 sequence cut off at the end of the previous chunk
    utf8_tail: Vec<u8>,
    /// Decoded text not yet terminated by a record separator
    buffer: String,
    /// Offset in `buffer` already known to hold no record separator
    scan_from: usize,
    started: bool,
    terminated: bool,
    records_seen: usize,
    skipped_records: usize,
    verbose: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print every record through the verbose request logger
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// True once a `done` or `error` record was emitted
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Records dropped because their payload could not be parsed
    pub fn skipped_records(&self) -> usize {
        self.skipped_records
    }

    /// Feed one transport chunk, returning every message it completed
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamMessage> {
        let text = self.decode_utf8(bytes);
        self.buffer.extend(text.chars().filter(|c| *c != '\r'));

        let mut messages = Vec::new();
        while let Some(offset) = self.buffer[self.scan_from..].find(RECORD_SEPARATOR) {
            let end = self.scan_from + offset;
            let record = self.buffer[..end].to_string();
            self.buffer.drain(..end + RECORD_SEPARATOR.len());
            self.scan_from = 0;
            self.process_record(&record, &mut messages);
        }
        self.scan_from = self.resume_offset();
        messages
    }

    /// Where the next search starts: the last char may open a separator
    fn resume_offset(&self) -> usize {
        let mut offset = self.buffer.len().saturating_sub(RECORD_SEPARATOR.len() - 1);
        while !self.buffer.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Flush state at end of input.
    ///
    /// A trailing record without its final blank line is still processed.
    pub fn finish(&mut self) -> Vec<StreamMessage> {
        if !self.utf8_tail.is_empty() {
            log::warn!("stream ended inside a UTF-8 sequence ({} bytes dropped)", self.utf8_tail.len());
            self.utf8_tail.clear();
        }

        let mut messages = Vec::new();
        let remainder = std::mem::take(&mut self.buffer);
        self.scan_from = 0;
        if !remainder.trim().is_empty() {
            self.process_record(&remainder, &mut messages);
        }
        messages
    }

    /// Decode as much of `tail + bytes` as forms complete UTF-8, keeping an
    /// incomplete trailing sequence for the next chunk
    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        let mut pending = std::mem::take(&mut self.utf8_tail);
        pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(pending.len());
        let mut rest: &[u8] = &pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(err) => {
                    let valid_len = err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&rest[..valid_len]) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            // Hard UTF-8 error: replace the bad sequence, keep going.
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid_len + invalid_len..];
                        }
                        None => {
                            self.utf8_tail = rest[valid_len..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    fn process_record(&mut self, record: &str, out: &mut Vec<StreamMessage>) {
        let data: Vec<&str> = record
            .lines()
            .filter_map(|line| line.strip_prefix(DATA_PREFIX))
            .map(|value| value.strip_prefix(' ').unwrap_or(value))
            .collect();

        // Comments and keep-alives carry no data line.
        if data.is_empty() {
            return;
        }

        let payload = data.join("\n");
        self.records_seen += 1;
        talecraft_logging::log_stream_record(self.records_seen, &payload, self.verbose);

        if self.terminated {
            log::warn!("ignoring stream record after terminal message");
            return;
        }

        match serde_json::from_str::<StreamMessage>(&payload) {
            Ok(StreamMessage::Start) => {
                if self.started {
                    log::warn!("ignoring duplicate start record");
                } else {
                    self.started = true;
                    out.push(StreamMessage::Start);
                }
            }
            Ok(message) => {
                if !self.started {
                    log::warn!("stream record arrived before start; assuming start");
                    self.started = true;
                    out.push(StreamMessage::Start);
                }
                if message.is_terminal() {
                    self.terminated = true;
                }
                out.push(message);
            }
            Err(e) => {
                self.skipped_records += 1;
                log::warn!(
                    "Skipping malformed stream record #{}: {} ({})",
                    self.records_seen,
                    e,
                    talecraft_logging::safe_truncate(&payload, 120)
                );
            }
        }
    }

    /// Drive the decoder over `stream` until a terminal message, end of input,
    /// a transport error or cancellation.
    ///
    /// Messages reach `on_message` in server order. Nothing is dispatched once
    /// `cancel` fires, and the stream is dropped (closing the connection) on
    /// return. A stream ending without `done`/`error` is a protocol error.
    pub async fn run<S, F>(mut self, mut stream: S, cancel: &CancelToken, mut on_message: F) -> Result<(), ApiError>
    where
        S: Stream<Item = Result<Bytes, ApiError>> + Unpin,
        F: FnMut(StreamMessage),
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    for message in self.feed(&bytes) {
                        if cancel.is_cancelled() {
                            return Err(ApiError::Cancelled);
                        }
                        let terminal = message.is_terminal();
                        on_message(message);
                        if terminal {
                            return Ok(());
                        }
                    }
                }
                Some(Err(e)) => {
                    log::warn!("stream interrupted: {}", e);
                    return Err(e);
                }
                None => break,
            }
        }

        for message in self.finish() {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            on_message(message);
        }

        if self.terminated {
            Ok(())
        } else {
            Err(ApiError::protocol("stream ended without a done or error record"))
        }
    }
}

/// Decode `stream` with a fresh [`StreamDecoder`]
pub async fn decode<S, F>(stream: S, cancel: &CancelToken, on_message: F) -> Result<(), ApiError>
where
    S: Stream<Item = Result<Bytes, ApiError>> + Unpin,
    F: FnMut(StreamMessage),
{
    StreamDecoder::new().run(stream, cancel, on_message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const LIGHTHOUSE: &str = concat!(
        "data: {\"type\":\"start\"}\n\n",
        "data: {\"type\":\"chunk\",\"text\":\"The \"}\n\n",
        "data: {\"type\":\"chunk\",\"text\":\"lighthouse \"}\n\n",
        "data: {\"type\":\"chunk\",\"text\":\"groaned.\"}\n\n",
        "data: {\"type\":\"done\",\"fullText\":\"The lighthouse groaned.\"}\n\n",
    );

    fn chunk(text: &str) -> StreamMessage {
        StreamMessage::Chunk { text: text.to_string() }
    }

    fn decode_split(input: &[u8], cuts: &[usize]) -> Vec<StreamMessage> {
        let mut decoder = StreamDecoder::new();
        let mut messages = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.clamp(start, input.len());
            messages.extend(decoder.feed(&input[start..cut]));
            start = cut;
        }
        messages.extend(decoder.feed(&input[start..]));
        messages.extend(decoder.finish());
        messages
    }

    fn byte_stream(parts: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, ApiError>> + Unpin {
        futures::stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))))
    }

    #[test]
    fn test_whole_stream_in_one_chunk() {
        let messages = decode_split(LIGHTHOUSE.as_bytes(), &[]);
        assert_eq!(
            messages,
            vec![
                StreamMessage::Start,
                chunk("The "),
                chunk("lighthouse "),
                chunk("groaned."),
                StreamMessage::Done { full_text: "The lighthouse groaned.".to_string() },
            ]
        );
    }

    #[test]
    fn test_split_inside_json_payload() {
        let input = LIGHTHOUSE.as_bytes();
        let expected = decode_split(input, &[]);
        // Cut inside `"lighthouse "` and inside the separator.
        let cut_in_json = LIGHTHOUSE.find("lighthouse ").unwrap() + 4;
        let cut_in_separator = LIGHTHOUSE.find("\n\n").unwrap() + 1;
        assert_eq!(decode_split(input, &[cut_in_separator, cut_in_json]), expected);
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        let input = "data: {\"type\":\"start\"}\n\ndata: {\"type\":\"chunk\",\"text\":\"café 🌊\"}\n\ndata: {\"type\":\"done\",\"fullText\":\"café 🌊\"}\n\n";
        let bytes = input.as_bytes();
        let wave = input.find('🌊').unwrap();
        let e_acute = input.find('é').unwrap();

        let messages = decode_split(bytes, &[e_acute + 1, wave + 1, wave + 2, wave + 3]);
        assert_eq!(messages[1], chunk("café 🌊"));
        assert!(!messages.iter().any(|m| match m {
            StreamMessage::Chunk { text } => text.contains(char::REPLACEMENT_CHARACTER),
            _ => false,
        }));
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let input = concat!(
            "data: {\"type\":\"start\"}\n\n",
            "data: {\"type\":\"chunk\",\"text\":\"one \"}\n\n",
            "data: {\"type\":\"chunk\",\"text\":\n\n",
            "data: {\"type\":\"chunk\",\"text\":\"two\"}\n\n",
            "data: {\"type\":\"done\",\"fullText\":\"one two\"}\n\n",
        );
        let mut decoder = StreamDecoder::new();
        let mut messages = decoder.feed(input.as_bytes());
        messages.extend(decoder.finish());

        assert_eq!(
            messages,
            vec![
                StreamMessage::Start,
                chunk("one "),
                chunk("two"),
                StreamMessage::Done { full_text: "one two".to_string() },
            ]
        );
        assert_eq!(decoder.skipped_records(), 1);
    }

    #[test]
    fn test_crlf_framing_and_comments() {
        let input = ": keep-alive\r\n\r\ndata: {\"type\":\"start\"}\r\n\r\ndata: {\"type\":\"error\",\"message\":\"model overloaded\"}\r\n\r\n";
        let messages = decode_split(input.as_bytes(), &[3, 17]);
        assert_eq!(
            messages,
            vec![
                StreamMessage::Start,
                StreamMessage::Error { message: "model overloaded".to_string() },
            ]
        );
    }

    #[test]
    fn test_chunk_before_start_gets_implicit_start() {
        let input = "data: {\"type\":\"chunk\",\"text\":\"x\"}\n\ndata: {\"type\":\"start\"}\n\n";
        let messages = decode_split(input.as_bytes(), &[]);
        assert_eq!(messages, vec![StreamMessage::Start, chunk("x")]);
    }

    #[test]
    fn test_records_after_terminal_are_ignored() {
        let input = concat!(
            "data: {\"type\":\"start\"}\n\n",
            "data: {\"type\":\"done\",\"fullText\":\"a\"}\n\n",
            "data: {\"type\":\"chunk\",\"text\":\"late\"}\n\n",
        );
        let mut decoder = StreamDecoder::new();
        let messages = decoder.feed(input.as_bytes());
        assert_eq!(messages.len(), 2);
        assert!(decoder.is_terminated());
    }

    #[test]
    fn test_trailing_record_without_separator_is_processed() {
        let input = "data: {\"type\":\"start\"}\n\ndata: {\"type\":\"done\",\"fullText\":\"end\"}";
        let mut decoder = StreamDecoder::new();
        let mut messages = decoder.feed(input.as_bytes());
        assert_eq!(messages, vec![StreamMessage::Start]);
        messages.extend(decoder.finish());
        assert_eq!(messages.last(), Some(&StreamMessage::Done { full_text: "end".to_string() }));
    }

    #[tokio::test]
    async fn test_run_reports_missing_terminal_as_protocol_error() {
        let stream = byte_stream(vec!["data: {\"type\":\"start\"}\n\n", "data: {\"type\":\"chunk\",\"text\":\"half\"}\n\n"]);
        let mut seen = Vec::new();
        let result = decode(stream, &CancelToken::new(), |m| seen.push(m)).await;

        assert!(matches!(result, Err(ApiError::StreamProtocol { .. })));
        assert_eq!(seen, vec![StreamMessage::Start, chunk("half")]);
    }

    #[tokio::test]
    async fn test_run_surfaces_transport_error_without_retry() {
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"start\"}\n\n")),
            Err(ApiError::NetworkUnavailable { message: "connection reset".to_string() }),
        ]);
        let mut seen = Vec::new();
        let result = decode(stream, &CancelToken::new(), |m| seen.push(m)).await;

        assert_eq!(result, Err(ApiError::NetworkUnavailable { message: "connection reset".to_string() }));
        assert_eq!(seen, vec![StreamMessage::Start]);
    }

    #[tokio::test]
    async fn test_run_stops_dispatching_once_cancelled() {
        let cancel = CancelToken::new();
        let stream = byte_stream(vec![LIGHTHOUSE]);
        let mut seen = Vec::new();
        let result = decode(stream, &cancel, |m| {
            if matches!(m, StreamMessage::Chunk { .. }) {
                cancel.cancel();
            }
            seen.push(m);
        })
        .await;

        assert_eq!(result, Err(ApiError::Cancelled));
        assert_eq!(seen, vec![StreamMessage::Start, chunk("The ")]);
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let stream = futures::stream::pending::<Result<Bytes, ApiError>>();
        let result = decode(stream, &cancel, |_| panic!("no message expected")).await;
        assert_eq!(result, Err(ApiError::Cancelled));
    }

    #[test]
    fn test_long_record_fed_byte_by_byte() {
        let story = "é".repeat(5_000);
        let input = format!(
            "data: {{\"type\":\"start\"}}\n\ndata: {{\"type\":\"chunk\",\"text\":\"{}\"}}\n\n",
            story
        );

        let mut decoder = StreamDecoder::new();
        let mut messages = Vec::new();
        for byte in input.as_bytes() {
            messages.extend(decoder.feed(std::slice::from_ref(byte)));
            // only the last char can begin a separator
            assert!(decoder.buffer.len() - decoder.scan_from <= "é".len());
        }

        assert_eq!(messages, vec![StreamMessage::Start, chunk(&story)]);
        assert_eq!(decoder.scan_from, 0);
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_output(cuts in proptest::collection::vec(0usize..400, 0..12)) {
            let input = "data: {\"type\":\"start\"}\n\ndata: {\"type\":\"chunk\",\"text\":\"Ça gèle — ☃\"}\n\ndata: {\"type\":\"chunk\",\"text\":\"🌊 ok\"}\n\ndata: {\"type\":\"done\",\"fullText\":\"Ça gèle — ☃🌊 ok\"}\n\n";
            let mut cuts = cuts;
            cuts.sort_unstable();
            let expected = decode_split(input.as_bytes(), &[]);
            prop_assert_eq!(decode_split(input.as_bytes(), &cuts), expected);
        }
    }
}
