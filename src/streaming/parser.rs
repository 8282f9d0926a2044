// Incremental SSE frame parser
//
// Consumes raw text chunks with no message-boundary alignment guarantee and
// emits complete (event, data) frames. Field state survives across chunks, so
// the emitted frames are identical for any split of the same byte stream.
//
// Frame grammar: a record is a sequence of `key: value` lines terminated by
// one blank line. Recognized keys are `event` (last one wins, defaults to
// "message") and `data` (repeated lines concatenate). Everything else is
// ignored for forward compatibility. A record whose accumulated data is empty
// is discarded; the server uses such records for keep-alive padding.

/// One complete (event, data) pair decoded from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

const DEFAULT_EVENT: &str = "message";

/// Stateful incremental decoder. Feed it chunks, collect frames.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Unconsumed tail of the last chunk (a partial line).
    buffer: String,
    /// Event name of the record currently being accumulated.
    event: Option<String>,
    /// Accumulated data of the current record.
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_owned();
            self.buffer.drain(..=pos);
            self.consume_line(&line, &mut frames);
        }
        frames
    }

    fn consume_line(&mut self, line: &str, out: &mut Vec<SseFrame>) {
        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push_str(value.trim());
        } else if line.is_empty() {
            // Record boundary. Emit only if at least one data line arrived;
            // either way the event name resets for the next record.
            let event = self.event.take().unwrap_or_else(|| DEFAULT_EVENT.to_owned());
            if !self.data.is_empty() {
                out.push(SseFrame {
                    event,
                    data: std::mem::take(&mut self.data),
                });
            }
        }
        // Unrecognized keys (`id:`, `retry:`, comments) fall through.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_whole(input: &str) -> Vec<SseFrame> {
        SseParser::new().push(input)
    }

    #[test]
    fn parses_single_frame() {
        let frames = parse_whole("event: metrics\ndata: {\"agentId\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "metrics".into(),
                data: "{\"agentId\":1}".into()
            }]
        );
    }

    #[test]
    fn event_defaults_to_message() {
        let frames = parse_whole("data: hello\n\n");
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn last_event_line_wins() {
        let frames = parse_whole("event: first\nevent: second\ndata: x\n\n");
        assert_eq!(frames[0].event, "second");
    }

    #[test]
    fn data_lines_concatenate() {
        let frames = parse_whole("data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(frames[0].data, "{\"a\":1}");
    }

    #[test]
    fn empty_data_record_is_discarded_and_resets_event() {
        // Keep-alive padding: an event line with no data must not leak its
        // event name into the following record.
        let frames = parse_whole("event: heartbeat\n\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let frames = parse_whole(": comment\nid: 42\nretry: 1000\ndata: y\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "y");
    }

    #[test]
    fn crlf_line_endings() {
        let frames = parse_whole("event: metrics\r\ndata: z\r\n\r\n");
        assert_eq!(frames[0].event, "metrics");
        assert_eq!(frames[0].data, "z");
    }

    #[test]
    fn partial_line_is_retained_across_pushes() {
        let mut parser = SseParser::new();
        assert!(parser.push("event: met").is_empty());
        assert!(parser.push("rics\ndata: {\"agent").is_empty());
        let frames = parser.push("Id\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "metrics");
        assert_eq!(frames[0].data, "{\"agentId\":1}");
    }

    #[test]
    fn chunking_invariance() {
        // The same stream must produce the same frames for any split point,
        // including splits mid-line and mid-field.
        let stream = "event: init\ndata: [{\"agentId\":1},{\"agentId\":2}]\n\n\
                      event: heartbeat\ndata: ping\n\n\
                      data: plain\n\n\
                      event: metrics\ndata: {\"agentId\":3,\"cpuUsage\":9.5}\n\n";

        let expected = parse_whole(stream);
        assert_eq!(expected.len(), 4);

        // Byte-by-byte
        let mut parser = SseParser::new();
        let mut frames = Vec::new();
        for ch in stream.chars() {
            frames.extend(parser.push(&ch.to_string()));
        }
        assert_eq!(frames, expected);

        // Every two-way split
        for split in 0..stream.len() {
            if !stream.is_char_boundary(split) {
                continue;
            }
            let mut parser = SseParser::new();
            let mut frames = parser.push(&stream[..split]);
            frames.extend(parser.push(&stream[split..]));
            assert_eq!(frames, expected, "split at byte {}", split);
        }
    }
}
