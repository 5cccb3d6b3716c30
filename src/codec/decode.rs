//! Decoder state machine.

use bytes::BytesMut;

use super::{
    CodecConfig,
    Decoded,
    FramingError,
    MalformedChunk,
    ProtocolError,
    advance_past_end_line,
    boundary,
    end_line_len,
};
use crate::chunk::{
    Chunk,
    ChunkKind,
    Flag,
    Header,
    Method,
    TransactionId,
    values::parse_status_code,
};

/// Where the decoder is within the current frame.
#[derive(Debug, Default)]
pub(super) enum DecodeState {
    #[default]
    StartLine,
    Headers(PartialChunk),
    Body {
        partial: PartialChunk,
        needle: Vec<u8>,
        search_from: usize,
    },
}

impl DecodeState {
    /// True between frames.
    pub(super) fn is_idle(&self) -> bool { matches!(self, Self::StartLine) }
}

/// Frame under construction.
#[derive(Debug)]
pub(super) struct PartialChunk {
    transaction_id: TransactionId,
    kind: ChunkKind,
    headers: Vec<Header>,
    header_lines: usize,
    error: Option<ProtocolError>,
}

impl PartialChunk {
    fn new(transaction_id: TransactionId, kind: ChunkKind) -> Self {
        Self {
            transaction_id,
            kind,
            headers: Vec::new(),
            header_lines: 0,
            error: None,
        }
    }

    fn record(&mut self, error: ProtocolError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push_header_line(&mut self, line: &[u8]) {
        let malformed = || ProtocolError::MalformedHeaderLine {
            line: String::from_utf8_lossy(line).into_owned(),
        };
        let Ok(text) = std::str::from_utf8(line) else {
            self.record(malformed());
            return;
        };
        let Some((name, value)) = text.split_once(": ") else {
            self.record(malformed());
            return;
        };
        match Header::decode(name, value) {
            Ok(header) => self.headers.push(header),
            Err(err) => self.record(ProtocolError::InvalidHeader {
                name: err.name,
                reason: err.reason,
            }),
        }
    }

    /// Flag of a body-less end-line (`-------<tid><flag>`) for this frame.
    fn end_line_flag(&self, line: &[u8]) -> Option<Flag> {
        let tid = self.transaction_id.as_str().as_bytes();
        let rest = line.strip_prefix(super::END_LINE_DASHES)?;
        let flag = rest.strip_prefix(tid)?;
        match flag {
            [byte] => Flag::from_byte(*byte),
            _ => None,
        }
    }

    fn finish(self, body: Option<bytes::Bytes>, flag: Flag) -> Decoded {
        match self.error {
            Some(error) => Decoded::Malformed(MalformedChunk {
                transaction_id: self.transaction_id,
                kind: self.kind,
                error,
            }),
            None => Decoded::Chunk(Chunk {
                transaction_id: self.transaction_id,
                kind: self.kind,
                headers: self.headers,
                body,
                flag,
            }),
        }
    }
}

/// Split one CRLF-terminated line off `src`, without its terminator.
fn take_line(src: &mut BytesMut, max: usize) -> Result<Option<BytesMut>, FramingError> {
    match src.windows(2).position(|w| w == b"\r\n") {
        Some(size) if size > max => Err(FramingError::LineTooLong { size, max }),
        Some(pos) => {
            let mut line = src.split_to(pos + 2);
            line.truncate(pos);
            Ok(Some(line))
        }
        None if src.len() > max + 1 => Err(FramingError::LineTooLong {
            size: src.len(),
            max,
        }),
        None => Ok(None),
    }
}

fn parse_start_line(line: &[u8]) -> Result<PartialChunk, FramingError> {
    let invalid = || FramingError::InvalidStartLine {
        line: String::from_utf8_lossy(line).into_owned(),
    };
    let text = std::str::from_utf8(line).map_err(|_| invalid())?;
    let rest = text.strip_prefix("MSRP ").ok_or_else(invalid)?;
    let (tid, rest) = rest.split_once(' ').ok_or_else(invalid)?;
    let transaction_id = TransactionId::new(tid).map_err(|_| invalid())?;
    let (token, comment) = match rest.split_once(' ') {
        Some((token, comment)) => (token, Some(comment)),
        None => (rest, None),
    };
    let kind = if let Some(status) = parse_status_code(token) {
        ChunkKind::Response {
            status,
            comment: comment.filter(|c| !c.is_empty()).map(str::to_owned),
        }
    } else if comment.is_none()
        && let Some(method) = Method::parse(token)
    {
        ChunkKind::Request(method)
    } else {
        return Err(invalid());
    };
    Ok(PartialChunk::new(transaction_id, kind))
}

enum BodyScan {
    /// The end-line starts `body_len` bytes into the buffer.
    Complete { body_len: usize, flag: Flag },
    /// Resume searching at `resume_from` once more bytes arrive.
    Pending { resume_from: usize },
}

fn scan_body(src: &[u8], needle: &[u8], from: usize) -> BodyScan {
    let mut at = from;
    while let Some(found) = src
        .get(at..)
        .and_then(|rest| rest.windows(needle.len()).position(|w| w == needle))
    {
        let start = at + found;
        let tail = start + needle.len();
        let Some(terminator) = src.get(tail..tail + 3) else {
            return BodyScan::Pending { resume_from: start };
        };
        if let Some(flag) = Flag::from_byte(terminator[0])
            && &terminator[1..] == b"\r\n"
        {
            return BodyScan::Complete {
                body_len: start,
                flag,
            };
        }
        at = start + 1;
    }
    BodyScan::Pending {
        resume_from: src.len().saturating_sub(needle.len() - 1).max(at),
    }
}

/// Drive the state machine until a frame completes or input runs out.
pub(super) fn decode(
    state: &mut DecodeState,
    config: &CodecConfig,
    src: &mut BytesMut,
) -> Result<Option<Decoded>, super::CodecError> {
    loop {
        match std::mem::take(state) {
            DecodeState::StartLine => {
                let Some(line) = take_line(src, config.max_line_length)? else {
                    return Ok(None);
                };
                if line.is_empty() {
                    continue;
                }
                *state = DecodeState::Headers(parse_start_line(&line)?);
            }
            DecodeState::Headers(mut partial) => {
                let Some(line) = take_line(src, config.max_line_length)? else {
                    *state = DecodeState::Headers(partial);
                    return Ok(None);
                };
                if line.is_empty() {
                    let needle = boundary(&partial.transaction_id);
                    *state = DecodeState::Body {
                        partial,
                        needle,
                        search_from: 0,
                    };
                    continue;
                }
                if let Some(flag) = partial.end_line_flag(&line) {
                    return Ok(Some(partial.finish(None, flag)));
                }
                partial.header_lines += 1;
                if partial.header_lines > config.max_header_lines {
                    return Err(FramingError::TooManyHeaders {
                        max: config.max_header_lines,
                    }
                    .into());
                }
                partial.push_header_line(&line);
                *state = DecodeState::Headers(partial);
            }
            DecodeState::Body {
                partial,
                needle,
                search_from,
            } => match scan_body(src, &needle, search_from) {
                BodyScan::Complete { body_len, flag } => {
                    let body = src.split_to(body_len).freeze();
                    advance_past_end_line(src, &partial.transaction_id);
                    return Ok(Some(partial.finish(Some(body), flag)));
                }
                BodyScan::Pending { resume_from } => {
                    if src.len() > config.max_body_size + end_line_len(&partial.transaction_id) {
                        return Err(FramingError::UnterminatedBody {
                            max: config.max_body_size,
                        }
                        .into());
                    }
                    *state = DecodeState::Body {
                        partial,
                        needle,
                        search_from: resume_from,
                    };
                    return Ok(None);
                }
            },
        }
    }
}
