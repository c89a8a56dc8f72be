//! Streaming body decoding.
//!
//! Chunks are inflated and converted to text as they arrive. The accumulated
//! text is checked against a ceiling after every step, so a small compressed
//! body cannot balloon past the limit before it is noticed.

use std::io::Write;

use flate2::write::{MultiGzDecoder, ZlibDecoder};
use futures_util::StreamExt;

use crate::{transport::BodyStream, RequestError};

/// Ceiling on decoded response text, in characters.
pub const RESPONSE_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Compressed input is fed to the inflater in slices of this size.
const INFLATE_SLICE: usize = 4 * 1024;

/// Reads `body` to the end and returns its text, decoding `encoding`.
pub(crate) async fn body_to_text(
    body: BodyStream,
    encoding: &str,
) -> Result<String, RequestError> {
    body_to_text_limited(body, encoding, RESPONSE_MAX_SIZE).await
}

pub(crate) async fn body_to_text_limited(
    mut body: BodyStream,
    encoding: &str,
    limit: usize,
) -> Result<String, RequestError> {
    let mut inflater = Inflater::for_encoding(encoding)?;
    let mut text = TextAccumulator::new(limit);

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(RequestError::Stream)?;
        inflater.feed(&chunk, &mut text)?;
    }

    inflater.finish(&mut text)?;
    text.finish()
}

enum Inflater {
    Identity,
    Gzip(MultiGzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Inflater {
    fn for_encoding(encoding: &str) -> Result<Self, RequestError> {
        let encoding = encoding.trim();
        if encoding.eq_ignore_ascii_case("identity") {
            Ok(Self::Identity)
        } else if encoding.eq_ignore_ascii_case("gzip") {
            Ok(Self::Gzip(MultiGzDecoder::new(Vec::new())))
        } else if encoding.eq_ignore_ascii_case("deflate") {
            Ok(Self::Deflate(ZlibDecoder::new(Vec::new())))
        } else {
            Err(RequestError::UnsupportedEncoding(encoding.to_owned()))
        }
    }

    fn feed(&mut self, input: &[u8], text: &mut TextAccumulator) -> Result<(), RequestError> {
        match self {
            Self::Identity => text.push(input),
            Self::Gzip(decoder) => inflate_into(decoder, input, text),
            Self::Deflate(decoder) => inflate_into(decoder, input, text),
        }
    }

    fn finish(self, text: &mut TextAccumulator) -> Result<(), RequestError> {
        let tail = match self {
            Self::Identity => return Ok(()),
            Self::Gzip(decoder) => decoder.finish(),
            Self::Deflate(decoder) => decoder.finish(),
        };
        text.push(&tail.map_err(RequestError::stream)?)
    }
}

trait Inflate: Write {
    fn output(&mut self) -> &mut Vec<u8>;
}

impl Inflate for MultiGzDecoder<Vec<u8>> {
    fn output(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }
}

impl Inflate for ZlibDecoder<Vec<u8>> {
    fn output(&mut self) -> &mut Vec<u8> {
        self.get_mut()
    }
}

fn inflate_into<D: Inflate>(
    decoder: &mut D,
    input: &[u8],
    text: &mut TextAccumulator,
) -> Result<(), RequestError> {
    for slice in input.chunks(INFLATE_SLICE) {
        decoder.write_all(slice).map_err(RequestError::stream)?;
        let produced = std::mem::take(decoder.output());
        text.push(&produced)?;
    }
    Ok(())
}

/// UTF-8 text built from byte chunks that may split multi-byte sequences.
struct TextAccumulator {
    text: String,
    chars: usize,
    pending: Vec<u8>,
    limit: usize,
}

impl TextAccumulator {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            pending: Vec::new(),
            limit,
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), RequestError> {
        if bytes.is_empty() {
            return Ok(());
        }

        let joined: Vec<u8>;
        let mut rest: &[u8] = if self.pending.is_empty() {
            bytes
        } else {
            let mut buffer = std::mem::take(&mut self.pending);
            buffer.extend_from_slice(bytes);
            joined = buffer;
            &joined
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    self.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, invalid) = rest.split_at(err.valid_up_to());
                    self.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            self.push_replacement();
                            rest = &invalid[len..];
                        }
                        // Incomplete sequence at the end; wait for more bytes.
                        None => {
                            self.pending.extend_from_slice(invalid);
                            break;
                        }
                    }
                }
            }
        }

        self.check_limit()
    }

    fn push_str(&mut self, valid: &str) {
        self.chars += valid.chars().count();
        self.text.push_str(valid);
    }

    fn push_replacement(&mut self) {
        self.chars += 1;
        self.text.push(char::REPLACEMENT_CHARACTER);
    }

    fn check_limit(&mut self) -> Result<(), RequestError> {
        if self.chars > self.limit {
            self.chars = 0;
            self.text = String::new();
            self.pending = Vec::new();
            return Err(RequestError::PayloadTooLarge { limit: self.limit });
        }
        Ok(())
    }

    fn finish(mut self) -> Result<String, RequestError> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.push_replacement();
            self.check_limit()?;
        }
        Ok(self.text)
    }
}
