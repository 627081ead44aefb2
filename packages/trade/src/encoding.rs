//! Streaming transcoding of legacy-encoded text into UTF-8.
//!
//! The trade matrix is published in ISO-8859-1, so it cannot be handed to
//! the CSV reader directly. [`DecodingReader`] wraps any [`Read`] and yields
//! UTF-8 bytes, failing on byte sequences the configured encoding cannot
//! represent instead of substituting replacement characters.

use std::io::{self, Read};

use encoding_rs::{Decoder, DecoderResult, Encoding};

use crate::TradeError;

/// Encoding label used when none is configured.
pub const DEFAULT_ENCODING: &str = "ISO-8859-1";

const INPUT_BUFFER_SIZE: usize = 16 * 1024;
// Large enough to hold the UTF-8 expansion of a full input buffer.
const OUTPUT_BUFFER_SIZE: usize = 3 * INPUT_BUFFER_SIZE + 16;

/// Resolves a WHATWG encoding label (e.g. `"ISO-8859-1"`, `"latin1"`,
/// `"utf-8"`).
///
/// # Errors
///
/// Returns [`TradeError::Encoding`] if the label is unknown.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding, TradeError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| TradeError::Encoding {
        message: format!("unknown text encoding '{label}'"),
    })
}

/// A malformed byte sequence found while decoding.
///
/// Travels inside an [`io::Error`] of kind `InvalidData` so it survives the
/// CSV reader; [`classify_csv_error`] turns it back into
/// [`TradeError::Encoding`].
#[derive(Debug, thiserror::Error)]
#[error("malformed {encoding} input near byte offset {offset}")]
pub struct DecodeFailure {
    pub encoding: &'static str,
    pub offset: u64,
}

/// A [`Read`] adapter that decodes `encoding` into UTF-8.
pub struct DecodingReader<R> {
    inner: R,
    encoding: &'static Encoding,
    decoder: Decoder,
    input: Box<[u8]>,
    in_start: usize,
    in_end: usize,
    output: Box<[u8]>,
    out_start: usize,
    out_end: usize,
    /// Input bytes consumed by the decoder so far.
    offset: u64,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    /// Wraps `inner`. A leading byte-order mark is stripped.
    #[must_use]
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            decoder: encoding.new_decoder_with_bom_removal(),
            input: vec![0; INPUT_BUFFER_SIZE].into_boxed_slice(),
            in_start: 0,
            in_end: 0,
            output: vec![0; OUTPUT_BUFFER_SIZE].into_boxed_slice(),
            out_start: 0,
            out_end: 0,
            offset: 0,
            eof: false,
            finished: false,
        }
    }

    fn refill_input(&mut self) -> io::Result<()> {
        loop {
            match self.inner.read(&mut self.input) {
                Ok(n) => {
                    self.in_start = 0;
                    self.in_end = n;
                    self.eof = n == 0;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Decodes until at least one output byte is available or the input is
    /// exhausted.
    fn fill_output(&mut self) -> io::Result<()> {
        self.out_start = 0;
        self.out_end = 0;

        while !self.finished {
            if self.in_start == self.in_end && !self.eof {
                self.refill_input()?;
            }

            let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
                &self.input[self.in_start..self.in_end],
                &mut self.output,
                self.eof,
            );
            self.in_start += read;
            self.offset += read as u64;
            self.out_end = written;

            match result {
                DecoderResult::Malformed(bad, _) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        DecodeFailure {
                            encoding: self.encoding.name(),
                            offset: self.offset.saturating_sub(u64::from(bad)),
                        },
                    ));
                }
                DecoderResult::InputEmpty if self.eof => self.finished = true,
                DecoderResult::InputEmpty | DecoderResult::OutputFull => {}
            }

            if written > 0 {
                break;
            }
        }

        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.out_start == self.out_end {
            self.fill_output()?;
        }

        let available = &self.output[self.out_start..self.out_end];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.out_start += n;
        Ok(n)
    }
}

/// Maps a CSV error to [`TradeError`], surfacing decode failures as
/// [`TradeError::Encoding`].
pub(crate) fn classify_csv_error(label: &str, err: csv::Error) -> TradeError {
    if let csv::ErrorKind::Io(io_err) = err.kind()
        && let Some(failure) = io_err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<DecodeFailure>())
    {
        return TradeError::Encoding {
            message: format!("{label}: {failure}"),
        };
    }

    TradeError::Csv {
        path: label.to_string(),
        source: err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8], label: &str) -> io::Result<String> {
        let mut reader = DecodingReader::new(bytes, encoding_for_label(label).unwrap());
        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        Ok(out)
    }

    #[test]
    fn decodes_latin1_bytes() {
        // "Côte d'Ivoire" in ISO-8859-1
        let bytes = b"C\xf4te d'Ivoire";
        assert_eq!(decode_all(bytes, "ISO-8859-1").unwrap(), "Côte d'Ivoire");
    }

    #[test]
    fn utf8_rejects_latin1_bytes() {
        let err = decode_all(b"C\xf4te d'Ivoire", "utf-8").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let failure = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<DecodeFailure>())
            .unwrap();
        assert_eq!(failure.encoding, "UTF-8");
    }

    #[test]
    fn passes_utf8_through() {
        assert_eq!(decode_all("Türkiye".as_bytes(), "utf-8").unwrap(), "Türkiye");
    }

    #[test]
    fn strips_utf8_bom() {
        assert_eq!(decode_all(b"\xef\xbb\xbfItem", "utf-8").unwrap(), "Item");
    }

    #[test]
    fn handles_input_larger_than_buffer() {
        let line = b"R\xe9union,Rice,100\n";
        let bytes: Vec<u8> = line.iter().copied().cycle().take(line.len() * 5_000).collect();
        let decoded = decode_all(&bytes, "latin1").unwrap();
        assert_eq!(decoded.lines().count(), 5_000);
        assert!(decoded.lines().all(|l| l == "Réunion,Rice,100"));
    }

    #[test]
    fn handles_tiny_read_buffers() {
        let mut reader =
            DecodingReader::new(&b"\xc5land"[..], encoding_for_label("latin1").unwrap());
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        while reader.read(&mut byte).unwrap() == 1 {
            out.push(byte[0]);
        }
        assert_eq!(String::from_utf8(out).unwrap(), "Åland");
    }

    #[test]
    fn unknown_label_is_an_encoding_error() {
        assert!(matches!(
            encoding_for_label("klingon-1"),
            Err(TradeError::Encoding { .. })
        ));
    }

    #[test]
    fn csv_decode_failure_becomes_encoding_error() {
        let reader = DecodingReader::new(&b"a,b\nC\xf4te,1\n"[..], encoding_rs::UTF_8);
        let mut csv_reader = csv::Reader::from_reader(reader);
        let err = csv_reader.records().find_map(Result::err).unwrap();
        assert!(matches!(
            classify_csv_error("matrix.csv", err),
            TradeError::Encoding { .. }
        ));
    }
}
