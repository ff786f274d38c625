//! Line-oriented frame decoding for both joystick wire formats.
//!
//! Serial reads do not respect frame boundaries, so the parser keeps the
//! unterminated tail of every chunk and only decodes newline-terminated
//! lines. Decoding a line never fails the stream: a bad line is returned as
//! a [`DecodeError`] and the caller decides whether to log or count it.

use serde::{Deserialize, Serialize};

use crate::config::WireFormat;
use crate::errors::DecodeError;

/// Longest unterminated tail kept between chunks. Real frames are < 32 bytes.
pub const MAX_FRAME_LEN: usize = 256;

/// One decoded sample, in device-native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawReading {
    pub x: i32,
    pub y: i32,
    pub button: bool,
}

impl RawReading {
    #[inline]
    pub fn new(x: i32, y: i32, button: bool) -> Self {
        Self { x, y, button }
    }
}

impl WireFormat {
    /// Decode a single trimmed line.
    pub fn decode(self, line: &str) -> Result<RawReading, DecodeError> {
        match self {
            WireFormat::Tagged => decode_tagged(line),
            WireFormat::Delimited => decode_delimited(line),
        }
    }

    /// Render a reading without the line terminator.
    ///
    /// The tagged format only carries non-negative axis values; any reading
    /// it can carry decodes back to itself.
    pub fn encode(self, reading: &RawReading) -> String {
        let btn = u8::from(reading.button);
        match self {
            WireFormat::Tagged => format!("X:{} Y:{} BTN:{}", reading.x, reading.y, btn),
            WireFormat::Delimited => format!("{},{},{}", reading.x, reading.y, btn),
        }
    }
}

fn decode_tagged(line: &str) -> Result<RawReading, DecodeError> {
    let malformed = || DecodeError::MalformedFrame(line.to_string());

    let mut x = None;
    let mut y = None;
    let mut button = None;

    for token in line.split(' ') {
        let (key, value) = token.split_once(':').ok_or_else(malformed)?;
        let duplicate = match key {
            "X" => x.replace(parse_unsigned(value).ok_or_else(malformed)?).is_some(),
            "Y" => y.replace(parse_unsigned(value).ok_or_else(malformed)?).is_some(),
            "BTN" => button
                .replace(parse_button(value).ok_or_else(malformed)?)
                .is_some(),
            _ => return Err(malformed()),
        };
        if duplicate {
            return Err(malformed());
        }
    }

    match (x, y, button) {
        (Some(x), Some(y), Some(button)) => Ok(RawReading::new(x, y, button)),
        _ => Err(malformed()),
    }
}

fn decode_delimited(line: &str) -> Result<RawReading, DecodeError> {
    let malformed = || DecodeError::MalformedFrame(line.to_string());

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [x, y, btn] = fields.as_slice() else {
        return Err(malformed());
    };

    let x = x.parse::<i32>().map_err(|_| malformed())?;
    let y = y.parse::<i32>().map_err(|_| malformed())?;
    let button = parse_button(btn).ok_or_else(malformed)?;
    Ok(RawReading::new(x, y, button))
}

/// Plain decimal digits only: no sign, no whitespace.
fn parse_unsigned(value: &str) -> Option<i32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_button(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// Streaming decoder for one connection.
#[derive(Debug, Clone)]
pub struct FrameParser {
    format: WireFormat,
    /// Decoded text not yet terminated by a newline.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Inside an over-long line: drop everything up to the next newline.
    discarding: bool,
}

impl FrameParser {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            buffer: String::new(),
            pending: Vec::new(),
            discarding: false,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Bytes currently held back waiting for a line terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.pending.len()
    }

    /// Append a text chunk and iterate over every line it completes.
    ///
    /// Lines the iterator is not driven over stay buffered for the next call.
    pub fn parse(&mut self, chunk: &str) -> Frames<'_> {
        self.buffer.push_str(chunk);
        Frames { parser: self }
    }

    /// Like [`FrameParser::parse`] for raw transport bytes.
    ///
    /// A multi-byte sequence split across reads is completed on the next
    /// call; invalid sequences become U+FFFD and fail the line they land in.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.pending.extend_from_slice(bytes);

        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.pending.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    let good = &self.pending[consumed..consumed + valid];
                    self.buffer.push_str(&String::from_utf8_lossy(good));
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + bad;
                        }
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);

        Frames { parser: self }
    }

    /// Decode whatever unterminated text remains, e.g. at end of stream.
    pub fn finish(&mut self) -> Option<Result<RawReading, DecodeError>> {
        self.pending.clear();
        let tail = std::mem::take(&mut self.buffer);
        if std::mem::replace(&mut self.discarding, false) {
            return None;
        }
        let line = tail.trim();
        if line.is_empty() {
            return None;
        }
        Some(self.format.decode(line))
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending.clear();
        self.discarding = false;
    }
}

/// Lazy iterator over the complete lines of a [`FrameParser`] buffer.
pub struct Frames<'a> {
    parser: &'a mut FrameParser,
}

impl Iterator for Frames<'_> {
    type Item = Result<RawReading, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let parser = &mut *self.parser;
            if parser.discarding {
                match parser.buffer.find('\n') {
                    Some(end) => {
                        parser.buffer.drain(..=end);
                        parser.discarding = false;
                    }
                    None => {
                        parser.buffer.clear();
                        return None;
                    }
                }
            }

            let buffer = &mut parser.buffer;
            let Some(end) = buffer.find('\n') else {
                if buffer.len() > MAX_FRAME_LEN {
                    let dropped = buffer.len();
                    buffer.clear();
                    parser.discarding = true;
                    return Some(Err(DecodeError::MalformedFrame(format!(
                        "<{dropped} bytes without line terminator>"
                    ))));
                }
                return None;
            };

            let line: String = buffer.drain(..=end).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return Some(parser.format.decode(line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(parser: &mut FrameParser, chunk: &str) -> Vec<Result<RawReading, DecodeError>> {
        parser.parse(chunk).collect()
    }

    #[test]
    fn tagged_single_frame() {
        let mut parser = FrameParser::new(WireFormat::Tagged);
        assert_eq!(
            collect(&mut parser, "X:300 Y:700 BTN:0\n"),
            vec![Ok(RawReading::new(300, 700, false))]
        );
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn tagged_frame_split_across_chunks() {
        let mut parser = FrameParser::new(WireFormat::Tagged);
        assert!(collect(&mut parser, "X:300 Y:").is_empty());
        assert_eq!(
            collect(&mut parser, "700 BTN:1\n"),
            vec![Ok(RawReading::new(300, 700, true))]
        );
    }

    #[test]
    fn tagged_tokens_in_any_order() {
        assert_eq!(
            WireFormat::Tagged.decode("BTN:1 Y:5 X:1023"),
            Ok(RawReading::new(1023, 5, true))
        );
    }

    #[test]
    fn tagged_rejects_incomplete_or_noisy_lines() {
        for line in [
            "X:300 Y:700",
            "X:300 Y:700 BTN:2",
            "X:-3 Y:700 BTN:0",
            "X:300  Y:700 BTN:0",
            "X:300 Y:700 BTN:0 Z:1",
            "X:300 X:301 Y:700 BTN:0",
            "X: Y:700 BTN:0",
            "X:99999999999 Y:700 BTN:0",
        ] {
            assert!(
                WireFormat::Tagged.decode(line).is_err(),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn garbage_yields_malformed_frame() {
        let mut parser = FrameParser::new(WireFormat::Tagged);
        assert_eq!(
            collect(&mut parser, "garbage\n"),
            vec![Err(DecodeError::MalformedFrame("garbage".into()))]
        );
    }

    #[test]
    fn delimited_frames() {
        assert_eq!(
            WireFormat::Delimited.decode("512,0,1"),
            Ok(RawReading::new(512, 0, true))
        );
        assert_eq!(
            WireFormat::Delimited.decode(" 12 , -4 , 0 "),
            Ok(RawReading::new(12, -4, false))
        );
        for line in ["1,2", "1,2,3", "1,2,0,4", "a,2,0", "1,,0", "1,2,true"] {
            assert!(
                WireFormat::Delimited.decode(line).is_err(),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn formats_are_not_auto_detected() {
        assert!(WireFormat::Tagged.decode("1,2,0").is_err());
        assert!(WireFormat::Delimited.decode("X:1 Y:2 BTN:0").is_err());
    }

    #[test]
    fn concatenated_frames_keep_order() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        let frames = collect(&mut parser, "1,2,0\r\n\n  3,4,1\nbad\n5,6,0\n7,");
        assert_eq!(
            frames,
            vec![
                Ok(RawReading::new(1, 2, false)),
                Ok(RawReading::new(3, 4, true)),
                Err(DecodeError::MalformedFrame("bad".into())),
                Ok(RawReading::new(5, 6, false)),
            ]
        );
        assert_eq!(parser.buffered_len(), 2);
        assert_eq!(
            collect(&mut parser, "8,1\n"),
            vec![Ok(RawReading::new(7, 8, true))]
        );
    }

    #[test]
    fn unconsumed_lines_stay_buffered() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        let first = parser.parse("1,1,0\n2,2,0\n").next();
        assert_eq!(first, Some(Ok(RawReading::new(1, 1, false))));
        assert_eq!(
            collect(&mut parser, ""),
            vec![Ok(RawReading::new(2, 2, false))]
        );
    }

    #[test]
    fn overlong_line_is_dropped_up_to_its_newline() {
        let mut parser = FrameParser::new(WireFormat::Tagged);
        let noise = "x".repeat(MAX_FRAME_LEN + 1);
        let frames = collect(&mut parser, &noise);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_err());
        assert_eq!(parser.buffered_len(), 0);

        // Still the same physical line: nothing comes out of it.
        assert!(collect(&mut parser, "xxxx").is_empty());
        assert_eq!(
            collect(&mut parser, "X:1 Y:2 BTN:0\nX:3 Y:4 BTN:1\n"),
            vec![Ok(RawReading::new(3, 4, true))]
        );
    }

    #[test]
    fn tail_of_overlong_line_never_decodes() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        let frames = collect(&mut parser, &"9".repeat(MAX_FRAME_LEN + 1));
        assert!(matches!(frames.as_slice(), [Err(DecodeError::MalformedFrame(_))]));

        assert!(collect(&mut parser, "12,34,1\n").is_empty());
        assert_eq!(
            collect(&mut parser, "5,6,0\n"),
            vec![Ok(RawReading::new(5, 6, false))]
        );
    }

    #[test]
    fn overlong_line_cut_by_end_of_stream_yields_nothing() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        let _ = collect(&mut parser, &"9".repeat(MAX_FRAME_LEN + 1));
        assert!(collect(&mut parser, "12,34,1").is_empty());
        assert_eq!(parser.finish(), None);

        // finish() ends the line; the next one decodes normally.
        assert_eq!(
            collect(&mut parser, "1,2,0\n"),
            vec![Ok(RawReading::new(1, 2, false))]
        );
    }

    #[test]
    fn reset_leaves_discard_mode() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        let _ = collect(&mut parser, &"9".repeat(MAX_FRAME_LEN + 1));
        parser.reset();
        assert_eq!(
            collect(&mut parser, "1,2,1\n"),
            vec![Ok(RawReading::new(1, 2, true))]
        );
    }

    #[test]
    fn bytes_with_split_utf8_sequence() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        // "é" is 0xC3 0xA9; split it across two reads.
        assert!(parser.push_bytes(b"1,2,0\n\xC3").all(|r| r.is_ok()));
        let frames: Vec<_> = parser.push_bytes(b"\xA9\n3,4,1\n").collect();
        assert_eq!(
            frames,
            vec![
                Err(DecodeError::MalformedFrame("é".into())),
                Ok(RawReading::new(3, 4, true)),
            ]
        );
    }

    #[test]
    fn invalid_utf8_fails_only_its_line() {
        let mut parser = FrameParser::new(WireFormat::Delimited);
        let frames: Vec<_> = parser.push_bytes(b"1,\xFF,0\n2,2,1\n").collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1], Ok(RawReading::new(2, 2, true)));
    }

    #[test]
    fn finish_decodes_unterminated_tail() {
        let mut parser = FrameParser::new(WireFormat::Tagged);
        assert!(collect(&mut parser, "X:10 Y:20 BTN:1").is_empty());
        assert_eq!(parser.finish(), Some(Ok(RawReading::new(10, 20, true))));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn encoded_readings_parse_back() {
        let readings = [
            RawReading::new(0, 0, false),
            RawReading::new(512, 1024, true),
            RawReading::new(1023, 7, false),
        ];
        for format in [WireFormat::Tagged, WireFormat::Delimited] {
            let mut parser = FrameParser::new(format);
            for reading in readings {
                let line = format!("{}\n", format.encode(&reading));
                assert_eq!(collect(&mut parser, &line), vec![Ok(reading)]);
            }
        }
        let negative = RawReading::new(-5, 3, true);
        assert_eq!(
            WireFormat::Delimited.decode(&WireFormat::Delimited.encode(&negative)),
            Ok(negative)
        );
    }
}
