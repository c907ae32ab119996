//! The two-pass score builder.
//!
//! Pass one walks the token stream to collect labels (with their output
//! offsets) and the total binary size; pass two walks it again emitting
//! bytes, resolving label references to 8-byte offsets. Labels whose first
//! command is `channel_count` become entries in the output handle table.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use pyrite_core::commands::*;
use pyrite_core::store::{AUDIO_FILE_MAGIC, HANDLE_NAME_LEN, MAJOR_VERSION, MINOR_VERSION};

use super::token::{DataWidth, Token, TokenKind};

#[derive(Debug)]
pub enum BuildError {
    /// The token stream did not match a command's expected arguments
    Syntax(String),
    /// A label reference never got a definition
    UnknownLabel(String),
    /// Pass two emitted a different number of bytes than pass one measured
    SizeMismatch { expected: usize, actual: usize },
    /// The operation involved file I/O which failed, providing the underlying io::Error
    Io(io::Error),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            BuildError::Syntax(ref s) => write!(f, "Syntax error: {}", s),
            BuildError::UnknownLabel(ref s) => write!(f, "Label '{}' is not defined", s),
            BuildError::SizeMismatch { expected, actual } => write!(
                f,
                "Pass two emitted {} bytes where pass one measured {}",
                actual, expected
            ),
            BuildError::Io(ref e) => write!(f, "I/O Error: {}", e),
        }
    }
}

impl From<io::Error> for BuildError {
    fn from(e: io::Error) -> Self {
        BuildError::Io(e)
    }
}

struct Label {
    name: String,
    offset: u64,
    /// Whether this label heads a score and belongs in the handle table.
    start: bool,
}

pub struct Builder<'a> {
    tokens: &'a [Token],
    pos: usize,
    parent_label: String,
    labels: Vec<Label>,
    binary: Vec<u8>,
    binary_size: usize,
    audio_count: u16,
    channel_count: u8,
}

impl<'a> Builder<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Builder {
            tokens,
            pos: 0,
            parent_label: String::new(),
            labels: Vec::new(),
            binary: Vec::new(),
            binary_size: 0,
            audio_count: 0,
            channel_count: 0,
        }
    }

    /// Bytes the output will occupy, as measured by pass one.
    pub fn expected_size(&self) -> usize {
        self.binary_size
    }

    /// The encoded score data produced by pass two.
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Number of handle-table entries the output will carry.
    pub fn audio_count(&self) -> u16 {
        self.audio_count
    }

    /// Resolved offset of a label, if pass one saw it.
    pub fn label_offset(&self, name: &str) -> Option<u64> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.offset)
    }

    /// Collects labels and sizes the output.
    pub fn pass_one(&mut self) -> Result<(), BuildError> {
        self.pos = 0;
        self.parent_label.clear();

        while let Some(token) = self.next() {
            if token.kind == TokenKind::Identifier && self.expect_colon() {
                // Tolerate a double colon on exported labels.
                self.expect_colon();
                self.add_label(&token.lexeme);
            }
            self.binary_size += token.size as usize;
        }

        Ok(())
    }

    /// Emits the binary. Must run after `pass_one`.
    pub fn pass_two(&mut self) -> Result<(), BuildError> {
        self.pos = 0;
        self.parent_label.clear();
        self.channel_count = 0;

        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Data(width) => self.parse_data(width)?,
                TokenKind::Command(opcode) => self.parse_command(opcode)?,
                TokenKind::Identifier => {
                    if !token.lexeme.starts_with('.') && self.expect_colon() {
                        self.expect_colon();
                        self.parent_label = token.lexeme.clone();
                    }
                }
                _ => {}
            }
        }

        if self.binary.len() != self.binary_size {
            return Err(BuildError::SizeMismatch {
                expected: self.binary_size,
                actual: self.binary.len(),
            });
        }

        Ok(())
    }

    /// Writes the finished score binary: header, one handle entry per start
    /// label, then the encoded data.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BuildError> {
        let mut file = File::create(path.as_ref())?;

        file.write_all(&AUDIO_FILE_MAGIC)?;
        file.write_all(&[MAJOR_VERSION, MINOR_VERSION])?;
        file.write_all(&self.audio_count.to_le_bytes())?;

        for label in self.labels.iter().filter(|l| l.start) {
            let mut name = [0u8; HANDLE_NAME_LEN];
            let len = label.name.len().min(HANDLE_NAME_LEN - 1);
            name[..len].copy_from_slice(&label.name.as_bytes()[..len]);
            file.write_all(&name)?;
            file.write_all(&label.offset.to_le_bytes())?;
        }

        file.write_all(&self.binary)?;

        Ok(())
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tokens: &'a [Token] = self.tokens;
        let token = tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self, offset: usize) -> Option<&'a Token> {
        let tokens: &'a [Token] = self.tokens;
        tokens.get(self.pos + offset)
    }

    /// Consumes the next token if it is a colon.
    fn expect_colon(&mut self) -> bool {
        if matches!(self.peek(0).map(|t| t.kind), Some(TokenKind::Colon)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn comma(&mut self, arg: usize) -> Result<(), BuildError> {
        if matches!(self.peek(0).map(|t| t.kind), Some(TokenKind::Comma)) {
            self.pos += 1;
            Ok(())
        } else {
            Err(BuildError::Syntax(format!(
                "expected ',' after argument #{}",
                arg
            )))
        }
    }

    /// Reads a numeric argument, returning its unsigned and signed views.
    fn number(&mut self, arg: usize) -> Result<(u64, i64), BuildError> {
        match self.next() {
            None => Err(BuildError::Syntax(format!(
                "unexpected end of token stream while parsing numeric argument #{}",
                arg
            ))),
            Some(token) => match token.kind {
                TokenKind::Integer
                | TokenKind::Hexadecimal
                | TokenKind::Boolean(_)
                | TokenKind::Note(_) => Ok((token.integer(), token.signed_integer())),
                _ => Err(BuildError::Syntax(format!(
                    "expected numeric token for argument #{}, found '{}'",
                    arg, token.lexeme
                ))),
            },
        }
    }

    /// Reads a label-reference argument and resolves it to an offset.
    fn label_ref(&mut self, arg: usize) -> Result<u64, BuildError> {
        match self.next() {
            None => Err(BuildError::Syntax(format!(
                "unexpected end of token stream while parsing label argument #{}",
                arg
            ))),
            Some(token) => {
                if token.kind != TokenKind::Identifier {
                    return Err(BuildError::Syntax(format!(
                        "expected identifier token for label argument #{}, found '{}'",
                        arg, token.lexeme
                    )));
                }
                let resolved = self.resolve_name(&token.lexeme);
                self.labels
                    .iter()
                    .find(|l| l.name == resolved)
                    .map(|l| l.offset)
                    .ok_or(BuildError::UnknownLabel(resolved))
            }
        }
    }

    /// A `.sublabel` resolves against the enclosing parent label.
    fn resolve_name(&self, lexeme: &str) -> String {
        if lexeme.starts_with('.') {
            format!("{}{}", self.parent_label, lexeme)
        } else {
            lexeme.to_string()
        }
    }

    fn add_label(&mut self, lexeme: &str) {
        let child = lexeme.starts_with('.');
        let resolved = self.resolve_name(lexeme);
        if !child {
            self.parent_label = lexeme.to_string();
        }

        let mut start = false;
        if !child {
            if let Some(peeked) = self.peek(0) {
                if peeked.kind == TokenKind::Command(CHANNEL_COUNT_CMD) {
                    start = true;
                    self.audio_count += 1;
                }
            }
        }

        self.labels.push(Label {
            name: resolved,
            offset: self.binary_size as u64,
            start,
        });
    }

    fn push_byte(&mut self, value: u8) {
        self.binary.push(value);
    }

    fn push_word(&mut self, value: u16) {
        self.binary.extend_from_slice(&value.to_le_bytes());
    }

    fn push_word_be(&mut self, value: u16) {
        self.binary.extend_from_slice(&value.to_be_bytes());
    }

    fn push_dword(&mut self, value: u32) {
        self.binary.extend_from_slice(&value.to_le_bytes());
    }

    fn push_qword(&mut self, value: u64) {
        self.binary.extend_from_slice(&value.to_le_bytes());
    }

    /// Encodes a volume nibble paired with a signed fade: negative fades set
    /// the direction bit with the magnitude in the low bits.
    fn fade_byte(volume: u64, fade: i64) -> u8 {
        let volume = (volume as u8 & 0xF) << 4;
        if fade < 0 {
            volume | 0b1000 | ((-fade) as u8 & 0x7)
        } else {
            volume | (fade as u8 & 0xF)
        }
    }

    fn parse_data(&mut self, width: DataWidth) -> Result<(), BuildError> {
        let (value, _) = self.number(1)?;
        match width {
            DataWidth::Byte => self.push_byte(value as u8),
            DataWidth::Word => self.push_word(value as u16),
            DataWidth::DoubleWord => self.push_dword(value as u32),
            DataWidth::QuadWord => self.push_qword(value),
        }
        Ok(())
    }

    fn parse_command(&mut self, opcode: u8) -> Result<(), BuildError> {
        match opcode {
            CHANNEL_COUNT_CMD => {
                let (count, _) = self.number(1)?;
                if !(1..=4).contains(&count) {
                    return Err(BuildError::Syntax(
                        "channel count must be between 1 and 4".to_string(),
                    ));
                }
                self.channel_count = (count - 1) as u8;
            }
            CHANNEL_CMD => {
                let (channel, _) = self.number(1)?;
                self.comma(1)?;
                let offset = self.label_ref(2)?;
                if !(1..=8).contains(&channel) {
                    return Err(BuildError::Syntax(
                        "channel ID must be between 1 and 8".to_string(),
                    ));
                }
                // Only the first channel header after channel_count carries
                // the count in bits 6-7.
                self.push_byte((self.channel_count << 6) | ((channel - 1) as u8 & 0xF));
                self.push_qword(offset);
                self.channel_count = 0;
            }
            NOTE_CMD | DRUM_NOTE_CMD => {
                let (pitch, _) = self.number(1)?;
                self.comma(1)?;
                let (length, _) = self.number(2)?;
                self.push_byte(((pitch as u8 & 0xF) << 4) | (length.wrapping_sub(1) as u8 & 0xF));
            }
            REST_CMD => {
                let (length, _) = self.number(1)?;
                self.push_byte(length.wrapping_sub(1) as u8 & 0xF);
            }
            SQUARE_NOTE_CMD => {
                let (length, _) = self.number(1)?;
                self.comma(1)?;
                let (volume, _) = self.number(2)?;
                self.comma(2)?;
                let (_, fade) = self.number(3)?;
                self.comma(3)?;
                let (frequency, _) = self.number(4)?;
                self.push_byte(length as u8);
                self.push_byte(Self::fade_byte(volume, fade));
                self.push_word(frequency as u16);
            }
            NOISE_NOTE_CMD => {
                let (length, _) = self.number(1)?;
                self.comma(1)?;
                let (volume, _) = self.number(2)?;
                self.comma(2)?;
                let (_, fade) = self.number(3)?;
                self.comma(3)?;
                let (frequency, _) = self.number(4)?;
                self.push_byte(length as u8);
                self.push_byte(Self::fade_byte(volume, fade));
                self.push_byte(frequency as u8);
            }
            OCTAVE_CMD => {
                let (octave, _) = self.number(1)?;
                if !(1..=8).contains(&octave) {
                    return Err(BuildError::Syntax(
                        "octave must be between 1 and 8".to_string(),
                    ));
                }
                self.push_byte(OCTAVE_CMD + 8 - octave as u8);
            }
            NOTE_TYPE_CMD => {
                let (length, _) = self.number(1)?;
                self.comma(1)?;
                let (volume, _) = self.number(2)?;
                self.comma(2)?;
                let (_, fade) = self.number(3)?;
                self.push_byte(NOTE_TYPE_CMD);
                self.push_byte(length as u8);
                self.push_byte(Self::fade_byte(volume, fade));
            }
            DRUM_SPEED_CMD => {
                let (length, _) = self.number(1)?;
                self.push_byte(NOTE_TYPE_CMD);
                self.push_byte(length as u8);
            }
            TRANSPOSE_CMD => {
                let (octaves, _) = self.number(1)?;
                self.comma(1)?;
                let (pitches, _) = self.number(2)?;
                self.push_byte(TRANSPOSE_CMD);
                self.push_byte(((octaves as u8 & 0xF) << 4) | (pitches as u8 & 0xF));
            }
            TEMPO_CMD => {
                let (tempo, _) = self.number(1)?;
                self.push_byte(TEMPO_CMD);
                self.push_word_be(tempo as u16);
            }
            DUTY_CYCLE_CMD => {
                let (duty, _) = self.number(1)?;
                self.push_byte(DUTY_CYCLE_CMD);
                self.push_byte(duty as u8);
            }
            VOLUME_ENVELOPE_CMD => {
                let (volume, _) = self.number(1)?;
                self.comma(1)?;
                let (_, fade) = self.number(2)?;
                self.push_byte(VOLUME_ENVELOPE_CMD);
                self.push_byte(Self::fade_byte(volume, fade));
            }
            PITCH_SWEEP_CMD => {
                let (length, _) = self.number(1)?;
                self.comma(1)?;
                let (_, fade) = self.number(2)?;
                self.push_byte(PITCH_SWEEP_CMD);
                self.push_byte(Self::fade_byte(length, fade));
            }
            DUTY_CYCLE_PATTERN_CMD => {
                let (a, _) = self.number(1)?;
                self.comma(1)?;
                let (b, _) = self.number(2)?;
                self.comma(2)?;
                let (c, _) = self.number(3)?;
                self.comma(3)?;
                let (d, _) = self.number(4)?;
                self.push_byte(DUTY_CYCLE_PATTERN_CMD);
                self.push_byte(
                    ((a as u8 & 0b11) << 6)
                        | ((b as u8 & 0b11) << 4)
                        | ((c as u8 & 0b11) << 2)
                        | (d as u8 & 0b11),
                );
            }
            TOGGLE_SFX_CMD | SFX_PRIORITY_ON_CMD | SFX_PRIORITY_OFF_CMD | SOUND_RET_CMD => {
                self.push_byte(opcode);
            }
            PITCH_SLIDE_CMD => {
                let (duration, _) = self.number(1)?;
                self.comma(1)?;
                let (octave, _) = self.number(2)?;
                self.comma(2)?;
                let (note, _) = self.number(3)?;
                self.push_byte(PITCH_SLIDE_CMD);
                self.push_byte(duration.wrapping_sub(1) as u8);
                self.push_byte((8u8.wrapping_sub(octave as u8) << 4) | (note as u8 % 12));
            }
            VIBRATO_CMD => {
                let (delay, _) = self.number(1)?;
                self.comma(1)?;
                let (extent, _) = self.number(2)?;
                self.comma(2)?;
                let (rate, _) = self.number(3)?;
                self.push_byte(VIBRATO_CMD);
                self.push_byte(delay as u8);
                self.push_byte(((extent as u8 & 0xF) << 4) | (rate as u8 & 0xF));
            }
            TOGGLE_NOISE_CMD | SFX_TOGGLE_NOISE_CMD => {
                let (set, _) = self.number(1)?;
                self.push_byte(opcode);
                self.push_byte(set as u8);
            }
            FORCE_STEREO_PANNING_CMD | STEREO_PANNING_CMD => {
                let (left, _) = self.number(1)?;
                self.comma(1)?;
                let (right, _) = self.number(2)?;
                self.push_byte(opcode);
                let left = if left != 0 { 0b1111 } else { 0 };
                let right = if right != 0 { 0b1111 } else { 0 };
                self.push_byte((left << 4) | right);
            }
            VOLUME_CMD => {
                let (left, _) = self.number(1)?;
                self.comma(1)?;
                let (right, _) = self.number(2)?;
                self.push_byte(VOLUME_CMD);
                self.push_byte(((left as u8 & 0xF) << 4) | (right as u8 & 0xF));
            }
            PITCH_OFFSET_CMD => {
                let (offset, _) = self.number(1)?;
                self.push_byte(PITCH_OFFSET_CMD);
                self.push_word_be(offset as u16);
            }
            TEMPO_RELATIVE_CMD => {
                let (delta, _) = self.number(1)?;
                self.push_byte(TEMPO_RELATIVE_CMD);
                self.push_byte(delta as u8);
            }
            RESTART_CHANNEL_CMD => {
                let (address, _) = self.number(1)?;
                self.push_byte(RESTART_CHANNEL_CMD);
                self.push_qword(address);
            }
            NEW_SONG_CMD => {
                let (song, _) = self.number(1)?;
                self.push_byte(NEW_SONG_CMD);
                self.push_word(song as u16);
            }
            SET_CONDITION_CMD => {
                let (condition, _) = self.number(1)?;
                self.push_byte(SET_CONDITION_CMD);
                self.push_byte(condition as u8);
            }
            SOUND_JUMP_IF_CMD | SOUND_LOOP_CMD => {
                let (param, _) = self.number(1)?;
                self.comma(1)?;
                let offset = self.label_ref(2)?;
                self.push_byte(opcode);
                self.push_byte(param as u8);
                self.push_qword(offset);
            }
            SOUND_JUMP_CMD | SOUND_CALL_CMD => {
                let offset = self.label_ref(1)?;
                self.push_byte(opcode);
                self.push_qword(offset);
            }
            TOGGLE_PERFECT_PITCH_CMD => {}
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod builder_tests {
    use super::super::lexer::Lexer;
    use super::*;

    fn build(source: &str) -> Builder {
        // Leak the tokens so the builder can borrow them in a test helper.
        let mut lexer = Lexer::new();
        lexer.lex_source(source).unwrap();
        let tokens: &'static [Token] = Box::leak(lexer.tokens().to_vec().into_boxed_slice());
        let mut builder = Builder::new(tokens);
        builder.pass_one().unwrap();
        builder.pass_two().unwrap();
        builder
    }

    const SONG: &str = "
Song: channel_count 1
      channel 1, Song_Ch1
Song_Ch1:
      note_type 12, 10, 3
      octave 4
      note c_, 4
      sound_ret
";

    #[test]
    fn golden_song_encoding() {
        let builder = build(SONG);
        let mut expected = vec![0x00];
        expected.extend_from_slice(&9u64.to_le_bytes());
        expected.extend_from_slice(&[0xD8, 12, 0xA3, 0xD4, 0x13, 0xFF]);

        assert_eq!(builder.binary(), expected.as_slice());
        assert_eq!(builder.expected_size(), builder.binary().len());
        assert_eq!(builder.audio_count(), 1);
        assert_eq!(builder.label_offset("Song"), Some(0));
        assert_eq!(builder.label_offset("Song_Ch1"), Some(9));
    }

    #[test]
    fn sublabels_resolve_against_parent() {
        let builder = build(
            "
Song: channel_count 1
      channel 1, .main
.main:
      sound_jump .main
",
        );
        assert_eq!(builder.label_offset("Song.main"), Some(9));
        // channel points at the sublabel, the jump loops back to it.
        assert_eq!(builder.binary()[1], 9);
        assert_eq!(builder.binary()[9], SOUND_JUMP_CMD);
        assert_eq!(builder.binary()[10], 9);
    }

    #[test]
    fn negative_fade_sets_direction_bit() {
        let builder = build("Fx: volume_envelope 10, -3\n    sound_ret\n");
        assert_eq!(builder.binary(), &[VOLUME_ENVELOPE_CMD, 0xAB, 0xFF]);
    }

    #[test]
    fn square_and_noise_notes() {
        let builder = build("Fx: square_note 16, 10, 1, $6E2\n    noise_note 32, 12, 1, 51\n");
        // Raw note data carries no opcode byte: length, volume/fade, then the
        // frequency (16-bit for square, 8-bit for noise).
        assert_eq!(
            builder.binary(),
            &[16, 0xA1, 0xE2, 0x06, 32, 0xC1, 51][..]
        );
    }

    #[test]
    fn multi_channel_header_counts_once() {
        let builder = build(
            "
Song: channel_count 2
      channel 1, .one
      channel 2, .two
.one: sound_ret
.two: sound_ret
",
        );
        // First header carries the count in bits 6-7, the second does not.
        assert_eq!(builder.binary()[0], 0b0100_0000);
        assert_eq!(builder.binary()[9], 0b0000_0001);
    }

    #[test]
    fn unknown_label_is_fatal() {
        let mut lexer = Lexer::new();
        lexer.lex_source("Song: channel_count 1\n channel 1, Nowhere\n").unwrap();
        let tokens = lexer.tokens().to_vec();
        let mut builder = Builder::new(&tokens);
        builder.pass_one().unwrap();
        assert!(matches!(
            builder.pass_two(),
            Err(BuildError::UnknownLabel(_))
        ));
    }

    #[test]
    fn jump_if_emits_its_own_opcode() {
        let builder = build(
            "
Song: channel_count 1
      channel 1, .a
.a:   set_condition 3
      sound_jump_if 3, .b
.b:   sound_ret
",
        );
        let body = &builder.binary()[9..];
        assert_eq!(body[0], SET_CONDITION_CMD);
        assert_eq!(body[2], SOUND_JUMP_IF_CMD);
    }

    #[test]
    fn pitch_slide_encoding() {
        let builder = build("Fx: pitch_slide 2, 4, c_\n");
        assert_eq!(builder.binary(), &[PITCH_SLIDE_CMD, 1, 0x41]);
    }

    #[test]
    fn tempo_is_big_endian() {
        let builder = build("Fx: tempo 320\n");
        assert_eq!(builder.binary(), &[TEMPO_CMD, 0x01, 0x40]);
    }
}
