//! Token definitions and the keyword table.
//!
//! Each command keyword carries the number of bytes it contributes to the
//! output binary; pass one sums these to size the result before a single
//! byte is emitted.

use pyrite_core::commands::*;

/// Width selector for the `db`/`dw`/`dd`/`dq` data directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Byte,
    Word,
    DoubleWord,
    QuadWord,
}

/// What a token is, with the decoded payload for keyword kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Colon,
    Comma,
    /// Decimal integer literal, possibly negative.
    Integer,
    /// `$`-prefixed hexadecimal literal.
    Hexadecimal,
    /// A label definition or reference.
    Identifier,
    Boolean(u8),
    /// One of the note literals `c_` through `b_`, valued 1-12.
    Note(u8),
    Data(DataWidth),
    /// A command mnemonic carrying its opcode.
    Command(u8),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub lexeme: String,
    pub kind: TokenKind,
    /// Bytes this token contributes to the output binary.
    pub size: u8,
}

impl Token {
    /// The token's numeric value: parsed for integer literals, the payload
    /// for booleans and notes, zero otherwise.
    pub fn integer(&self) -> u64 {
        self.signed_integer() as u64
    }

    pub fn signed_integer(&self) -> i64 {
        match self.kind {
            TokenKind::Integer => self.lexeme.parse::<i64>().unwrap_or(0),
            TokenKind::Hexadecimal => i64::from_str_radix(&self.lexeme, 16).unwrap_or(0),
            TokenKind::Boolean(v) | TokenKind::Note(v) => v as i64,
            _ => 0,
        }
    }
}

struct Keyword {
    lexeme: &'static str,
    kind: TokenKind,
    size: u8,
}

static KEYWORDS: &[Keyword] = &[
    Keyword { lexeme: "true", kind: TokenKind::Boolean(1), size: 0 },
    Keyword { lexeme: "false", kind: TokenKind::Boolean(0), size: 0 },
    Keyword { lexeme: "c_", kind: TokenKind::Note(1), size: 0 },
    Keyword { lexeme: "c#", kind: TokenKind::Note(2), size: 0 },
    Keyword { lexeme: "d_", kind: TokenKind::Note(3), size: 0 },
    Keyword { lexeme: "d#", kind: TokenKind::Note(4), size: 0 },
    Keyword { lexeme: "e_", kind: TokenKind::Note(5), size: 0 },
    Keyword { lexeme: "f_", kind: TokenKind::Note(6), size: 0 },
    Keyword { lexeme: "f#", kind: TokenKind::Note(7), size: 0 },
    Keyword { lexeme: "g_", kind: TokenKind::Note(8), size: 0 },
    Keyword { lexeme: "g#", kind: TokenKind::Note(9), size: 0 },
    Keyword { lexeme: "a_", kind: TokenKind::Note(10), size: 0 },
    Keyword { lexeme: "a#", kind: TokenKind::Note(11), size: 0 },
    Keyword { lexeme: "b_", kind: TokenKind::Note(12), size: 0 },
    Keyword { lexeme: "db", kind: TokenKind::Data(DataWidth::Byte), size: 1 },
    Keyword { lexeme: "dw", kind: TokenKind::Data(DataWidth::Word), size: 2 },
    Keyword { lexeme: "dd", kind: TokenKind::Data(DataWidth::DoubleWord), size: 4 },
    Keyword { lexeme: "dq", kind: TokenKind::Data(DataWidth::QuadWord), size: 8 },
    Keyword { lexeme: "channel_count", kind: TokenKind::Command(CHANNEL_COUNT_CMD), size: 0 },
    Keyword { lexeme: "channel", kind: TokenKind::Command(CHANNEL_CMD), size: 9 },
    Keyword { lexeme: "note", kind: TokenKind::Command(NOTE_CMD), size: 1 },
    Keyword { lexeme: "drum_note", kind: TokenKind::Command(DRUM_NOTE_CMD), size: 1 },
    Keyword { lexeme: "rest", kind: TokenKind::Command(REST_CMD), size: 1 },
    Keyword { lexeme: "square_note", kind: TokenKind::Command(SQUARE_NOTE_CMD), size: 4 },
    Keyword { lexeme: "noise_note", kind: TokenKind::Command(NOISE_NOTE_CMD), size: 3 },
    Keyword { lexeme: "octave", kind: TokenKind::Command(OCTAVE_CMD), size: 1 },
    Keyword { lexeme: "note_type", kind: TokenKind::Command(NOTE_TYPE_CMD), size: 3 },
    Keyword { lexeme: "drum_speed", kind: TokenKind::Command(DRUM_SPEED_CMD), size: 2 },
    Keyword { lexeme: "transpose", kind: TokenKind::Command(TRANSPOSE_CMD), size: 2 },
    Keyword { lexeme: "tempo", kind: TokenKind::Command(TEMPO_CMD), size: 3 },
    Keyword { lexeme: "duty_cycle", kind: TokenKind::Command(DUTY_CYCLE_CMD), size: 2 },
    Keyword { lexeme: "volume_envelope", kind: TokenKind::Command(VOLUME_ENVELOPE_CMD), size: 2 },
    Keyword { lexeme: "pitch_sweep", kind: TokenKind::Command(PITCH_SWEEP_CMD), size: 2 },
    Keyword { lexeme: "duty_cycle_pattern", kind: TokenKind::Command(DUTY_CYCLE_PATTERN_CMD), size: 2 },
    Keyword { lexeme: "toggle_sfx", kind: TokenKind::Command(TOGGLE_SFX_CMD), size: 1 },
    Keyword { lexeme: "pitch_slide", kind: TokenKind::Command(PITCH_SLIDE_CMD), size: 3 },
    Keyword { lexeme: "vibrato", kind: TokenKind::Command(VIBRATO_CMD), size: 3 },
    Keyword { lexeme: "toggle_noise", kind: TokenKind::Command(TOGGLE_NOISE_CMD), size: 2 },
    Keyword { lexeme: "force_stereo_panning", kind: TokenKind::Command(FORCE_STEREO_PANNING_CMD), size: 2 },
    Keyword { lexeme: "volume", kind: TokenKind::Command(VOLUME_CMD), size: 2 },
    Keyword { lexeme: "pitch_offset", kind: TokenKind::Command(PITCH_OFFSET_CMD), size: 3 },
    Keyword { lexeme: "tempo_relative", kind: TokenKind::Command(TEMPO_RELATIVE_CMD), size: 2 },
    Keyword { lexeme: "restart_channel", kind: TokenKind::Command(RESTART_CHANNEL_CMD), size: 9 },
    Keyword { lexeme: "new_song", kind: TokenKind::Command(NEW_SONG_CMD), size: 3 },
    Keyword { lexeme: "sfx_priority_on", kind: TokenKind::Command(SFX_PRIORITY_ON_CMD), size: 1 },
    Keyword { lexeme: "sfx_priority_off", kind: TokenKind::Command(SFX_PRIORITY_OFF_CMD), size: 1 },
    Keyword { lexeme: "stereo_panning", kind: TokenKind::Command(STEREO_PANNING_CMD), size: 2 },
    Keyword { lexeme: "sfx_toggle_noise", kind: TokenKind::Command(SFX_TOGGLE_NOISE_CMD), size: 2 },
    Keyword { lexeme: "set_condition", kind: TokenKind::Command(SET_CONDITION_CMD), size: 2 },
    Keyword { lexeme: "sound_jump_if", kind: TokenKind::Command(SOUND_JUMP_IF_CMD), size: 10 },
    Keyword { lexeme: "sound_jump", kind: TokenKind::Command(SOUND_JUMP_CMD), size: 9 },
    Keyword { lexeme: "sound_loop", kind: TokenKind::Command(SOUND_LOOP_CMD), size: 10 },
    Keyword { lexeme: "sound_call", kind: TokenKind::Command(SOUND_CALL_CMD), size: 9 },
    Keyword { lexeme: "sound_ret", kind: TokenKind::Command(SOUND_RET_CMD), size: 1 },
    Keyword { lexeme: "toggle_perfect_pitch", kind: TokenKind::Command(TOGGLE_PERFECT_PITCH_CMD), size: 0 },
];

/// Looks up a lowercased lexeme in the keyword table, producing the keyword's
/// token when it matches.
pub fn lookup_keyword(lexeme: &str) -> Option<Token> {
    KEYWORDS.iter().find(|k| k.lexeme == lexeme).map(|k| Token {
        lexeme: k.lexeme.to_string(),
        kind: k.kind,
        size: k.size,
    })
}

#[cfg(test)]
mod token_tests {
    use super::*;

    #[test]
    fn keyword_lookup() {
        assert_eq!(lookup_keyword("sound_ret").unwrap().kind, TokenKind::Command(0xFF));
        assert_eq!(lookup_keyword("c#").unwrap().kind, TokenKind::Note(2));
        assert_eq!(lookup_keyword("dq").unwrap().size, 8);
        assert!(lookup_keyword("not_a_keyword").is_none());
        assert!(lookup_keyword("Sound_Ret").is_none());
    }

    #[test]
    fn integer_decoding() {
        let token = Token {
            lexeme: "-5".to_string(),
            kind: TokenKind::Integer,
            size: 0,
        };
        assert_eq!(token.signed_integer(), -5);

        let token = Token {
            lexeme: "1A".to_string(),
            kind: TokenKind::Hexadecimal,
            size: 0,
        };
        assert_eq!(token.integer(), 0x1A);

        let token = Token {
            lexeme: "b_".to_string(),
            kind: TokenKind::Note(12),
            size: 0,
        };
        assert_eq!(token.integer(), 12);
    }
}
