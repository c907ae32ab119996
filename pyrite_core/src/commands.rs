//! Opcode values of the byte-coded command stream.
//!
//! Bytes below `FIRST_MUSIC_CMD` are notes or rests; everything at or above
//! it dispatches through the engine's command interpreter. The assembler
//! encodes against the same constants.

pub const CHANNEL_COUNT_CMD: u8 = 0xC0;
pub const CHANNEL_CMD: u8 = 0xC1;
pub const NOTE_CMD: u8 = 0xC2;
pub const DRUM_NOTE_CMD: u8 = 0xC3;
pub const REST_CMD: u8 = 0xC4;
pub const SQUARE_NOTE_CMD: u8 = 0xC5;
pub const NOISE_NOTE_CMD: u8 = 0xC6;
pub const DRUM_SPEED_CMD: u8 = 0xC7;
pub const TOGGLE_PERFECT_PITCH_CMD: u8 = 0xC8;

pub const OCTAVE_CMD: u8 = 0xD0;
pub const NOTE_TYPE_CMD: u8 = 0xD8;
pub const TRANSPOSE_CMD: u8 = 0xD9;
pub const TEMPO_CMD: u8 = 0xDA;
pub const DUTY_CYCLE_CMD: u8 = 0xDB;
pub const VOLUME_ENVELOPE_CMD: u8 = 0xDC;
pub const PITCH_SWEEP_CMD: u8 = 0xDD;
pub const DUTY_CYCLE_PATTERN_CMD: u8 = 0xDE;
pub const TOGGLE_SFX_CMD: u8 = 0xDF;
pub const PITCH_SLIDE_CMD: u8 = 0xE0;
pub const VIBRATO_CMD: u8 = 0xE1;
pub const TOGGLE_NOISE_CMD: u8 = 0xE3;
pub const FORCE_STEREO_PANNING_CMD: u8 = 0xE4;
pub const VOLUME_CMD: u8 = 0xE5;
pub const PITCH_OFFSET_CMD: u8 = 0xE6;
pub const TEMPO_RELATIVE_CMD: u8 = 0xE9;
pub const RESTART_CHANNEL_CMD: u8 = 0xEA;
pub const NEW_SONG_CMD: u8 = 0xEB;
pub const SFX_PRIORITY_ON_CMD: u8 = 0xEC;
pub const SFX_PRIORITY_OFF_CMD: u8 = 0xED;
pub const STEREO_PANNING_CMD: u8 = 0xEF;
pub const SFX_TOGGLE_NOISE_CMD: u8 = 0xF0;
pub const SET_CONDITION_CMD: u8 = 0xFA;
pub const SOUND_JUMP_IF_CMD: u8 = 0xFB;
pub const SOUND_JUMP_CMD: u8 = 0xFC;
pub const SOUND_LOOP_CMD: u8 = 0xFD;
pub const SOUND_CALL_CMD: u8 = 0xFE;
pub const SOUND_RET_CMD: u8 = 0xFF;

/// Lowest byte value interpreted as a command rather than a note.
pub const FIRST_MUSIC_CMD: u8 = OCTAVE_CMD;
