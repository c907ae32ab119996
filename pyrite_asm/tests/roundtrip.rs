//! Round-trip properties over the command grammar: pass one's size always
//! matches pass two's emission, assembly is deterministic, and saved output
//! reloads through the score store byte-for-byte.

use pyrite_asm::builder::Builder;
use pyrite_asm::lexer::Lexer;
use pyrite_core::store::AudioStore;

const FIXTURES: [&str; 10] = [
    // Minimal one-track song.
    "
Song: channel_count 1
      channel 1, Song_Ch1
Song_Ch1:
      note_type 12, 10, 3
      octave 4
      note c_, 4
      sound_ret
",
    // Calls, loops and two channels.
    "
Intro: channel_count 2
       channel 1, .pulse1
       channel 2, .pulse2
.pulse1:
       tempo 288
       volume 7, 7
       note_type 12, 11, 2
       octave 3
       note e_, 2
       sound_call .riff
       sound_loop 3, .pulse1
       sound_ret
.riff:
       note g_, 2
       note a#, 2
       sound_ret
.pulse2:
       duty_cycle 2
       vibrato 8, 2, 4
       octave 4
       note c_, 8
       sound_ret
",
    // Drum track with an endless loop.
    "
Drums: channel_count 1
       channel 4, .main
.main: toggle_noise 3
       drum_speed 6
       drum_note 4, 8
       drum_note 6, 8
       sound_loop 0, .main
",
    // Raw SFX notes on a pulse and the noise channel.
    "
Sfx_Hit: channel_count 2
       channel 5, .sq
       channel 8, .noise
.sq:   duty_cycle 2
       square_note 8, 12, -3, $6C0
       square_note 4, 8, 2, $680
       sound_ret
.noise:
       noise_note 8, 13, 1, 68
       sound_ret
",
    // Panning, pitch and the legacy commands.
    "
Route: channel_count 1
       channel 2, .m
.m:    stereo_panning true, false
       force_stereo_panning false, true
       pitch_offset 16
       tempo_relative -12
       transpose 1, 2
       pitch_slide 2, 4, g#
       pitch_sweep 8, -7
       duty_cycle_pattern 0, 1, 2, 3
       toggle_sfx
       sfx_priority_on
       sfx_priority_off
       new_song 42
       restart_channel 0
       toggle_perfect_pitch
       sound_ret
",
    // Bare data directives.
    "
Blob: db 1
      db $FF
      dw $1234
      dd 305419896
      dq 81985529216486895
",
    // Conditional jumps.
    "
Branchy: channel_count 1
      channel 1, .top
.top: set_condition 3
      sound_jump_if 3, .skip
      rest 1
.skip:
      sound_ret
",
    // Cry-flavored material.
    "
Cry: channel_count 1
     channel 1, .voice
.voice:
     pitch_offset 128
     volume_envelope 15, -2
     octave 5
     note d_, 6
     rest 2
     note d#, 6
     sound_ret
",
    // A chromatic run over every note literal.
    "
Scale: channel_count 1
       channel 1, .run
.run:  note_type 8, 12, 4
       octave 4
       note c_, 1
       note c#, 1
       note d_, 1
       note d#, 1
       note e_, 1
       note f_, 1
       note f#, 1
       note g_, 1
       note g#, 1
       note a_, 1
       note a#, 1
       note b_, 1
       sound_ret
",
    // Two songs in one file.
    "
One: channel_count 1
     channel 1, .a
.a:  note c_, 1
     sound_ret
Two: channel_count 1
     channel 3, .b
.b:  note g_, 16
     sound_ret
",
];

fn assemble(source: &str) -> (Vec<u8>, usize, u16) {
    let mut lexer = Lexer::new();
    lexer.lex_source(source).unwrap();
    let mut builder = Builder::new(lexer.tokens());
    builder.pass_one().unwrap();
    builder.pass_two().unwrap();
    (
        builder.binary().to_vec(),
        builder.expected_size(),
        builder.audio_count(),
    )
}

#[test]
fn pass_sizes_agree_for_all_fixtures() {
    for (i, source) in FIXTURES.iter().enumerate() {
        let (binary, expected, _) = assemble(source);
        assert_eq!(binary.len(), expected, "fixture #{} size mismatch", i);
    }
}

#[test]
fn assembly_is_deterministic() {
    for source in FIXTURES.iter() {
        let (a, _, _) = assemble(source);
        let (b, _, _) = assemble(source);
        assert_eq!(a, b);
    }
}

#[test]
fn saved_output_reloads_byte_for_byte() {
    for (i, source) in FIXTURES.iter().enumerate() {
        let mut lexer = Lexer::new();
        lexer.lex_source(source).unwrap();
        let mut builder = Builder::new(lexer.tokens());
        builder.pass_one().unwrap();
        builder.pass_two().unwrap();

        let path = std::env::temp_dir().join(format!(
            "pyrite_roundtrip_{}_{}.gsca",
            std::process::id(),
            i
        ));
        builder.save(&path).unwrap();

        let mut store = AudioStore::new();
        store.read_audio_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(store.data(), builder.binary(), "fixture #{} data", i);
        assert_eq!(store.audio_count(), builder.audio_count() as usize);
    }
}

#[test]
fn handle_offsets_match_labels() {
    let source = FIXTURES[9];
    let mut lexer = Lexer::new();
    lexer.lex_source(source).unwrap();
    let mut builder = Builder::new(lexer.tokens());
    builder.pass_one().unwrap();
    builder.pass_two().unwrap();

    let path = std::env::temp_dir().join(format!("pyrite_offsets_{}.gsca", std::process::id()));
    builder.save(&path).unwrap();

    let mut store = AudioStore::new();
    store.read_audio_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(store.audio_count(), 2);
    assert_eq!(
        store.handle_by_name("One").unwrap().offset(),
        builder.label_offset("One").unwrap()
    );
    assert_eq!(
        store.handle_by_name("Two").unwrap().offset(),
        builder.label_offset("Two").unwrap()
    );
}
