//! Full pipeline: assemble a source, persist it, load it through the score
//! store and play it on the engine.

use pyrite_asm::builder::Builder;
use pyrite_asm::lexer::Lexer;
use pyrite_core::apu::Apu;
use pyrite_core::engine::AudioEngine;
use pyrite_core::store::AudioStore;
use pyrite_core::FRAME_INTERVAL;

fn assemble_to_store(source: &str, tag: &str) -> AudioStore {
    let mut lexer = Lexer::new();
    lexer.lex_source(source).unwrap();
    let mut builder = Builder::new(lexer.tokens());
    builder.pass_one().unwrap();
    builder.pass_two().unwrap();

    let path = std::env::temp_dir().join(format!(
        "pyrite_pipeline_{}_{}.gsca",
        std::process::id(),
        tag
    ));
    builder.save(&path).unwrap();

    let mut store = AudioStore::new();
    store.read_audio_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    store
}

#[test]
fn conditional_jump_is_taken_end_to_end() {
    let store = assemble_to_store(
        "
Song: channel_count 1
      channel 1, Song_Ch1
Song_Ch1:
      note_type 12, 10, 3
      set_condition 3
      sound_jump_if 3, .skip
      rest 1
      sound_ret
.skip:
      octave 4
      note c_, 1
      sound_ret
",
        "jump",
    );

    let mut engine = AudioEngine::power_on(Apu::power_on());
    assert!(engine.play_music(&store, "Song"));
    engine.update(&store);

    // The branch skipped the rest: the note's envelope (volume 10, fade 3)
    // reached pulse 1 and the channel triggered on.
    assert_eq!(engine.apu().read_nr12(), 0xA3);
    assert_eq!(engine.apu().read_nr52() & 0x1, 0x1);
}

#[test]
fn assembled_song_plays_audio() {
    let store = assemble_to_store(
        "
March: channel_count 2
       channel 1, .lead
       channel 2, .accomp
.lead: tempo 256
       note_type 8, 12, 2
       octave 4
       note c_, 4
       note e_, 4
       note g_, 4
       sound_loop 0, .lead
.accomp:
       note_type 8, 9, 3
       duty_cycle 1
       octave 3
       note c_, 8
       note g_, 8
       sound_loop 0, .accomp
",
        "march",
    );

    let mut engine = AudioEngine::power_on(Apu::power_on());
    assert!(engine.play_music(&store, "March"));

    let mut samples = Vec::new();
    for _ in 0..20 {
        engine.update(&store);
        for _ in 0..FRAME_INTERVAL {
            if engine.apu_mut().tick() {
                samples.push(engine.apu().current_sample());
            }
        }
    }

    assert!(samples.iter().any(|(l, r)| l.abs() > 0.05 || r.abs() > 0.05));
    // Both pulse channels are held on by the looping tracks.
    assert_eq!(engine.apu().read_nr52() & 0x3, 0x3);
}

#[test]
fn assembled_sfx_plays_and_retires() {
    let store = assemble_to_store(
        "
Thump: channel_count 1
       channel 5, .fx
.fx:   square_note 4, 12, 1, $700
       square_note 2, 8, 1, $680
       sound_ret
",
        "sfx",
    );

    let mut engine = AudioEngine::power_on(Apu::power_on());
    assert!(engine.play_sfx(&store, "Thump"));
    assert_eq!(engine.is_playing_sfx(), 4);

    // Two short notes then sound_ret: the SFX track retires by itself.
    for _ in 0..32 {
        engine.update(&store);
    }
    assert_eq!(engine.is_playing_sfx(), 0);
}
