//! End-to-end scenarios for the engine driving the APU from score bytes.

use pyrite_core::apu::Apu;
use pyrite_core::engine::AudioEngine;
use pyrite_core::store::AudioStore;
use pyrite_core::FRAME_INTERVAL;

/// A score with one track on the given hardware channel.
fn one_channel_score(channel: u8, body: &[u8]) -> Vec<u8> {
    let mut score = vec![channel & 0x7];
    score.extend_from_slice(&9u64.to_le_bytes());
    score.extend_from_slice(body);
    score
}

#[test]
fn idle_engine_outputs_silence() {
    let store = AudioStore::new();
    let mut engine = AudioEngine::power_on(Apu::power_on());

    let mut produced = 0;
    let mut ticks: u64 = 0;
    while produced < 10_000 {
        ticks += 1;
        if engine.apu_mut().tick() {
            let (left, right) = engine.apu().current_sample();
            assert!(left.abs() + right.abs() < 1e-6);
            produced += 1;
        }
        if ticks % FRAME_INTERVAL as u64 == 0 {
            engine.update(&store);
        }
    }
}

#[test]
fn conditional_branch_ends_track_without_rest() {
    // set_condition 3; sound_jump_if 3, .skip; rest; .skip: note; sound_ret
    let mut body = vec![0xD8, 12, 0xA3]; // note_type 12, envelope
    body.extend_from_slice(&[0xFA, 3, 0xFB, 3]);
    let target = 9 + body.len() as u64 + 8 + 1;
    body.extend_from_slice(&target.to_le_bytes());
    body.push(0x00); // rest 1 — skipped when the branch is taken
    body.push(0xD4); // octave 4
    body.push(0x11); // note C
    body.push(0xFF);

    let mut store = AudioStore::new();
    store.add_audio("Song", &one_channel_score(0, &body)).unwrap();

    let mut engine = AudioEngine::power_on(Apu::power_on());
    assert!(engine.play_music(&store, "Song"));
    engine.update(&store);

    // The note after the branch target played: pulse 1 carries the track's
    // envelope rather than the cleared-channel envelope a rest would write.
    assert_eq!(engine.apu().read_nr12(), 0xA3);
    assert_eq!(engine.apu().read_nr52() & 0x1, 0x1);
}

#[test]
fn looping_song_streams_audio() {
    // An endless two-note loop on pulse 1.
    let mut body = vec![
        0xDA, 0x01, 0x00, // tempo 0x100
        0xD8, 6, 0xA2, // note_type 6, envelope
        0xD4, // octave 4
    ];
    let loop_target = 9 + body.len() as u64;
    body.push(0x12); // C
    body.push(0x52); // E
    body.push(0xFD);
    body.push(0x00);
    body.extend_from_slice(&loop_target.to_le_bytes());

    let mut store = AudioStore::new();
    store.add_audio("Loop", &one_channel_score(0, &body)).unwrap();

    let mut engine = AudioEngine::power_on(Apu::power_on());
    assert!(engine.play_music(&store, "Loop"));

    // Interleave frames and ticks the way a host would for ~30 frames.
    let mut samples = Vec::new();
    for _ in 0..30 {
        engine.update(&store);
        for _ in 0..FRAME_INTERVAL {
            if engine.apu_mut().tick() {
                samples.push(engine.apu().current_sample());
            }
        }
    }

    assert!(!samples.is_empty());
    assert!(samples.iter().any(|(l, _)| l.abs() > 0.05));
    assert!(samples
        .iter()
        .all(|(l, r)| l.is_finite() && r.is_finite() && l.abs() <= 1.5 && r.abs() <= 1.5));
    // The track is still looping after all those frames.
    assert_eq!(engine.apu().read_nr52() & 0x1, 0x1);
}

#[test]
fn sfx_beats_music_on_shared_channel() {
    // Music holds a long pulse-2 note; the SFX track then claims pulse 2.
    let music = one_channel_score(1, &[0xD8, 12, 0xB3, 0x1F, 0xFF]);
    let sfx = one_channel_score(5, &[0x20, 0xE1, 0x83, 0x07, 0xFF]);

    let mut store = AudioStore::new();
    store.add_audio("Music", &music).unwrap();
    store.add_audio("Hit", &sfx).unwrap();

    let mut engine = AudioEngine::power_on(Apu::power_on());
    engine.play_music(&store, "Music");
    engine.update(&store);
    assert_eq!(engine.apu().read_nr22(), 0xB3);

    engine.play_sfx(&store, "Hit");
    assert_eq!(engine.is_playing_sfx(), 5);
    engine.update(&store);
    // The SFX envelope landed on the shared hardware channel.
    assert_eq!(engine.apu().read_nr22(), 0xE1);
}

#[test]
fn engine_survives_malformed_stream() {
    // Unknown opcodes and a jump out of range must not hang or panic: the
    // cursor wraps and each frame still terminates.
    let mut body = vec![0xE2, 0xE7, 0xF1]; // unknown opcodes, ignored
    body.push(0xFC);
    body.extend_from_slice(&0xFFFF_FFFFu64.to_le_bytes()); // jump past the end

    let mut store = AudioStore::new();
    store.add_audio("Bad", &one_channel_score(0, &body)).unwrap();

    let mut engine = AudioEngine::power_on(Apu::power_on());
    engine.play_music(&store, "Bad");
    for _ in 0..10 {
        engine.update(&store);
    }
}
