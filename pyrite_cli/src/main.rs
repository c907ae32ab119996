mod audio_driver;
mod time_source;

use clap::{App, Arg};
use log::*;

use pyrite_core::apu::Apu;
use pyrite_core::engine::AudioEngine;
use pyrite_core::store::AudioStore;
use pyrite_core::{DEFAULT_SAMPLE_RATE, FRAME_INTERVAL};

/// Nanoseconds per emulated master-clock tick (1e9 / 4194304).
const TICK_TIME_NS: u64 = 238;

fn main() {
    env_logger::init();
    let matches = App::new("pyrite")
        .version("0.1")
        .about("GBC score player; plays until interrupted")
        .arg(
            Arg::with_name("FILE")
                .value_name("FILE")
                .help("Score binary to load")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("song")
                .help("Name of the song to play (defaults to the first handle)")
                .short("s")
                .long("song")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("stereo")
                .help("Honor stereo panning commands in the score")
                .long("stereo"),
        )
        .get_matches();
    let score_file = matches.value_of("FILE").unwrap();

    let mut store = AudioStore::new();
    if let Err(e) = store.read_audio_file(score_file) {
        error!("Could not load score file '{}': {}", score_file, e);
        std::process::exit(1);
    }

    let song = match matches
        .value_of("song")
        .map(str::to_string)
        .or_else(|| store.handle_by_index(0).map(|h| h.name().to_string()))
    {
        Some(name) => name,
        None => {
            error!("Score file '{}' contains no songs.", score_file);
            std::process::exit(1);
        }
    };

    info!("Score entries:");
    for i in 0..store.audio_count() {
        let handle = store.handle_by_index(i).unwrap();
        info!("\t{:3}: {}", handle.id(), handle.name());
    }

    let mut engine = AudioEngine::power_on(Apu::with_sample_rate(DEFAULT_SAMPLE_RATE));
    engine.set_stereo(matches.is_present("stereo"));
    if !engine.play_music(&store, &song) {
        std::process::exit(1);
    }
    println!("Playing \"{}\" from {}", song, score_file);

    let audio_driver = audio_driver::AudioDriver::new(DEFAULT_SAMPLE_RATE, 100);
    let mut audio_sink = audio_driver.sink();
    let time_source = audio_driver.time_source();
    let start_time_ns = time_source.time_ns();

    let mut emulated_ticks: u64 = 0;
    let mut batch = Vec::new();

    loop {
        let target_emu_time_ns = time_source.time_ns() - start_time_ns;
        let target_emu_ticks = target_emu_time_ns / TICK_TIME_NS;

        batch.clear();
        while emulated_ticks < target_emu_ticks {
            emulated_ticks += 1;
            if engine.apu_mut().tick() {
                batch.push(engine.apu().current_sample());
            }
            if emulated_ticks % FRAME_INTERVAL as u64 == 0 {
                engine.update(&store);
            }
        }
        audio_sink.append(&batch);

        spin_sleep::sleep(std::time::Duration::from_millis(1));
    }
}
