//! The score sequencer: an eight-virtual-channel interpreter that walks the
//! byte-coded command stream once per frame and drives the APU's registers.
//!
//! Channels 0-3 carry music, channels 4-7 carry sound effects; a music
//! channel and the SFX channel four above it share one hardware channel, with
//! the SFX side winning while it is on.

use super::apu::{Apu, Channel};
use super::commands::*;
use super::drums::{DRUMKITS, FREQUENCY_TABLE, WAVE_PATTERNS};
use super::store::AudioStore;
use super::{MAX_SIDE_VOLUME, MAX_VOLUME};

/// Number of music channels; SFX channels sit directly above them.
pub const MUSIC_CHANNEL_COUNT: usize = 4;

/// Total virtual channels walked per frame.
pub const VIRTUAL_CHANNEL_COUNT: usize = 8;

/// Index of the first SFX channel (pulse 1's SFX pair).
const SFX_CHANNEL_1: usize = 4;

/// Panning bits per hardware channel: left and right enable for channel
/// `i` live at bits `i+4` and `i`. Mono and stereo use the same bits, the
/// difference being which panning commands are honored.
const TRACK_PANNING: [u8; 4] = [0x11, 0x22, 0x44, 0x88];

/// Per-virtual-channel interpreter state. Reset to defaults every time a new
/// score is loaded onto the channel.
#[derive(Default)]
struct VirtualChannel {
    // Control flags.
    channel_on: bool,
    subroutine: bool,
    looping: bool,
    sfx: bool,
    noise: bool,
    cry: bool,
    vibrato: bool,
    pitch_slide: bool,
    duty_loop: bool,
    pitch_offset_enabled: bool,
    vibrato_dir: bool,
    pitch_slide_dir: bool,

    // Per-note flags, latched during a frame and cleared after dispatch.
    duty_override: bool,
    freq_override: bool,
    pitch_sweep: bool,
    noise_sampling: bool,
    rest: bool,
    vibrato_override: bool,

    music_id: u16,
    music_address: u64,
    last_music_address: u64,

    condition: u8,
    duty_cycle: u8,
    volume_envelope: u8,
    frequency: u16,
    pitch: u8,
    octave: u8,
    transposition: u8,
    note_duration: u8,
    note_duration_fraction: u16,
    loop_count: u8,
    tempo: u16,
    tracks: u8,
    duty_cycle_pattern: u8,

    vibrato_delay_count: u8,
    vibrato_delay: u8,
    vibrato_extent: u8,
    vibrato_rate: u8,

    pitch_slide_target: u16,
    pitch_slide_amount: u8,
    pitch_slide_amount_fraction: u8,
    /// Fractional accumulator for the slide; overflow bumps the frequency by
    /// one extra unit.
    pitch_slide_acc: u16,

    pitch_offset: u16,
    note_length: u8,

    // Latched by stereo SFX loading when two or more cry tracks are active;
    // carried as state the dispatcher does not yet consume.
    cry_sync_length: u8,
    cry_sync_count: u8,
    cry_sync_on: bool,
    panning_latch: u16,
}

impl VirtualChannel {
    /// Clears the channel back to its defaults for a fresh score.
    fn init(&mut self) {
        *self = VirtualChannel::default();
        self.tempo = 0x100;
        self.note_length = 1;
    }

    fn clear_note_flags(&mut self) {
        self.duty_override = false;
        self.freq_override = false;
        self.pitch_sweep = false;
        self.noise_sampling = false;
        self.rest = false;
        self.vibrato_override = false;
    }
}

/// State of the low-health alarm tone: a pulse-1 beep alternating between two
/// pitches every 16 frames while enabled.
#[derive(Default)]
struct LowHealthAlarm {
    on: bool,
    high_pitch: bool,
    counter: u8,
}

/// The music-fade latch. Zero means no fade; otherwise the low six bits are
/// the frame count between steps and bit 7 picks fade-in over fade-out.
const FADE_FRAME_MASK: u8 = 0b0011_1111;
const FADE_IN_BIT: u8 = 0b1000_0000;

#[derive(Default)]
struct EngineContext {
    channels: [VirtualChannel; VIRTUAL_CHANNEL_COUNT],

    // Snapshot of the channel under dispatch.
    current_track_duty: u8,
    current_track_envelope: u8,
    current_track_frequency: u16,
    current_note_duration: u8,
    current_music_byte: u8,
    current_channel: usize,

    /// NR50 cache written out at the end of every frame.
    volume: u8,
    /// NR51 cache rebuilt from channel track masks every frame.
    sound_output: u8,
    /// NR10 cache latched by the pitch_sweep command.
    pitch_sweep: u8,

    music_id: u16,

    /// Cursor into the active drum noise script, if any.
    noise_sample: Option<&'static [u8]>,
    noise_sample_delay: u8,
    music_noise_set: u8,
    sfx_noise_set: u8,

    low_health_alarm: LowHealthAlarm,

    music_fade: u8,
    music_fade_count: u8,
    music_fade_id: u16,

    cry_pitch: u16,
    cry_length: u16,
    last_volume: u8,
    sfx_priority: bool,
    stereo_panning_mask: u8,
    cry_tracks: u8,
    sfx_duration: u8,
}

/// The audio engine. Owns the APU it drives; the score store is borrowed per
/// call so several engines can share one catalogue.
pub struct AudioEngine {
    context: EngineContext,
    apu: Apu,
    music_playing: bool,
    stereo: bool,
}

impl AudioEngine {
    /// Builds an engine around the given APU and initializes it.
    pub fn power_on(apu: Apu) -> Self {
        let mut engine = AudioEngine {
            context: EngineContext::default(),
            apu,
            music_playing: false,
            stereo: false,
        };
        engine.init();
        engine
    }

    /// Silences the hardware channels and resets all interpreter state.
    pub fn init(&mut self) {
        self.music_playing = false;
        self.clear_channels();
        self.context = EngineContext::default();
        self.context.volume = MAX_VOLUME;
        // The panning mask gates stereo SFX and cries; open by default until
        // the host narrows it.
        self.context.stereo_panning_mask = 0xFF;
        self.music_playing = true;
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    /// Enables or disables stereo interpretation of panning commands.
    pub fn set_stereo(&mut self, stereo: bool) {
        self.stereo = stereo;
    }

    /// Restricts which panning bits stereo SFX and cries may use.
    pub fn set_stereo_panning_mask(&mut self, mask: u8) {
        self.context.stereo_panning_mask = mask;
    }

    /// Selects the panning bits cries are folded onto when stereo is active.
    pub fn set_cry_tracks(&mut self, tracks: u8) {
        self.context.cry_tracks = tracks;
    }

    /// Turns the low-health alarm tone on or off.
    pub fn set_low_health_alarm(&mut self, on: bool) {
        self.context.low_health_alarm.on = on;
        if !on {
            self.context.low_health_alarm.counter = 0;
            self.context.low_health_alarm.high_pitch = false;
        }
    }

    /// Index of the first SFX channel currently playing, or 0 when none are.
    pub fn is_playing_sfx(&self) -> usize {
        for i in MUSIC_CHANNEL_COUNT..VIRTUAL_CHANNEL_COUNT {
            if self.context.channels[i].channel_on {
                return i;
            }
        }
        0
    }

    /// Starts the named score as music, reinitializing the engine first.
    pub fn play_music(&mut self, store: &AudioStore, name: &str) -> bool {
        match self.lookup(store, name) {
            Some(id) => {
                self.play_loaded_music(store, id);
                true
            }
            None => false,
        }
    }

    /// Starts the named score on the SFX channels.
    pub fn play_sfx(&mut self, store: &AudioStore, name: &str) -> bool {
        match self.lookup(store, name) {
            Some(id) => {
                self.play_loaded_sfx(store, id);
                true
            }
            None => false,
        }
    }

    /// Starts the named score on the SFX channels, panned through the stereo
    /// panning mask when stereo is active.
    pub fn play_stereo_sfx(&mut self, store: &AudioStore, name: &str) -> bool {
        match self.lookup(store, name) {
            Some(id) => {
                self.play_stereo_loaded_sfx(store, id);
                true
            }
            None => false,
        }
    }

    /// Starts the named score as a creature cry with the given pitch offset
    /// and length (tempo) adjustments.
    pub fn play_cry(&mut self, store: &AudioStore, name: &str, pitch: i16, length: i16) -> bool {
        match self.lookup(store, name) {
            Some(id) => {
                self.context.cry_pitch = pitch as u16;
                self.context.cry_length = length as u16;
                self.play_loaded_cry(store, id);
                true
            }
            None => false,
        }
    }

    /// Fades the current music out over `length`-frame steps, then restarts
    /// the engine playing the named score.
    pub fn fade_to_music(&mut self, store: &AudioStore, name: &str, length: u8) -> bool {
        match self.lookup(store, name) {
            Some(id) => {
                self.context.music_fade = length & FADE_FRAME_MASK;
                self.context.music_fade_id = id;
                true
            }
            None => false,
        }
    }

    fn lookup(&self, store: &AudioStore, name: &str) -> Option<u16> {
        if name.is_empty() {
            error!("Audio handle name cannot be blank.");
            return None;
        }
        match store.handle_by_name(name) {
            Some(handle) => Some(handle.id()),
            None => {
                error!("Audio handle '{}' not found.", name);
                None
            }
        }
    }

    /// Advances the engine by one frame: walks all eight virtual channels,
    /// emitting at most one note per channel, then flushes volume and panning
    /// to the APU.
    pub fn update(&mut self, store: &AudioStore) {
        if !self.music_playing {
            return;
        }

        self.context.sound_output = 0x00;

        for i in 0..VIRTUAL_CHANNEL_COUNT {
            self.context.current_channel = i;
            if !self.context.channels[i].channel_on {
                continue;
            }

            if self.context.channels[i].note_duration < 2 {
                // Note done; rearm the per-note modulation and fetch the next
                // one from the stream.
                let ch = &mut self.context.channels[i];
                ch.vibrato_delay_count = ch.vibrato_delay;
                ch.pitch_slide = false;
                self.parse_music(store);
            } else {
                self.context.channels[i].note_duration -= 1;
            }

            self.apply_pitch_slide();

            {
                let ch = &self.context.channels[i];
                let (duty, envelope, frequency) = (ch.duty_cycle, ch.volume_envelope, ch.frequency);
                self.context.current_track_duty = duty;
                self.context.current_track_envelope = envelope;
                self.context.current_track_frequency = frequency;
            }

            self.handle_track_vibrato();
            self.handle_noise();

            if self.context.sfx_priority && i < MUSIC_CHANNEL_COUNT {
                let sfx_active = self.context.channels[MUSIC_CHANNEL_COUNT..]
                    .iter()
                    .any(|c| c.channel_on);
                if sfx_active {
                    self.context.channels[i].rest = true;
                }
            }

            if i >= MUSIC_CHANNEL_COUNT || !self.context.channels[i + MUSIC_CHANNEL_COUNT].channel_on
            {
                self.update_channel();
                self.context.sound_output |= self.context.channels[i].tracks;
            }

            self.context.channels[i].clear_note_flags();
        }

        self.play_danger_tone();
        self.fade_music(store);

        self.apu.write_nr50(self.context.volume);
        self.apu.write_nr51(self.context.sound_output);
    }

    /// Reads command bytes from the current channel's stream until a note is
    /// produced or the track ends.
    fn parse_music(&mut self, store: &AudioStore) {
        let idx = self.context.current_channel;
        loop {
            let command = self.get_music_byte(store);

            if command == SOUND_RET_CMD && !self.context.channels[idx].subroutine {
                // End of track at the top level.
                if idx >= MUSIC_CHANNEL_COUNT
                    || !self.context.channels[idx + MUSIC_CHANNEL_COUNT].channel_on
                {
                    if self.context.channels[idx].cry {
                        self.restore_volume();
                    }
                    if idx == SFX_CHANNEL_1 {
                        self.apu.write_nr10(0x00);
                    }
                }

                let ch = &mut self.context.channels[idx];
                ch.channel_on = false;
                ch.rest = true;
                ch.music_id = 0;
                return;
            } else if command < FIRST_MUSIC_CMD {
                let (sfx, cry, noise) = {
                    let ch = &self.context.channels[idx];
                    (ch.sfx, ch.cry, ch.noise)
                };

                if sfx || cry {
                    self.parse_sound_effect(store);
                } else if noise {
                    self.get_noise_sample();
                } else {
                    let byte = self.context.current_music_byte;
                    self.set_note_duration(byte & 0xF);

                    let note = byte >> 4;
                    if note == 0 {
                        self.context.channels[idx].rest = true;
                    } else {
                        let octave = self.context.channels[idx].octave;
                        let frequency = self.get_frequency(note, octave);
                        let ch = &mut self.context.channels[idx];
                        ch.pitch = note;
                        ch.frequency = frequency;
                        ch.noise_sampling = true;
                        self.load_note();
                    }
                }
                return;
            } else {
                self.parse_music_command(store);
            }
        }
    }

    /// Dispatches one command opcode (>= 0xD0). Unknown opcodes are ignored
    /// for forward compatibility.
    fn parse_music_command(&mut self, store: &AudioStore) {
        let idx = self.context.current_channel;
        let opcode = self.context.current_music_byte;

        match opcode {
            OCTAVE_CMD..=0xD7 => {
                self.context.channels[idx].octave = opcode & 0b111;
            }
            NOTE_TYPE_CMD => {
                let length = self.get_music_byte(store);
                self.context.channels[idx].note_length = length;
                if (idx & 0b11) < 3 {
                    let envelope = self.get_music_byte(store);
                    self.context.channels[idx].volume_envelope = envelope;
                }
            }
            TRANSPOSE_CMD => {
                let transposition = self.get_music_byte(store);
                self.context.channels[idx].transposition = transposition;
            }
            TEMPO_CMD => {
                let high = self.get_music_byte(store) as u16;
                let low = self.get_music_byte(store) as u16;
                self.set_global_tempo((high << 8) | low);
            }
            DUTY_CYCLE_CMD => {
                let duty = self.get_music_byte(store);
                self.context.channels[idx].duty_cycle = duty << 6;
            }
            VOLUME_ENVELOPE_CMD => {
                let envelope = self.get_music_byte(store);
                self.context.channels[idx].volume_envelope = envelope;
            }
            PITCH_SWEEP_CMD => {
                self.context.pitch_sweep = self.get_music_byte(store);
                self.context.channels[idx].pitch_sweep = true;
            }
            DUTY_CYCLE_PATTERN_CMD => {
                let pattern = self.get_music_byte(store).rotate_left(2);
                let ch = &mut self.context.channels[idx];
                ch.duty_loop = true;
                ch.duty_cycle_pattern = pattern;
                ch.duty_cycle = pattern & 0b1100_0000;
            }
            TOGGLE_SFX_CMD => {
                let ch = &mut self.context.channels[idx];
                ch.sfx = !ch.sfx;
            }
            PITCH_SLIDE_CMD => {
                self.context.current_note_duration = self.get_music_byte(store);
                let note = self.get_music_byte(store);
                let target = self.get_frequency(note & 0xF, note >> 4);
                let ch = &mut self.context.channels[idx];
                ch.pitch_slide_target = target;
                ch.pitch_slide = true;
            }
            VIBRATO_CMD => {
                let delay = self.get_music_byte(store);
                let param = self.get_music_byte(store);
                let ch = &mut self.context.channels[idx];
                ch.vibrato = true;
                ch.vibrato_dir = false;
                ch.vibrato_delay = delay;
                ch.vibrato_delay_count = delay;

                // The rate nibble is duplicated: the low half counts down and
                // is refreshed from the high half.
                ch.vibrato_rate = param & 0xF;
                ch.vibrato_rate |= ch.vibrato_rate << 4;

                // The extent nibble splits asymmetrically between the up and
                // down halves of the bend.
                let extent = param >> 4;
                ch.vibrato_extent = extent >> 1;
                ch.vibrato_extent |= (ch.vibrato_extent + (extent & 1)) << 4;
            }
            TOGGLE_NOISE_CMD => {
                let ch = &mut self.context.channels[idx];
                ch.noise = !ch.noise;
                if ch.noise {
                    self.context.music_noise_set = self.get_music_byte(store);
                }
            }
            FORCE_STEREO_PANNING_CMD => {
                self.set_lr_tracks(idx);
                let mask = self.get_music_byte(store);
                self.context.channels[idx].tracks &= mask;
            }
            VOLUME_CMD => {
                let volume = self.get_music_byte(store);
                if self.context.music_fade == 0 {
                    self.context.volume = volume;
                }
            }
            PITCH_OFFSET_CMD => {
                let high = self.get_music_byte(store) as u16;
                let low = self.get_music_byte(store) as u16;
                let ch = &mut self.context.channels[idx];
                ch.pitch_offset_enabled = true;
                ch.pitch_offset = (high << 8) | low;
            }
            TEMPO_RELATIVE_CMD => {
                let param = self.get_music_byte(store);
                let tempo = self.context.channels[idx].tempo;
                if param & 0x80 != 0 {
                    self.set_global_tempo(tempo.wrapping_sub((param & 0x7F) as u16));
                } else {
                    self.set_global_tempo(tempo.wrapping_add(param as u16));
                }
            }
            RESTART_CHANNEL_CMD | NEW_SONG_CMD => {
                // Legacy commands; skip the word parameter.
                self.get_music_byte(store);
                self.get_music_byte(store);
            }
            SFX_PRIORITY_ON_CMD => {
                self.context.sfx_priority = true;
            }
            SFX_PRIORITY_OFF_CMD => {
                self.context.sfx_priority = false;
            }
            STEREO_PANNING_CMD => {
                if self.stereo {
                    self.set_lr_tracks(idx);
                    let mask = self.get_music_byte(store);
                    self.context.channels[idx].tracks &= mask;
                } else {
                    self.get_music_byte(store);
                }
            }
            SFX_TOGGLE_NOISE_CMD => {
                let ch = &mut self.context.channels[idx];
                ch.noise = !ch.noise;
                if ch.noise {
                    self.context.sfx_noise_set = self.get_music_byte(store);
                }
            }
            SET_CONDITION_CMD => {
                let condition = self.get_music_byte(store);
                self.context.channels[idx].condition = condition;
            }
            SOUND_JUMP_IF_CMD => {
                let condition = self.get_music_byte(store);
                if condition == self.context.channels[idx].condition {
                    let address = self.get_address(store);
                    self.context.channels[idx].music_address = address;
                } else {
                    self.context.channels[idx].music_address += 8;
                }
            }
            SOUND_JUMP_CMD => {
                let address = self.get_address(store);
                self.context.channels[idx].music_address = address;
            }
            SOUND_LOOP_CMD => {
                let count = self.get_music_byte(store);
                if !self.context.channels[idx].looping {
                    if count == 0 {
                        // Zero iterations means loop forever.
                        let address = self.get_address(store);
                        self.context.channels[idx].music_address = address;
                        return;
                    }
                    let ch = &mut self.context.channels[idx];
                    ch.looping = true;
                    ch.loop_count = count - 1;
                }

                if self.context.channels[idx].loop_count == 0 {
                    let ch = &mut self.context.channels[idx];
                    ch.looping = false;
                    ch.music_address += 8;
                } else {
                    let address = self.get_address(store);
                    let ch = &mut self.context.channels[idx];
                    ch.music_address = address;
                    ch.loop_count -= 1;
                }
            }
            SOUND_CALL_CMD => {
                let address = self.get_address(store);
                let ch = &mut self.context.channels[idx];
                ch.last_music_address = ch.music_address;
                ch.music_address = address;
                ch.subroutine = true;
            }
            SOUND_RET_CMD => {
                let ch = &mut self.context.channels[idx];
                ch.subroutine = false;
                ch.music_address = ch.last_music_address;
            }
            _ => {}
        }
    }

    /// Reads the three- or four-byte fixed-envelope note used by SFX and cry
    /// tracks.
    fn parse_sound_effect(&mut self, store: &AudioStore) {
        let idx = self.context.current_channel;
        self.context.channels[idx].noise_sampling = true;

        // SFX notes spend the whole first byte on duration.
        let duration = self.context.current_music_byte;
        self.set_note_duration(duration);

        let envelope = self.get_music_byte(store);
        self.context.channels[idx].volume_envelope = envelope;

        let mut frequency = self.get_music_byte(store) as u16;
        if idx != 3 && idx != 7 {
            frequency |= (self.get_music_byte(store) as u16) << 8;
        }
        self.context.channels[idx].frequency = frequency;
    }

    /// Handles a drum note on a noise music channel: reseeds the noise script
    /// cursor from the active drumkit.
    fn get_noise_sample(&mut self) {
        let idx = self.context.current_channel;
        if idx != 3 && idx != 7 {
            return;
        }

        let byte = self.context.current_music_byte;
        self.set_note_duration(byte & 0xF);

        if idx == 3 && self.context.channels[7].channel_on {
            return;
        }
        let set = self.context.music_noise_set;

        let note = byte >> 4;
        if note != 0 {
            match DRUMKITS
                .get(set as usize)
                .and_then(|kit| kit.get(note as usize))
                .copied()
            {
                Some(script) => {
                    self.context.noise_sample = Some(script);
                    self.context.noise_sample_delay = 0;
                }
                None => debug!("Drum note {} in set {} is out of range.", note, set),
            }
        }
    }

    /// Steps the active drum noise script while a delay is not pending.
    fn handle_noise(&mut self) {
        let idx = self.context.current_channel;
        let noise = self.context.channels[idx].noise;
        if !noise {
            return;
        }

        // Music-side noise defers to an SFX channel that is playing noise.
        if idx < SFX_CHANNEL_1
            && self.context.channels[7].channel_on
            && self.context.channels[7].noise
        {
            return;
        }

        if self.context.noise_sample_delay == 0 {
            self.read_noise_sample();
        } else {
            self.context.noise_sample_delay -= 1;
        }
    }

    /// Consumes the next `{delay, envelope, frequency}` triple of the active
    /// noise script, if one is pending.
    fn read_noise_sample(&mut self) {
        if let Some(script) = self.context.noise_sample {
            if script.len() >= 3 && script[0] != SOUND_RET_CMD {
                self.context.noise_sample_delay = (script[0] & 0xF) + 1;
                self.context.current_track_envelope = script[1];
                self.context.current_track_frequency = script[2] as u16;
                self.context.noise_sample = Some(&script[3..]);

                let idx = self.context.current_channel;
                self.context.channels[idx].noise_sampling = true;
            }
        }
    }

    /// Applies the duty-cycle loop, pitch offset and vibrato to the snapshot
    /// frequency for this frame.
    fn handle_track_vibrato(&mut self) {
        let ctx = &mut self.context;
        let idx = ctx.current_channel;

        if ctx.channels[idx].duty_loop {
            let pattern = ctx.channels[idx].duty_cycle_pattern.rotate_left(2);
            ctx.channels[idx].duty_cycle_pattern = pattern;
            ctx.current_track_duty = pattern & 0b1100_0000;
            ctx.channels[idx].duty_override = true;
        }

        if ctx.channels[idx].pitch_offset_enabled {
            ctx.current_track_frequency = ctx
                .current_track_frequency
                .wrapping_add(ctx.channels[idx].pitch_offset);
        }

        if ctx.channels[idx].vibrato {
            if ctx.channels[idx].vibrato_delay_count > 0 {
                ctx.channels[idx].vibrato_delay_count -= 1;
                return;
            }

            if ctx.channels[idx].vibrato_extent == 0 {
                return;
            }

            // The low nibble of the rate counts frames down to the next bend.
            if ctx.channels[idx].vibrato_rate & 0xF > 0 {
                ctx.channels[idx].vibrato_rate -= 1;
                return;
            }
            ctx.channels[idx].vibrato_rate |= ctx.channels[idx].vibrato_rate >> 4;

            let extent = ctx.channels[idx].vibrato_extent;
            let mut frequency_low = (ctx.current_track_frequency & 0xFF) as u8;
            let frequency_high = (ctx.current_track_frequency >> 8) as u8;

            if ctx.channels[idx].vibrato_dir {
                ctx.channels[idx].vibrato_dir = false;
                frequency_low = frequency_low.saturating_sub(extent & 0xF);
            } else {
                ctx.channels[idx].vibrato_dir = true;
                frequency_low = frequency_low.saturating_add(extent >> 4);
            }

            ctx.current_track_frequency = ((frequency_high as u16) << 8) | frequency_low as u16;
            ctx.channels[idx].vibrato_override = true;
        }
    }

    /// Moves an active pitch slide one frame closer to its target frequency.
    fn apply_pitch_slide(&mut self) {
        let idx = self.context.current_channel;
        let ch = &mut self.context.channels[idx];
        if !ch.pitch_slide {
            return;
        }

        let mut frequency = ch.frequency;
        let done;

        if ch.pitch_slide_dir {
            frequency = frequency.wrapping_add(ch.pitch_slide_amount as u16);
            if ch.pitch_slide_acc as u32 + ch.pitch_slide_amount_fraction as u32 > 0xFF {
                frequency = frequency.wrapping_add(1);
            }
            ch.pitch_slide_acc = ch
                .pitch_slide_acc
                .wrapping_add(ch.pitch_slide_amount_fraction as u16);
            done = frequency > ch.pitch_slide_target;
        } else {
            frequency = frequency.wrapping_sub(ch.pitch_slide_amount as u16);
            if ch.pitch_slide_acc as u32 * 2 > 0xFF {
                frequency = frequency.wrapping_sub(1);
            }
            ch.pitch_slide_acc = ch.pitch_slide_acc.wrapping_mul(2);
            done = frequency < ch.pitch_slide_target;
        }

        if done {
            ch.pitch_slide = false;
            ch.pitch_slide_dir = false;
        } else {
            ch.frequency = frequency;
            ch.duty_override = true;
            ch.freq_override = true;
        }
    }

    /// Derives the slide step from the distance to the target and the time
    /// remaining on the note. Runs when a note lands while a slide is armed.
    fn load_note(&mut self) {
        let idx = self.context.current_channel;
        if !self.context.channels[idx].pitch_slide {
            return;
        }

        let current = self.context.current_note_duration;
        let ch = &mut self.context.channels[idx];

        let duration = (ch.note_duration as i16 - current as i16).max(1) as u8;

        let difference = if ch.frequency > ch.pitch_slide_target {
            ch.pitch_slide_dir = false;
            ch.frequency - ch.pitch_slide_target
        } else {
            ch.pitch_slide_dir = true;
            ch.pitch_slide_target - ch.frequency
        };

        ch.pitch_slide_amount = (difference / duration as u16) as u8;
        ch.pitch_slide_amount_fraction = (difference % duration as u16) as u8;
        ch.pitch_slide_acc = 0;

        self.context.current_note_duration = duration;
    }

    /// Writes the snapshot state out to the hardware channel backing the
    /// current virtual channel, honoring the per-note flag priorities.
    fn update_channel(&mut self) {
        let idx = self.context.current_channel;
        let nr52 = self.apu.read_nr52();
        let frequency_low = (self.context.current_track_frequency & 0xFF) as u8;
        let frequency_high = ((self.context.current_track_frequency >> 8) & 0b111) as u8;
        let duty = self.context.current_track_duty;
        let envelope = self.context.current_track_envelope;

        let (rest, noise_sampling, freq_override, vibrato_override, duty_override, pitch_sweep) = {
            let ch = &self.context.channels[idx];
            (
                ch.rest,
                ch.noise_sampling,
                ch.freq_override,
                ch.vibrato_override,
                ch.duty_override,
                ch.pitch_sweep,
            )
        };

        match idx {
            0 | 4 => {
                // The alarm tone owns pulse 1 while it sounds.
                if idx == 0 && self.context.low_health_alarm.on {
                    return;
                }

                let nr11 = self.apu.read_nr11();
                if pitch_sweep {
                    self.apu.write_nr10(self.context.pitch_sweep);
                }

                if rest {
                    self.apu.write_nr52(nr52 & 0b1000_1110);
                    self.clear_channel(Channel::Pulse1);
                } else if noise_sampling {
                    self.apu.write_nr11((nr11 & 0x3F) | duty);
                    self.apu.write_nr12(envelope);
                    self.apu.write_nr13(frequency_low);
                    self.apu.write_nr14(frequency_high | 0x80);
                } else if freq_override {
                    self.apu.write_nr13(frequency_low);
                    self.apu.write_nr14(frequency_high);
                    if duty_override {
                        self.apu.write_nr11((nr11 & 0x3F) | duty);
                    }
                } else if vibrato_override {
                    self.apu.write_nr11((nr11 & 0x3F) | duty);
                    self.apu.write_nr13(frequency_low);
                } else if duty_override {
                    self.apu.write_nr11((nr11 & 0x3F) | duty);
                }
            }
            1 | 5 => {
                let nr21 = self.apu.read_nr21();

                if rest {
                    self.apu.write_nr52(nr52 & 0b1000_1101);
                    self.clear_channel(Channel::Pulse2);
                } else if noise_sampling {
                    self.apu.write_nr21((nr21 & 0x3F) | duty);
                    self.apu.write_nr22(envelope);
                    self.apu.write_nr23(frequency_low);
                    self.apu.write_nr24(frequency_high | 0x80);
                } else if freq_override {
                    self.apu.write_nr23(frequency_low);
                    self.apu.write_nr24(frequency_high);
                } else if vibrato_override {
                    self.apu.write_nr21((nr21 & 0x3F) | duty);
                    self.apu.write_nr23(frequency_low);
                } else if duty_override {
                    self.apu.write_nr21((nr21 & 0x3F) | duty);
                }
            }
            2 | 6 => {
                if rest {
                    self.apu.write_nr52(nr52 & 0b1000_1011);
                    self.clear_channel(Channel::Wave);
                } else if noise_sampling {
                    // Reload the wave table for the new envelope: the low
                    // nibble picks the pattern, bits 4-5 the output level.
                    self.apu.write_nr31(0x3F);
                    self.apu.write_nr30(0x00);
                    let pattern = WAVE_PATTERNS[(envelope & 0xF) as usize % WAVE_PATTERNS.len()];
                    self.apu.set_wave_pattern(pattern);
                    self.apu.write_nr32((envelope & 0x30) << 1);
                    self.apu.write_nr30(0x80);
                    self.apu.write_nr33(frequency_low);
                    self.apu.write_nr34(frequency_high | 0x80);
                } else if vibrato_override {
                    self.apu.write_nr33(frequency_low);
                }
            }
            _ => {
                if rest {
                    self.apu.write_nr52(nr52 & 0b1000_0111);
                    self.clear_channel(Channel::Noise);
                } else if noise_sampling {
                    self.apu.write_nr41(0x3F);
                    self.apu.write_nr42(envelope);
                    self.apu.write_nr43(frequency_low);
                    self.apu.write_nr44(0x80);
                }
            }
        }
    }

    /// The low-health alarm: while enabled and no SFX is playing, pulse 1
    /// beeps, flipping between two pitches every 16 frames.
    fn play_danger_tone(&mut self) {
        if !self.context.low_health_alarm.on || self.is_playing_sfx() != 0 {
            return;
        }

        if self.context.low_health_alarm.counter == 0 {
            let pitch: u16 = if self.context.low_health_alarm.high_pitch {
                0x750
            } else {
                0x6EE
            };
            self.apu.write_nr10(0x00);
            self.apu.write_nr11(0x80);
            self.apu.write_nr12(0xE2);
            self.apu.write_nr13((pitch & 0xFF) as u8);
            self.apu.write_nr14(((pitch >> 8) as u8) | 0x80);
        }

        let alarm = &mut self.context.low_health_alarm;
        alarm.counter = (alarm.counter + 1) & 0xF;
        if alarm.counter == 0 {
            alarm.high_pitch = !alarm.high_pitch;
        }

        self.context.sound_output |= 0x11;
    }

    /// Steps an active music fade. Fading out to zero reinitializes the
    /// engine and starts the queued score; fading in stops at full volume.
    fn fade_music(&mut self, store: &AudioStore) {
        if self.context.music_fade == 0 {
            return;
        }

        if self.context.music_fade_count > 0 {
            self.context.music_fade_count -= 1;
            return;
        }

        let mut volume = super::regs::MasterVolume(self.context.volume);
        let current = volume.right_volume();
        self.context.music_fade_count = self.context.music_fade & FADE_FRAME_MASK;

        if self.context.music_fade & FADE_IN_BIT != 0 {
            if current == MAX_SIDE_VOLUME {
                self.context.music_fade = 0;
                return;
            }
            volume.set_both(current + 1);
        } else {
            if current == 0 {
                self.context.volume = 0;
                let id = self.context.music_fade_id;
                self.init();
                self.context.music_fade_id = id;
                self.play_loaded_music(store, id);
                self.context.music_fade = 0;
                return;
            }
            volume.set_both(current - 1);
        }

        self.context.volume = volume.0;
    }

    /// Restores the pre-cry volume once the cry's pulse-1 SFX track retires.
    fn restore_volume(&mut self) {
        if self.context.current_channel != SFX_CHANNEL_1 {
            return;
        }

        self.context.channels[5].pitch_offset = 0;
        self.context.channels[7].pitch_offset = 0;
        self.context.volume = self.context.last_volume;
        self.context.last_volume = 0;
        self.context.sfx_priority = false;
    }

    /// Reads the next stream byte for the current channel, wrapping a runaway
    /// address back to zero.
    fn get_music_byte(&mut self, store: &AudioStore) -> u8 {
        let size = store.data_size();
        if size == 0 {
            self.context.current_music_byte = 0;
        } else {
            let idx = self.context.current_channel;
            let ch = &mut self.context.channels[idx];
            if ch.music_address >= size {
                ch.music_address = 0;
            }
            let byte = store.data()[ch.music_address as usize];
            ch.music_address += 1;
            self.context.current_music_byte = byte;
        }
        self.context.current_music_byte
    }

    /// Reads an 8-byte little-endian score offset from the stream.
    fn get_address(&mut self, store: &AudioStore) -> u64 {
        let mut address = 0u64;
        for shift in 0..8 {
            address |= (self.get_music_byte(store) as u64) << (shift * 8);
        }
        address
    }

    /// Reads one byte at an absolute position without moving any channel's
    /// cursor. Out-of-range reads leave the last byte in place.
    fn load_music_byte(&mut self, store: &AudioStore, pointer: u64) -> u8 {
        let size = store.data_size();
        if size == 0 {
            self.context.current_music_byte = 0;
        } else if pointer < size {
            self.context.current_music_byte = store.data()[pointer as usize];
        }
        self.context.current_music_byte
    }

    /// Resolves a note in the current channel's octave and transposition to
    /// an 11-bit hardware period value.
    fn get_frequency(&self, note: u8, octave: u8) -> u16 {
        let ch = &self.context.channels[self.context.current_channel];

        let note = note.wrapping_add(ch.transposition & 0xF);
        if note == 0 {
            return 0;
        }

        let octave = octave.wrapping_add((ch.transposition >> 4) & 0xF);
        let octave = 7 - octave.min(7);

        let entry = FREQUENCY_TABLE[(note as usize).min(FREQUENCY_TABLE.len() - 1)];
        (((entry as u32 | 0xF0000) >> octave) & 0x7FF) as u16
    }

    /// Latches the next note's duration: `noteLength × (d+1)` scaled by the
    /// channel tempo, with the sub-frame remainder carried in the fraction.
    fn set_note_duration(&mut self, duration: u8) {
        let idx = self.context.current_channel;
        let ch = &mut self.context.channels[idx];

        let units = ch.note_length.wrapping_mul(duration.wrapping_add(1)) as u16 & 0xFF;
        let result = units
            .wrapping_mul(ch.tempo)
            .wrapping_add(ch.note_duration_fraction);

        ch.note_duration_fraction = result & 0xFF;
        ch.note_duration = (result >> 8) as u8;
    }

    /// Sets the tempo of the whole track group (music or SFX) the current
    /// channel belongs to, resetting the duration fractions.
    fn set_global_tempo(&mut self, tempo: u16) {
        let base = if self.context.current_channel < MUSIC_CHANNEL_COUNT {
            0
        } else {
            MUSIC_CHANNEL_COUNT
        };

        for channel in &mut self.context.channels[base..base + MUSIC_CHANNEL_COUNT] {
            channel.tempo = tempo;
            channel.note_duration_fraction = 0;
        }
    }

    /// Default panning for a channel: its own bit on both sides.
    fn set_lr_tracks(&mut self, index: usize) {
        let ch = &mut self.context.channels[index];
        ch.tracks = 1 << (index & 0b11);
        ch.tracks |= ch.tracks << 4;
    }

    fn start_channel(&mut self) {
        let idx = self.context.current_channel;
        self.set_lr_tracks(idx);
        self.context.channels[idx].channel_on = true;
    }

    /// Reads one channel header (`{channel byte, u64 address}`) and primes
    /// the named virtual channel. Returns the advanced cursor.
    fn load_channel(&mut self, store: &AudioStore, pointer: u64) -> u64 {
        let mut pointer = pointer;
        let index = (self.load_music_byte(store, pointer) & 0b111) as usize;
        pointer += 1;
        self.context.current_channel = index;

        self.context.channels[index].channel_on = false;
        self.context.channels[index].init();

        let mut address = 0u64;
        for shift in 0..8 {
            address |= (self.load_music_byte(store, pointer) as u64) << (shift * 8);
            pointer += 1;
        }

        let music_id = self.context.music_id;
        let ch = &mut self.context.channels[index];
        ch.music_address = address;
        ch.music_id = music_id;

        pointer
    }

    fn play_loaded_music(&mut self, store: &AudioStore, id: u16) {
        self.music_playing = false;
        self.init();

        let offset = match store.handle_by_id(id) {
            Some(handle) => handle.offset(),
            None => {
                error!("Audio id {} not found in store.", id);
                return;
            }
        };

        self.context.music_id = id;
        let mut cursor = offset;

        // Bits 6-7 of the first channel byte carry the channel count.
        let first_byte = self.load_music_byte(store, cursor);
        let channel_count = (first_byte >> 6) & 0b11;
        for _ in 0..=channel_count {
            cursor = self.load_channel(store, cursor);
            self.start_channel();
        }

        self.context.noise_sample = None;
        self.context.noise_sample_delay = 0;
        self.context.music_noise_set = 0;

        self.music_playing = true;
    }

    fn play_loaded_sfx(&mut self, store: &AudioStore, id: u16) {
        self.music_playing = false;

        // Evict whatever the SFX channels were doing.
        if self.context.channels[4].channel_on {
            self.context.channels[4].channel_on = false;
            self.clear_channel(Channel::Pulse1);
            self.context.pitch_sweep = 0;
        }
        if self.context.channels[5].channel_on {
            self.context.channels[5].channel_on = false;
            self.clear_channel(Channel::Pulse2);
        }
        if self.context.channels[6].channel_on {
            self.context.channels[6].channel_on = false;
            self.clear_channel(Channel::Wave);
        }
        if self.context.channels[7].channel_on {
            self.context.channels[7].channel_on = false;
            self.clear_channel(Channel::Noise);
            self.context.noise_sample = None;
        }

        let offset = match store.handle_by_id(id) {
            Some(handle) => handle.offset(),
            None => {
                error!("Audio id {} not found in store.", id);
                return;
            }
        };

        self.context.music_id = id;
        let mut cursor = offset;

        let first_byte = self.load_music_byte(store, cursor);
        let channel_count = first_byte >> 6;
        for _ in 0..=channel_count {
            cursor = self.load_channel(store, cursor);
            let idx = self.context.current_channel;
            self.context.channels[idx].sfx = true;
            self.start_channel();
        }

        self.music_playing = true;
        self.context.sfx_priority = false;
    }

    fn play_stereo_loaded_sfx(&mut self, store: &AudioStore, id: u16) {
        self.music_playing = false;

        if !self.stereo {
            self.play_loaded_sfx(store, id);
            return;
        }

        let offset = match store.handle_by_id(id) {
            Some(handle) => handle.offset(),
            None => {
                error!("Audio id {} not found in store.", id);
                return;
            }
        };

        self.context.music_id = id;
        let mut cursor = offset;

        let first_byte = self.load_music_byte(store, cursor);
        let channel_count = first_byte >> 6;
        for _ in 0..=channel_count {
            cursor = self.load_channel(store, cursor);
            let idx = self.context.current_channel;
            self.context.channels[idx].sfx = true;
            self.start_channel();

            let panning = TRACK_PANNING[idx & 0b11] & self.context.stereo_panning_mask;
            let ch = &mut self.context.channels[idx];
            ch.tracks = panning;
            ch.panning_latch = (ch.panning_latch & 0xFF00) | panning as u16;

            if self.context.cry_tracks >= 2 {
                let duration = self.context.sfx_duration;
                let ch = &mut self.context.channels[idx];
                ch.cry_sync_length = duration;
                ch.cry_sync_count = duration;
                ch.cry_sync_on = true;
            }

            self.context.channels[idx].channel_on = true;
        }

        self.music_playing = true;
    }

    fn play_loaded_cry(&mut self, store: &AudioStore, id: u16) {
        self.music_playing = false;

        let offset = match store.handle_by_id(id) {
            Some(handle) => handle.offset(),
            None => {
                error!("Audio id {} not found in store.", id);
                return;
            }
        };

        self.context.music_id = id;
        let mut cursor = offset;

        let first_byte = self.load_music_byte(store, cursor);
        let channel_count = first_byte >> 6;
        for _ in 0..=channel_count {
            cursor = self.load_channel(store, cursor);
            let idx = self.context.current_channel;

            {
                let cry_pitch = self.context.cry_pitch;
                let ch = &mut self.context.channels[idx];
                ch.cry = true;
                ch.pitch_offset_enabled = true;
                ch.pitch_offset = cry_pitch;
            }

            // The noise channels ignore the cry length; everyone else plays
            // at the adjusted tempo.
            if idx != 3 && idx != 7 {
                self.context.channels[idx].tempo = self.context.cry_length;
            }

            self.start_channel();

            if self.context.stereo_panning_mask != 0 && self.stereo {
                let cry_tracks = self.context.cry_tracks;
                self.context.channels[idx].tracks &= cry_tracks;
            }
        }

        if self.context.last_volume == 0 {
            self.context.last_volume = self.context.volume;
            self.context.volume = MAX_VOLUME;
        }

        self.context.sfx_priority = true;
        self.music_playing = true;
    }

    /// Silences all four hardware channels and zeroes panning and volume.
    fn clear_channels(&mut self) {
        self.apu.write_nr52(0x80);
        self.apu.write_nr51(0x00);
        self.apu.write_nr50(0x00);
        self.clear_channel(Channel::Pulse1);
        self.clear_channel(Channel::Pulse2);
        self.clear_channel(Channel::Wave);
        self.clear_channel(Channel::Noise);
    }

    /// Retriggers one hardware channel into silence: zero length and period,
    /// envelope of zero volume with the DAC left alive.
    fn clear_channel(&mut self, channel: Channel) {
        match channel {
            Channel::Pulse1 => {
                self.apu.write_nr10(0x00);
                self.apu.write_nr11(0x00);
                self.apu.write_nr12(0x08);
                self.apu.write_nr13(0x00);
                self.apu.write_nr14(0x80);
            }
            Channel::Pulse2 => {
                self.apu.write_nr21(0x00);
                self.apu.write_nr22(0x08);
                self.apu.write_nr23(0x00);
                self.apu.write_nr24(0x80);
            }
            Channel::Wave => {
                self.apu.write_nr30(0x00);
                self.apu.write_nr31(0x00);
                self.apu.write_nr32(0x08);
                self.apu.write_nr33(0x00);
                self.apu.write_nr34(0x80);
            }
            Channel::Noise => {
                self.apu.write_nr41(0x00);
                self.apu.write_nr42(0x08);
                self.apu.write_nr43(0x00);
                self.apu.write_nr44(0x80);
            }
        }
    }
}
