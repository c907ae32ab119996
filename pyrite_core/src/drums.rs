//! Static engine data: the drumkit noise scripts, the wave tables and the
//! semitone frequency table. Linked in, never configurable at runtime.

use super::commands::SOUND_RET_CMD;

/// Builds an encoded noise script: `{length, volume<<4 | fade, frequency}`
/// triples followed by a terminator. A negative fade would set bit 3 of the
/// fade nibble; the built-in kits only use positive fades.
macro_rules! drum {
    ($(($len:expr, $vol:expr, $fade:expr, $freq:expr)),* $(,)?) => {
        &[ $( $len, (($vol) << 4) | ($fade), $freq, )* SOUND_RET_CMD ]
    };
}

const DRUM00: &[u8] = drum![(32, 1, 1, 0)];
const SNARE1: &[u8] = drum![(32, 12, 1, 51)];
const SNARE2: &[u8] = drum![(32, 11, 1, 51)];
const SNARE3: &[u8] = drum![(32, 10, 1, 51)];
const SNARE4: &[u8] = drum![(32, 8, 1, 51)];
const DRUM05: &[u8] = drum![
    (39, 8, 4, 55),
    (38, 8, 4, 54),
    (37, 8, 3, 53),
    (36, 8, 3, 52),
    (35, 8, 2, 51),
    (34, 8, 1, 50),
];
const TRIANGLE1: &[u8] = drum![(32, 5, 1, 42)];
const TRIANGLE2: &[u8] = drum![(33, 4, 1, 43), (32, 6, 1, 42)];
const HIHAT1: &[u8] = drum![(32, 8, 1, 16)];
const SNARE5: &[u8] = drum![(32, 8, 2, 35)];
const SNARE6: &[u8] = drum![(32, 8, 2, 37)];
const SNARE7: &[u8] = drum![(32, 8, 2, 38)];
const HIHAT2: &[u8] = drum![(32, 10, 1, 16)];
const HIHAT3: &[u8] = drum![(32, 10, 2, 17)];
const SNARE8: &[u8] = drum![(32, 10, 2, 80)];
const TRIANGLE3: &[u8] = drum![(32, 10, 1, 24), (32, 3, 1, 51)];
const TRIANGLE4: &[u8] = drum![(34, 9, 1, 40), (32, 7, 1, 24)];
const SNARE9: &[u8] = drum![(32, 9, 1, 34)];
const SNARE10: &[u8] = drum![(32, 7, 1, 34)];
const SNARE11: &[u8] = drum![(32, 6, 1, 34)];
const DRUM20: &[u8] = drum![(32, 1, 1, 17)];

/// A bare terminator: the "rest" drum slotted into kits 3-5.
const DRUM21: &[u8] = &[SOUND_RET_CMD];

const SNARE12: &[u8] = drum![(32, 9, 1, 51)];
const SNARE13: &[u8] = drum![(32, 5, 1, 50)];
const SNARE14: &[u8] = drum![(32, 8, 1, 49)];
const KICK1: &[u8] = drum![(32, 8, 8, 107), (32, 7, 1, 0)];
const TRIANGLE5: &[u8] = drum![(48, 9, 1, 24)];
const DRUM27: &[u8] = drum![(39, 9, 2, 16)];
const DRUM28: &[u8] = drum![(51, 9, 1, 0), (51, 1, 1, 0)];
const DRUM29: &[u8] = drum![(51, 9, 1, 17), (51, 1, 1, 0)];
const CRASH1: &[u8] = drum![(51, 8, 8, 21), (32, 6, 5, 18)];
const DRUM31: &[u8] = drum![(51, 5, 1, 33), (51, 1, 1, 17)];
const DRUM32: &[u8] = drum![(51, 5, 1, 80), (51, 1, 1, 17)];
const DRUM33: &[u8] = drum![(32, 10, 1, 49)];
const CRASH2: &[u8] = drum![(32, 8, 4, 18)];
const DRUM35: &[u8] = drum![(51, 8, 1, 0), (51, 1, 1, 0)];
const DRUM36: &[u8] = drum![(51, 8, 1, 33), (51, 1, 1, 17)];
const KICK2: &[u8] = drum![(32, 10, 8, 107), (32, 7, 1, 0)];

/// Number of instrument slots per drumkit.
pub const DRUMKIT_INSTRUMENTS: usize = 13;

pub static DRUMKITS: [[&[u8]; DRUMKIT_INSTRUMENTS]; 6] = [
    [
        DRUM00, SNARE1, SNARE2, SNARE3, SNARE4, DRUM05, TRIANGLE1, TRIANGLE2, HIHAT1, SNARE5,
        SNARE6, SNARE7, HIHAT2,
    ],
    [
        DRUM00, HIHAT1, SNARE5, SNARE6, SNARE7, HIHAT2, HIHAT3, SNARE8, TRIANGLE3, TRIANGLE4,
        SNARE9, SNARE10, SNARE11,
    ],
    [
        DRUM00, SNARE1, SNARE9, SNARE10, SNARE11, DRUM05, TRIANGLE1, TRIANGLE2, HIHAT1, SNARE5,
        SNARE6, SNARE7, HIHAT2,
    ],
    [
        DRUM21, SNARE12, SNARE13, SNARE14, KICK1, TRIANGLE5, DRUM20, DRUM27, DRUM28, DRUM29,
        DRUM21, KICK2, CRASH2,
    ],
    [
        DRUM21, DRUM20, SNARE13, SNARE14, KICK1, DRUM33, TRIANGLE5, DRUM35, DRUM31, DRUM32,
        DRUM36, KICK2, CRASH1,
    ],
    [
        DRUM00, SNARE9, SNARE10, SNARE11, DRUM27, DRUM28, DRUM29, DRUM05, TRIANGLE1, CRASH1,
        SNARE14, SNARE13, KICK2,
    ],
];

/// The ten built-in wave tables, one 32-nibble pattern per string.
pub const WAVE_PATTERNS: [&str; 10] = [
    "02468ACEFFFEDDCBBA98765444332211",
    "02468ACEEFFFFEEECCBBA98765432211",
    "1369BDEEEEFFFFEDDEFFFFEEEEDB9631",
    "02468ACDEFFEDEFFEEDCBA9876543210",
    "012345678ACDEEF77FEEDCA876543210",
    "0011223344332211FFEECCAA88AACCEE",
    "02468ACECBA98765FFFEEDDC44332211",
    "C0A987F5FFFEEDDC443322F102468ACE",
    "4433221F00468ACEF8FEEDDCCBA98765",
    "110000080013579AB4BAA99887654321",
];

/// Two octaves of semitone period values; index 0 is the rest entry. Higher
/// octaves are derived by right-shifting (the hardware's 2^n relationship).
pub const FREQUENCY_TABLE: [u16; 25] = [
    0x0000, // __
    0xF82C, // C_
    0xF89D, // C#
    0xF907, // D_
    0xF96B, // D#
    0xF9CA, // E_
    0xFA23, // F_
    0xFA77, // F#
    0xFAC7, // G_
    0xFB12, // G#
    0xFB58, // A_
    0xFB9B, // A#
    0xFBDA, // B_
    0xFC16, // C_
    0xFC4E, // C#
    0xFC83, // D_
    0xFCB5, // D#
    0xFCE5, // E_
    0xFD11, // F_
    0xFD3B, // F#
    0xFD63, // G_
    0xFD89, // G#
    0xFDAC, // A_
    0xFDCD, // A#
    0xFDED, // B_
];

#[cfg(test)]
mod drums_tests {
    use super::*;

    #[test]
    fn scripts_are_terminated_triples() {
        for kit in DRUMKITS.iter() {
            for script in kit.iter() {
                assert_eq!(script.len() % 3, 1);
                assert_eq!(*script.last().unwrap(), SOUND_RET_CMD);
            }
        }
    }

    #[test]
    fn drum_macro_encoding() {
        // length, volume<<4 | fade, frequency
        assert_eq!(SNARE1, &[32, 0xC1, 51, SOUND_RET_CMD]);
        assert_eq!(KICK1, &[32, 0x88, 107, 32, 0x71, 0, SOUND_RET_CMD]);
        assert_eq!(DRUM21, &[SOUND_RET_CMD]);
    }

    #[test]
    fn wave_patterns_are_well_formed() {
        for pattern in WAVE_PATTERNS.iter() {
            assert_eq!(pattern.len(), 32);
            assert!(pattern.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn frequency_table_shape() {
        assert_eq!(FREQUENCY_TABLE[0], 0);
        // Semitones ascend within each octave.
        for pair in FREQUENCY_TABLE[1..13].windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for pair in FREQUENCY_TABLE[13..].windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
