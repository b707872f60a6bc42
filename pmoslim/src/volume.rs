//! Encodage du volume
//!
//! Le Squeezebox 1 règle son DSP (MAS35x9) par des écritures pseudo-I2C
//! (`i2cc`), le Squeezebox 2 reçoit deux gains dans une trame `audg`.
//! Les fonctions sont pures : même niveau, mêmes octets.

use bytes::{BufMut, BytesMut};

use crate::model::PlayerModel;
use crate::protocol::ServerFrame;

pub const MAX_VOLUME: u8 = 100;

/// Ramène un niveau quelconque dans `0..=100`.
pub fn clamp_level(level: i32) -> u8 {
    level.clamp(0, MAX_VOLUME as i32) as u8
}

/// Gain du Squeezebox 1, quadratique sur 20 bits.
pub fn squeezebox1_gain(level: u8) -> u32 {
    let ratio = level.min(MAX_VOLUME) as f64 / 100.0;
    (0x80000 as f64 * ratio * ratio).round() as u32
}

/// Gains `(ancien, nouveau)` du Squeezebox 2.
///
/// L'ancien gain (firmwares < 22) est linéaire sur 0..=128, le nouveau suit
/// une courbe en dB en virgule fixe 16.16.
pub fn squeezebox2_gains(level: u8) -> (u32, u32) {
    let level = level.min(MAX_VOLUME);
    let old = (level as f64 / 100.0 * 128.0).round() as u32;
    if level == 0 {
        return (old, 0);
    }

    let db = 50.0 / 101.0 * (level as f64 - 100.0);
    let mult = 10f64.powf(db / 20.0);
    let new = if (-30.0..0.0).contains(&db) {
        ((mult * 256.0 + 0.5) as u32) << 8
    } else {
        (mult * 65536.0 + 0.5) as u32
    };
    (old, new)
}

/// Écriture sur la banque `d0` : adresse 16 bits, donnée 20 bits.
fn i2c_d0(address: u16, data: u32) -> [u8; 24] {
    let [a_hi, a_lo] = address.to_be_bytes();
    [
        b's', 0x3e, b'w', 0x68, b'w', 0xe0, b'w', 0x00, b'w', 0x00, b'w', 0x01, b'w', a_hi,
        b'w', a_lo, b'w', 0x00, b'w', ((data >> 16) & 0x0f) as u8, b'w', ((data >> 8) & 0xff) as u8,
        b'p', (data & 0xff) as u8,
    ]
}

/// Écriture d'un registre de contrôle (`cwrite`).
fn i2c_cwrite(address: u16, data: u16) -> [u8; 12] {
    let [a_hi, a_lo] = address.to_be_bytes();
    let [d_hi, d_lo] = data.to_be_bytes();
    [
        b's', 0x3e, b'w', 0x6c, b'w', a_hi, b'w', a_lo, b'w', d_hi, b'p', d_lo,
    ]
}

// out_LL, out_RR et activation du volume numérique
const OUT_LL: u16 = 0x0354;
const OUT_RR: u16 = 0x0357;
const VOLUME_REGISTER: u16 = 0x0010;
const VOLUME_ENABLE: u16 = 0x7600;

fn squeezebox1_frame(level: u8) -> ServerFrame {
    let gain = squeezebox1_gain(level);
    let mut payload = BytesMut::with_capacity(60);
    payload.put_slice(&i2c_d0(OUT_LL, gain));
    payload.put_slice(&i2c_d0(OUT_RR, gain));
    payload.put_slice(&i2c_cwrite(VOLUME_REGISTER, VOLUME_ENABLE));
    ServerFrame::new(b"i2cc", payload.freeze())
}

fn squeezebox2_frame(level: u8) -> ServerFrame {
    let (old, new) = squeezebox2_gains(level);
    let mut payload = BytesMut::with_capacity(18);
    payload.put_u32(old);
    payload.put_u32(old);
    // volume numérique, préampli 255
    payload.put_u8(1);
    payload.put_u8(255);
    payload.put_u32(new);
    payload.put_u32(new);
    ServerFrame::new(b"audg", payload.freeze())
}

/// Trame de volume pour `model`.
pub fn volume_frame(model: PlayerModel, level: u8) -> ServerFrame {
    let level = level.min(MAX_VOLUME);
    match model {
        PlayerModel::Squeezebox1 => squeezebox1_frame(level),
        PlayerModel::Squeezebox2 => squeezebox2_frame(level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // (niveau, ancien gain B, nouveau gain B, gain A)
    const REFERENCE: &[(u8, u32, u32, u32)] = &[
        (0, 0, 0, 0),
        (1, 1, 0xe8, 0x34),
        (5, 6, 0x124, 0x51f),
        (10, 13, 0x184, 0x147b),
        (39, 50, 0x7ea, 0x13780),
        (40, 51, 0x800, 0x147ae),
        (50, 64, 0xf00, 0x20000),
        (75, 96, 0x3e00, 0x48000),
        (99, 127, 0xf200, 0x7d73f),
        (100, 128, 0x10000, 0x80000),
    ];

    #[test]
    fn test_reference_gains() {
        for &(level, old, new, a) in REFERENCE {
            assert_eq!(squeezebox2_gains(level), (old, new), "level {}", level);
            assert_eq!(squeezebox1_gain(level), a, "level {}", level);
        }
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp_level(-5), 0);
        assert_eq!(clamp_level(105), 100);
        assert_eq!(clamp_level(55), 55);
    }

    #[test]
    fn test_audg_layout() {
        let frame = volume_frame(PlayerModel::Squeezebox2, 50);
        assert_eq!(&frame.opcode, b"audg");
        assert_eq!(
            &frame.payload[..],
            &[0, 0, 0, 64, 0, 0, 0, 64, 1, 255, 0, 0, 0x0f, 0, 0, 0, 0x0f, 0]
        );

        let mute = volume_frame(PlayerModel::Squeezebox2, 0);
        assert_eq!(&mute.payload[10..], &[0; 8]);
    }

    #[test]
    fn test_i2cc_layout() {
        let frame = volume_frame(PlayerModel::Squeezebox1, 75);
        assert_eq!(&frame.opcode, b"i2cc");
        let p = &frame.payload;
        assert_eq!(p.len(), 60);
        // out_LL = 0x48000
        assert_eq!(&p[12..16], &[b'w', 0x03, b'w', 0x54]);
        assert_eq!(&p[18..24], &[b'w', 0x04, b'w', 0x80, b'p', 0x00]);
        // out_RR
        assert_eq!(&p[24 + 12..24 + 16], &[b'w', 0x03, b'w', 0x57]);
        // cwrite 0010 = 7600
        assert_eq!(
            &p[48..],
            &[b's', 0x3e, b'w', 0x6c, b'w', 0x00, b'w', 0x10, b'w', 0x76, b'p', 0x00]
        );
    }
}
