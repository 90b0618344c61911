mod common;

use common::{kwz_fill_layer, ppm_blank_frame, KwzBuilder, KwzFrame, PpmBuilder};
use flipnote::audio::{clip_ratio, mix_into};
use flipnote::{
    AudioTrack, FlipnoteDecoder, FlipnoteError, KwzDecoder, KwzSettings, PpmDecoder,
};

fn adpcm_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(37).wrapping_add(seed))
        .collect()
}

#[test]
fn test_mix_clamps_instead_of_wrapping() {
    let mut dst = vec![20000i16, -20000, 100];
    for _ in 0..2 {
        mix_into(&mut dst, &[20000, -20000, 100], 0);
    }
    assert_eq!(dst, vec![32767, -32768, 300]);
    assert!((clip_ratio(&dst) - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_mix_drops_overhang() {
    let mut dst = vec![0i16; 4];
    mix_into(&mut dst, &[1, 2, 3, 4], 2);
    assert_eq!(dst, vec![0, 0, 1, 2]);
    mix_into(&mut dst, &[5], 10);
    assert_eq!(dst, vec![0, 0, 1, 2]);
}

#[test]
fn test_ppm_master_mix() {
    let mut builder = PpmBuilder {
        sound_flags: vec![0x1, 0x0, 0x1, 0x0],
        ..PpmBuilder::default()
    };
    builder.tracks[0] = adpcm_bytes(300, 3);
    builder.tracks[1] = adpcm_bytes(50, 11);
    for _ in 0..4 {
        builder = builder.frame(ppm_blank_frame(0));
    }
    let data = builder.build();
    let mut decoder = PpmDecoder::new(&data).unwrap();

    let rate = 8192;
    let bgm = decoder.audio_track_pcm(AudioTrack::Bgm, rate).unwrap();
    let se1 = decoder.audio_track_pcm(AudioTrack::Se1, rate).unwrap();
    assert_eq!(bgm.len(), 600);
    assert_eq!(se1.len(), 100);

    let master = decoder.audio_master_pcm(rate).unwrap();
    // 4 frames at 30 fps
    assert_eq!(master.samples.len(), 1093);
    assert_eq!(master.sample_rate, rate);

    let mut expected = vec![0i16; 1093];
    let half: Vec<i16> = bgm.iter().map(|s| s >> 1).collect();
    mix_into(&mut expected, &half, 0);
    mix_into(&mut expected, &se1, 0);
    // frame 2 starts at ceil(2 * 8192 / 30)
    mix_into(&mut expected, &se1, 547);
    assert_eq!(master.samples, expected);
    assert!(master.samples[700..].iter().all(|&s| s == 0));
}

#[test]
fn test_ppm_bgm_speed_correction() {
    let mut builder = PpmBuilder {
        frame_speed: 6,
        bgm_speed: 5,
        ..PpmBuilder::default()
    };
    builder.tracks[0] = adpcm_bytes(100, 7);
    let data = builder.frame(ppm_blank_frame(0)).build();
    let mut decoder = PpmDecoder::new(&data).unwrap();

    let native = decoder.decode_audio_track(AudioTrack::Bgm).unwrap();
    assert_eq!(native.len(), 200);
    // recorded at 6 fps, played at 12 fps: the BGM runs at 16384 Hz
    let out = decoder.audio_track_pcm(AudioTrack::Bgm, 8192).unwrap();
    assert_eq!(out.len(), 100);
    for (n, &sample) in out.iter().enumerate() {
        assert_eq!(sample, native[2 * n]);
    }
}

#[test]
fn test_ppm_missing_tracks() {
    let data = PpmBuilder::default().frame(ppm_blank_frame(0)).build();
    let mut decoder = PpmDecoder::new(&data).unwrap();
    assert!(matches!(
        decoder.audio_track_pcm(AudioTrack::Se2, 32_768),
        Err(FlipnoteError::MissingTrack(AudioTrack::Se2))
    ));
    assert!(matches!(
        decoder.decode_audio_track(AudioTrack::Se4),
        Err(FlipnoteError::MissingTrack(AudioTrack::Se4))
    ));

    let master = decoder.audio_master_pcm(32_768).unwrap();
    assert_eq!(master.samples.len(), 1093);
    assert_eq!(master.clip_ratio, 0.0);
}

#[test]
fn test_kwz_master_keeps_full_bgm() {
    let bgm = adpcm_bytes(200, 5);
    let se2 = adpcm_bytes(40, 9);
    let mut frames = Vec::new();
    for sound_flags in [0x0, 0x2, 0x0] {
        let mut frame = KwzFrame::new(
            0x70,
            [kwz_fill_layer(0), kwz_fill_layer(0), kwz_fill_layer(0)],
        );
        frame.sound_flags = sound_flags;
        frames.push(frame);
    }
    let builder = KwzBuilder {
        frames,
        tracks: Some([bgm, Vec::new(), se2, Vec::new(), Vec::new()]),
        ..KwzBuilder::default()
    };
    let data = builder.build();
    let mut decoder = KwzDecoder::new(&data, KwzSettings::default()).unwrap();

    let rate = 16364;
    let bgm = decoder.audio_track_pcm(AudioTrack::Bgm, rate).unwrap();
    let se2 = decoder.audio_track_pcm(AudioTrack::Se2, rate).unwrap();
    assert_eq!(bgm, decoder.decode_audio_track(AudioTrack::Bgm).unwrap());

    let master = decoder.audio_master_pcm(rate).unwrap();
    // 3 frames at 30 fps
    assert_eq!(master.samples.len(), 1637);

    let mut expected = vec![0i16; 1637];
    mix_into(&mut expected, &bgm, 0);
    // frame 1 starts at ceil(16364 / 30)
    mix_into(&mut expected, &se2, 546);
    assert_eq!(master.samples, expected);
}

#[test]
fn test_kwz_nearest_resampling() {
    let builder = KwzBuilder {
        tracks: Some([adpcm_bytes(64, 1), Vec::new(), Vec::new(), Vec::new(), Vec::new()]),
        ..KwzBuilder::default()
    };
    let data = builder
        .frame(KwzFrame::new(
            0x70,
            [kwz_fill_layer(0), kwz_fill_layer(0), kwz_fill_layer(0)],
        ))
        .build();
    let mut decoder = KwzDecoder::new(&data, KwzSettings::default()).unwrap();

    let native = decoder.decode_audio_track(AudioTrack::Bgm).unwrap();
    let doubled = decoder.audio_track_pcm(AudioTrack::Bgm, 16364 * 2).unwrap();
    assert_eq!(doubled.len(), native.len() * 2);
    for (n, &sample) in doubled.iter().enumerate() {
        assert_eq!(sample, native[n / 2]);
    }
}
