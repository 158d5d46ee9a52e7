#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use nredux::constants::{Count, FOILS, IMAGE_LEN, TIME_BINS, TOF_LEN};

pub const CASCADE_HEADER: &str = "
###Detector
tau : 0.123
timechannels : 16
###Selector
selector_lambda : 6.0
selector_speed : 28000 rpm
###Sample
sample : MnSi
";

pub const ASCII_SCAN: &str = "\
### NICOS data file, created at 2018-03-17 14:25:30
### Device positions and sample environment state
#              Exp_title : MnSi helix
#                 T_value : 28.5 K
### Scan data
# sth_st    timer      file
# deg       s          -
1.0   10.0   00147720.tof
2.0   10.0   00147721.tof
3.0   10.0   00147722.tof
";

pub fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir")
}

/// Time-resolved counts of a 10 × 10 pixel beam at x, y ∈ 60..70.
///
/// Foil `f` carries `per_pixel·(1 + contrasts[f]·sin(πt/8 + phase))`, zero outside the spot.
pub fn mieze_counts(contrasts: &[f64; FOILS], phase: f64, per_pixel: f64) -> Vec<Count> {
    let mut counts = vec![0; TOF_LEN];
    for (f, contrast) in contrasts.iter().enumerate() {
        for t in 0..TIME_BINS {
            let signal = 1.0 + contrast * (PI / 8.0 * t as f64 + phase).sin();
            let value = (per_pixel * signal).round();
            for y in 60..70 {
                for x in 60..70 {
                    counts[((f * TIME_BINS + t) * 128 + y) * 128 + x] = value as Count;
                }
            }
        }
    }
    counts
}

/// Single image with `value` in every pixel of the 20 × 20 square at x, y ∈ 40..60.
pub fn square_image(value: Count) -> Vec<Count> {
    let mut counts = vec![0; IMAGE_LEN];
    for y in 40..60 {
        for x in 40..60 {
            counts[y * 128 + x] = value;
        }
    }
    counts
}

/// Write a CASCADE file: little-endian payload followed by a text header.
pub fn write_cascade(dir: &Utf8Path, name: &str, counts: &[Count], header: &str) -> Utf8PathBuf {
    let mut bytes: Vec<u8> = counts.iter().flat_map(|c| c.to_le_bytes()).collect();
    bytes.extend_from_slice(header.as_bytes());
    let path = dir.join(name);
    fs::write(&path, bytes).expect("write cascade file");
    path
}

pub fn write_text(dir: &Utf8Path, name: &str, text: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("write text file");
    path
}
