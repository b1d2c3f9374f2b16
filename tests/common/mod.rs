//! Shared fixtures for the integration suites.
#![allow(dead_code)]
//!
//! Builds a complete installation under a tempdir: curve tables, a
//! loudspeaker folder with DRC/XO FIR files, and a controller configuration
//! wired to a mock engine.

use std::fs;
use std::path::Path;

use preampd::config::AppConfig;
use preampd::engine::{MockEngine, MockHandle};
use preampd::Preamp;

pub const BINS: usize = 9;

/// Write small but well-formed curve tables under `<root>/eq/curves_<fs>_N11`.
///
/// Tone rows carry their dB setting on every bin; loudness rows boost below
/// the 83 dB reference and are flat at and above it; two room targets exist.
pub fn write_curves(root: &Path, fs: u32) {
    let folder = root.join("eq").join(format!("curves_{fs}_N11"));
    fs::create_dir_all(folder.join("room_target")).unwrap();

    let tone: String = (-12..=12)
        .map(|db| vec![format!("{db}.0"); BINS].join(" ") + "\n")
        .collect();
    fs::write(folder.join("bass_mag.dat"), &tone).unwrap();
    fs::write(folder.join("treble_mag.dat"), &tone).unwrap();

    let loud: String = (0..=90)
        .map(|spl| {
            let boost = if spl < 83 { (83 - spl) as f32 * 0.1 } else { 0.0 };
            vec![format!("{boost}"); BINS].join(" ") + "\n"
        })
        .collect();
    fs::write(folder.join("ref_83_loudness_mag.dat"), &loud).unwrap();

    for (id, gain) in [("+0.0-0.0", 0.0f32), ("+3.0-1.0", 3.0)] {
        let row = vec![format!("{gain}"); BINS].join(" ");
        fs::write(
            folder.join("room_target").join(format!("{id}_target_mag.dat")),
            row,
        )
        .unwrap();
    }
}

/// Create both channel FIR files for each DRC set id.
pub fn write_drc_sets(root: &Path, loudspeaker: &str, ids: &[&str]) {
    let folder = root.join("loudspeakers").join(loudspeaker);
    fs::create_dir_all(&folder).unwrap();
    for id in ids {
        for channel in ["L", "R"] {
            fs::write(folder.join(format!("drc.{channel}.{id}.pcm")), b"\x00").unwrap();
        }
    }
}

/// Create minimum/linear phase crossover FIR files for the given ways.
pub fn write_xo_filters(root: &Path, loudspeaker: &str, fs_rate: u32, ways: &[&str]) {
    let folder = root
        .join("loudspeakers")
        .join(loudspeaker)
        .join(fs_rate.to_string());
    fs::create_dir_all(&folder).unwrap();
    for way in ways {
        for flavour in ["mp", "lp"] {
            fs::write(folder.join(format!("xo.{way}.{flavour}.pcm")), b"\x00").unwrap();
        }
    }
}

/// A stereo full-range installation with two DRC sets.
pub fn stereo_config(root: &Path, drcs_offset: f32) -> AppConfig {
    write_curves(root, 44100);
    write_drc_sets(root, "sofa", &["sofa", "equilat"]);

    let json = format!(
        r#"{{
            "main_folder": "{}",
            "loudspeaker": "sofa",
            "fs": 44100,
            "drcs_offset": {drcs_offset},
            "inputs": {{ "tv": {{}}, "mpd": {{ "gain": -3.0 }} }},
            "outputs": {{
                "1": {{ "name": "fr.L" }},
                "2": {{ "name": "fr.R" }}
            }}
        }}"#,
        root.display()
    );
    serde_json::from_str(&json).unwrap()
}

/// A 2+1 way topology: lo/hi pairs, a void output and a subwoofer.
pub fn multiway_config(root: &Path) -> AppConfig {
    write_curves(root, 44100);
    write_drc_sets(root, "big", &["sofa"]);
    write_xo_filters(root, "big", 44100, &["lo", "hi", "sw"]);

    let json = format!(
        r#"{{
            "main_folder": "{}",
            "loudspeaker": "big",
            "fs": 44100,
            "inputs": {{ "tv": {{}} }},
            "outputs": {{
                "1": {{ "name": "lo.L" }},
                "2": {{ "name": "lo.R" }},
                "3": {{ "name": "hi.L" }},
                "4": {{ "name": "hi.R" }},
                "5": {{ "name": "" }},
                "6": {{ "name": "sw" }}
            }}
        }}"#,
        root.display()
    );
    serde_json::from_str(&json).unwrap()
}

/// Bring a controller up against a fresh mock engine.
pub fn start_preamp(config: AppConfig) -> (Preamp, MockHandle) {
    let (engine, handle) = MockEngine::new();
    let preamp = Preamp::start(config, Box::new(engine)).expect("preamp start");
    (preamp, handle)
}
