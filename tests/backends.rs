//! Command-line backends against misbehaving child processes
//!
//! Kept in its own test binary: the zombie count below looks at every child
//! of this process, so no other test may spawn children concurrently.

use invision::camera::Frame;
use invision::config::DetectionConfig;
use invision::perception::{CommandDetector, ObjectDetector};

/// Pixel noise, so the PNG handed to the backend is far larger than a pipe buffer
fn noisy_frame() -> Frame {
    let mut seed: u32 = 0x2545_f491;
    Frame::from_fn(640, 480, |_, _| {
        let mut channel = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed as u8
        };
        image::Rgb([channel(), channel(), channel()])
    })
}

/// Zombie processes whose parent is this test binary
#[cfg(target_os = "linux")]
fn zombie_children() -> Vec<String> {
    let me = std::process::id().to_string();
    std::fs::read_dir("/proc")
        .unwrap()
        .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("stat")).ok())
        .filter(|stat| {
            // fields after the command name: state, ppid, ...
            let rest = stat.rsplit_once(") ").map_or("", |(_, rest)| rest);
            let mut fields = rest.split_whitespace();
            fields.next() == Some("Z") && fields.next() == Some(me.as_str())
        })
        .collect()
}

#[cfg(target_os = "linux")]
#[test]
fn detector_that_dies_at_startup_is_reaped_and_explained() {
    let config = DetectionConfig {
        command: vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo model missing >&2; exit 2".to_string(),
        ],
        ..DetectionConfig::default()
    };
    let mut detector = CommandDetector::new(&config).unwrap();
    let frame = noisy_frame();

    let before = zombie_children().len();
    for _ in 0..5 {
        let err = detector.detect(&frame, 0.35).unwrap_err().to_string();
        assert!(err.contains("code 2"), "{err}");
        assert!(err.contains("model missing"), "{err}");
    }
    assert_eq!(zombie_children().len(), before);
}
