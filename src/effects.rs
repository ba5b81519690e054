/*!
 # Scenes and music modes

 Fixed name-to-id tables captured from the Govee app's BLE traffic.
 Ids not listed here can still be sent through the command builders.
*/

/// A built-in lighting scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scene {
    pub name: &'static str,
    pub id: u8,
}

/// A microphone-driven music mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicMode {
    pub name: &'static str,
    pub id: u8,
}

/// Known scenes, in the order the app lists them
pub const SCENES: &[Scene] = &[
    Scene { name: "sunrise", id: 0x00 },
    Scene { name: "sunset", id: 0x01 },
    Scene { name: "movie", id: 0x04 },
    Scene { name: "dating", id: 0x05 },
    Scene { name: "romantic", id: 0x07 },
    Scene { name: "blinking", id: 0x08 },
    Scene { name: "candlelight", id: 0x09 },
    Scene { name: "snowflake", id: 0x0F },
    Scene { name: "rainbow", id: 0x16 },
];

/// Known music modes
pub const MUSIC_MODES: &[MusicMode] = &[
    MusicMode { name: "rhythm", id: 0x03 },
    MusicMode { name: "spectrum", id: 0x04 },
    MusicMode { name: "energetic", id: 0x05 },
    MusicMode { name: "rolling", id: 0x06 },
    MusicMode { name: "separation", id: 0x32 },
];

/// Looks up a scene by name, ignoring case
pub fn scene_by_name(name: &str) -> Option<Scene> {
    SCENES
        .iter()
        .find(|scene| scene.name.eq_ignore_ascii_case(name.trim()))
        .copied()
}

/// Looks up a music mode by name, ignoring case
pub fn music_mode_by_name(name: &str) -> Option<MusicMode> {
    MUSIC_MODES
        .iter()
        .find(|mode| mode.name.eq_ignore_ascii_case(name.trim()))
        .copied()
}

/// Names of all known scenes
pub fn scene_names() -> impl Iterator<Item = &'static str> {
    SCENES.iter().map(|scene| scene.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(scene_by_name("rainbow").map(|s| s.id), Some(0x16));
        assert_eq!(scene_by_name(" Sunset ").map(|s| s.id), Some(0x01));
        assert_eq!(scene_by_name("disco"), None);
        assert_eq!(music_mode_by_name("SEPARATION").map(|m| m.id), Some(0x32));
        assert_eq!(music_mode_by_name("sunrise"), None);
    }

    #[test]
    fn names_are_unique() {
        let names: Vec<_> = scene_names().collect();
        for (i, name) in names.iter().enumerate() {
            assert!(!names[i + 1..].contains(name), "duplicate scene {}", name);
        }
        assert_eq!(names.first(), Some(&"sunrise"));
    }
}
