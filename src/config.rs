use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::landmarks::{Hand, Landmark};
use crate::tracker::Point;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePreset {
    /// Reduced resolution for constrained devices.
    Compact,
    #[default]
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Scale a normalized landmark into capture pixels.
    pub fn to_pixels(&self, lm: Landmark) -> Point {
        Point::new(lm.x * self.width as f32, lm.y * self.height as f32)
    }
}

impl CapturePreset {
    pub fn frame_size(self) -> FrameSize {
        match self {
            Self::Compact => FrameSize {
                width: 240,
                height: 320,
            },
            Self::Standard => FrameSize {
                width: 640,
                height: 480,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Capture {
    #[serde(default)]
    pub preset: CapturePreset,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Capture {
    pub fn frame_size(&self) -> FrameSize {
        let base = self.preset.frame_size();
        FrameSize {
            width: self.width.unwrap_or(base.width),
            height: self.height.unwrap_or(base.height),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    /// Index-to-thumb distance, in capture pixels, below which a hand is pinched.
    /// Tied to the capture size: the same physical pinch measures smaller on
    /// the compact preset.
    #[serde(default = "default_pinch_distance")]
    pub pinch_distance: f32,
    #[serde(default)]
    pub release_distance: Option<f32>,
    #[serde(default)]
    pub min_handedness_score: f32,
    /// EMA weight of the newest pinch distance sample; 1.0 disables smoothing.
    #[serde(default = "default_smooth_ema")]
    pub smooth_ema: f32,
}

fn default_pinch_distance() -> f32 {
    50.0
}

fn default_smooth_ema() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParameterPair {
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetMapping {
    /// Value both coordinates return to when a hand leaves the frame.
    #[serde(default)]
    pub rest: f32,
    pub left: ParameterPair,
    pub right: ParameterPair,
}

impl TargetMapping {
    pub fn pair(&self, hand: Hand) -> &ParameterPair {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    pub fn rest_point(&self) -> Point {
        Point::new(self.rest, self.rest)
    }

    /// The `(parameter, value)` pairs driven by `hand` sitting at `target`.
    pub fn assign(&self, hand: Hand, target: Point) -> [(&str, f32); 2] {
        let pair = self.pair(hand);
        [(pair.x.as_str(), target.x), (pair.y.as_str(), target.y)]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub capture: Capture,
    pub thresholds: Thresholds,
    pub targets: TargetMapping,
    pub detector: DetectorConfig,
}

impl Profile {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot resolve home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handctl"))
}

pub fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_or_install_in(config_dir()?)
    }

    pub fn load_or_install_in(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile_file(&profdir.join(format!("{active_name}.toml")))?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profile_path(&self.active_name)
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    pub fn reload(&mut self) -> Result<()> {
        self.profile = self.load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        // validate before switching the pointer
        let profile = load_profile_file(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn load_profile(&self, name: &str) -> Result<Profile> {
        load_profile_file(&self.profile_path(name))
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let command = &self.profile.detector.command;
        let program = command.first().map(String::as_str).unwrap_or("");
        serde_json::json!({
            "user": whoami::username(),
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "capture": self.profile.capture.frame_size(),
            "profile_name": self.profile.meta.name,
            "pinch_distance_px": self.profile.thresholds.pinch_distance,
            "smooth_ema": self.profile.thresholds.smooth_ema,
            "detector": {
                "command": command,
                "found": program_on_path(program),
            },
            "hints": {
                "detector_protocol": "one hand-landmarker result per line as JSON on stdout",
                "log_filter": "HANDCTL_LOG=debug"
            }
        })
    }
}

fn load_profile_file(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if !th.pinch_distance.is_finite() || th.pinch_distance <= 0.0 {
        return Err(anyhow!("thresholds.pinch_distance must be a positive distance"));
    }
    if let Some(release) = th.release_distance {
        if !release.is_finite() || release < th.pinch_distance {
            return Err(anyhow!(
                "thresholds.release_distance must be at least pinch_distance"
            ));
        }
    }
    if !(0.0..=1.0).contains(&th.min_handedness_score) {
        return Err(anyhow!("thresholds.min_handedness_score must be in [0,1]"));
    }
    if !(th.smooth_ema > 0.0 && th.smooth_ema <= 1.0) {
        return Err(anyhow!("thresholds.smooth_ema must be in (0,1]"));
    }

    let size = p.capture.frame_size();
    if size.width == 0 || size.height == 0 {
        return Err(anyhow!("capture width and height must be positive"));
    }

    if !(0.0..=1.0).contains(&p.targets.rest) {
        return Err(anyhow!("targets.rest must be in [0,1] normalized units"));
    }
    let mut seen = HashSet::new();
    for hand in Hand::BOTH {
        let pair = p.targets.pair(hand);
        for name in [&pair.x, &pair.y] {
            if name.trim().is_empty() {
                return Err(anyhow!("targets.{hand} has an empty parameter name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(anyhow!("parameter '{}' is mapped more than once", name));
            }
        }
    }

    if p.detector.command.first().is_none_or(|c| c.trim().is_empty()) {
        return Err(anyhow!("detector.command must name a program"));
    }
    Ok(())
}

fn program_on_path(program: &str) -> bool {
    if program.is_empty() {
        return false;
    }
    if program.contains('/') {
        return Path::new(program).exists();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_default(edit: impl FnOnce(String) -> String) -> Result<Profile> {
        Profile::from_toml_str(&edit(default_profile_text().to_string()))
    }

    #[test]
    fn default_profile_parses() {
        let p = Profile::from_toml_str(default_profile_text()).unwrap();
        assert_eq!(p.meta.name.as_deref(), Some("default"));
        assert_eq!(p.thresholds.pinch_distance, 50.0);
        assert_eq!(p.thresholds.release_distance, None);
        assert_eq!(p.thresholds.smooth_ema, 1.0);
        assert_eq!(
            p.capture.frame_size(),
            FrameSize {
                width: 640,
                height: 480
            }
        );
        assert_eq!(p.targets.pair(Hand::Right).x, "filter_cutoff");
        assert_eq!(p.detector.command[0], "python3");
    }

    #[test]
    fn compact_preset_and_overrides() {
        let p = with_default(|t| t.replace("preset = \"standard\"", "preset = \"compact\""))
            .unwrap();
        assert_eq!(
            p.capture.frame_size(),
            FrameSize {
                width: 240,
                height: 320
            }
        );

        let p = with_default(|t| {
            t.replace("preset = \"standard\"", "preset = \"standard\"\nwidth = 1280")
        })
        .unwrap();
        assert_eq!(p.capture.frame_size().width, 1280);
        assert_eq!(p.capture.frame_size().height, 480);
    }

    #[test]
    fn rejects_bad_thresholds() {
        assert!(with_default(|t| t.replace("pinch_distance = 50.0", "pinch_distance = 0.0")).is_err());
        assert!(
            with_default(|t| t.replace(
                "pinch_distance = 50.0",
                "pinch_distance = 50.0\nrelease_distance = 40.0"
            ))
            .is_err()
        );
        assert!(
            with_default(|t| t.replace("min_handedness_score = 0.0", "min_handedness_score = 1.5"))
                .is_err()
        );
        assert!(with_default(|t| t.replace("smooth_ema = 1.0", "smooth_ema = 0.0")).is_err());
        assert!(with_default(|t| t.replace("smooth_ema = 1.0", "smooth_ema = 1.5")).is_err());
        let p = with_default(|t| t.replace("smooth_ema = 1.0", "smooth_ema = 0.4")).unwrap();
        assert_eq!(p.thresholds.smooth_ema, 0.4);
    }

    #[test]
    fn doctor_names_the_profile() {
        let dir = std::env::temp_dir().join(format!("handctl-doctor-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let st = ConfigState::load_or_install_in(dir.clone()).unwrap();
        let report = st.doctor_report();
        assert_eq!(report["profile_name"], "default");
        assert_eq!(report["active_profile"], "default");
        assert_eq!(report["capture"]["width"], 640);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_duplicate_or_empty_parameters() {
        assert!(with_default(|t| t.replace("\"filter_cutoff\"", "\"reverb_mix\"")).is_err());
        assert!(with_default(|t| t.replace("\"reverb_size\"", "\" \"")).is_err());
        assert!(with_default(|t| t.replace("rest = 0.0", "rest = 2.0")).is_err());
    }

    #[test]
    fn rejects_empty_detector_command() {
        assert!(
            with_default(|t| t.replace("[\"python3\", \"hand_detect.py\"]", "[]")).is_err()
        );
    }

    #[test]
    fn installs_and_switches_profiles() {
        let dir = std::env::temp_dir().join(format!("handctl-cfg-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut st = ConfigState::load_or_install_in(dir.clone()).unwrap();
        assert_eq!(st.active_name, "default");
        assert_eq!(st.list_profiles(), vec!["default".to_string()]);

        let compact = default_profile_text().replace("\"standard\"", "\"compact\"");
        fs::write(st.profiles_dir.join("phone.toml"), compact).unwrap();
        st.set_active("phone").unwrap();
        assert_eq!(st.profile.capture.frame_size().width, 240);
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap(), "phone");
        assert!(st.set_active("missing").is_err());
        assert_eq!(st.active_name, "phone");

        let _ = fs::remove_dir_all(&dir);
    }
}
