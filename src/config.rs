use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
};

use crate::controller::{AnimationParameters, TargetTable};
use crate::gestures::{self, Gesture};
use crate::scene;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    #[serde(default = "default_particle_count")]
    pub particle_count: i64,
    #[serde(default = "default_gift_count")]
    pub gift_count: i64,
    /// Fixed seed for a reproducible tree; entropy when absent.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Animation {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_lerp")]
    pub lerp_factor: f64,
    #[serde(default)]
    pub frame_rate_independent: bool,
    #[serde(default = "default_reference_fps")]
    pub reference_fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gestures {
    #[serde(default = "default_window")]
    pub window: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tint {
    #[serde(default = "default_tint")]
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub tree: Tree,
    pub animation: Animation,
    pub gestures: Gestures,
    pub tint: Tint,

    // Partial per-gesture overrides on top of the built-in table.
    #[serde(default, deserialize_with = "deserialize_targets")]
    pub targets: HashMap<Gesture, TargetOverride>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetOverride {
    pub expansion: Option<f64>,
    pub speed: Option<f64>,
    pub vertical_flow: Option<f64>,
    pub disco: Option<f64>,
}

impl TargetOverride {
    fn apply(&self, base: AnimationParameters) -> AnimationParameters {
        AnimationParameters {
            expansion: self.expansion.unwrap_or(base.expansion),
            speed: self.speed.unwrap_or(base.speed),
            vertical_flow: self.vertical_flow.unwrap_or(base.vertical_flow),
            disco: self.disco.unwrap_or(base.disco),
        }
    }
}

fn default_particle_count() -> i64 {
    crate::geometry::DEFAULT_PARTICLE_COUNT as i64
}
fn default_gift_count() -> i64 {
    crate::geometry::DEFAULT_GIFT_COUNT as i64
}
fn default_fps() -> u32 {
    60
}
fn default_lerp() -> f64 {
    crate::controller::DEFAULT_LERP
}
fn default_reference_fps() -> f64 {
    crate::controller::DEFAULT_REFERENCE_FPS
}
fn default_window() -> usize {
    gestures::DEFAULT_WINDOW
}
fn default_tint() -> String {
    "#00ff88".to_string()
}

// --------- targets deserializer (keyed by gesture name) ----------
fn deserialize_targets<'de, D>(
    de: D,
) -> std::result::Result<HashMap<Gesture, TargetOverride>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, TargetOverride>::deserialize(de)?;
    let mut out = HashMap::new();
    for (k, v) in raw {
        let g: Gesture = k.parse().map_err(serde::de::Error::custom)?;
        out.insert(g, v);
    }
    Ok(out)
}
// ------------------------------------------------------------

impl Profile {
    pub fn parse(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    /// The profile shipped inside the binary.
    pub fn embedded() -> Result<Self> {
        Self::parse(default_profile_text())
    }

    pub fn target_table(&self) -> TargetTable {
        let mut table = TargetTable::default();
        for (g, o) in &self.targets {
            table.set(*g, o.apply(table.get(*g)));
        }
        table
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

pub fn config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| anyhow!("cannot resolve home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".config").join("magictree"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_from(config_dir()?)
    }

    pub fn load_from(cfgdir: PathBuf) -> Result<Self> {
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
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Re-read the active profile; the previous one stays in place on error.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    /// Switch to `name` for this process only; the active pointer is untouched.
    pub fn select(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        self.profile = load_profile(&self.profiles_dir, name)?;
        self.active_name = name.to_string();
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        self.select(name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
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

    pub fn doctor_report(&self) -> serde_json::Value {
        let p = &self.profile;
        serde_json::json!({
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "profiles": self.list_profiles(),
            "tree": {
                "particle_count": p.tree.particle_count,
                "gift_count": p.tree.gift_count,
                "seed": p.tree.seed,
            },
            "animation": {
                "fps": p.animation.fps,
                "lerp_factor": p.animation.lerp_factor,
                "frame_rate_independent": p.animation.frame_rate_independent,
            },
            "tint": p.tint.color,
        })
    }

    /// Watch the profile directory and hand back a reloader fed by it.
    pub fn watch(self) -> Result<ProfileReloader> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => warn!("profile watch error: {e}"),
            }
        })?;
        watcher.watch(&self.profiles_dir, RecursiveMode::NonRecursive)?;
        info!("watching {} for profile changes", self.profiles_dir.display());
        Ok(ProfileReloader {
            state: self,
            events: rx,
            _watcher: Some(watcher),
        })
    }
}

/// Re-reads the active profile when its directory changes.
pub struct ProfileReloader {
    state: ConfigState,
    events: Receiver<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl ProfileReloader {
    pub fn from_channel(state: ConfigState, events: Receiver<()>) -> Self {
        Self {
            state,
            events,
            _watcher: None,
        }
    }

    /// A freshly loaded profile if anything changed since the last poll.
    /// Bursts of events collapse into one reload; a bad edit is logged and ignored.
    pub fn poll(&mut self) -> Option<Profile> {
        let mut dirty = false;
        while self.events.try_recv().is_ok() {
            dirty = true;
        }
        if !dirty {
            return None;
        }
        match self.state.reload() {
            Ok(()) => {
                info!("profile '{}' reloaded", self.state.active_name);
                Some(self.state.profile.clone())
            }
            Err(e) => {
                error!("reload failed, keeping last good profile: {e}");
                None
            }
        }
    }
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    crate::geometry::checked_count(p.tree.particle_count)?;
    crate::geometry::checked_count(p.tree.gift_count)?;

    let a = &p.animation;
    if a.fps == 0 {
        return Err(anyhow!("animation.fps must be positive"));
    }
    if !(a.lerp_factor > 0.0 && a.lerp_factor <= 1.0) {
        return Err(anyhow!("animation.lerp_factor must be in (0,1]"));
    }
    if !(a.reference_fps > 0.0 && a.reference_fps.is_finite()) {
        return Err(anyhow!("animation.reference_fps must be positive"));
    }
    if p.gestures.window == 0 {
        return Err(anyhow!("gestures.window must be at least 1"));
    }
    scene::parse_tint(&p.tint.color)?;

    let table = p.target_table();
    for g in Gesture::ALL {
        if !table.get(g).is_finite() {
            return Err(anyhow!("targets.{g} has a non-finite value"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(extra: &str) -> String {
        format!(
            r##"
[meta]
name = "test"

[tree]
particle_count = 500
gift_count = 10
seed = 9

[animation]
fps = 30

[gestures]

[tint]
color = "#ff0000"
{extra}
"##
        )
    }

    #[test]
    fn test_embedded_default_is_valid() {
        let p = Profile::embedded().unwrap();
        assert_eq!(p.tree.particle_count, 8000);
        assert_eq!(p.tree.gift_count, 40);
        assert_eq!(p.animation.lerp_factor, 0.05);
        assert_eq!(p.gestures.window, 5);
        assert_eq!(p.target_table(), TargetTable::default());
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let p = Profile::parse(&base("")).unwrap();
        assert_eq!(p.animation.fps, 30);
        assert_eq!(p.animation.lerp_factor, 0.05);
        assert!(!p.animation.frame_rate_independent);
        assert_eq!(p.tree.seed, Some(9));
    }

    #[test]
    fn test_target_overrides_are_partial() {
        let p = Profile::parse(&base("[targets.open]\nexpansion = 2.5\n")).unwrap();
        let t = p.target_table();
        assert_eq!(t.get(Gesture::Open).expansion, 2.5);
        assert_eq!(t.get(Gesture::Open).speed, 0.2);
        assert_eq!(t.get(Gesture::Closed), TargetTable::default().get(Gesture::Closed));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Profile::parse(&base("[targets.wave]\nspeed = 1.0\n")).is_err());
        assert!(Profile::parse(&base("[targets.open]\nspin = 1.0\n")).is_err());
        assert!(Profile::parse(&base("").replace("#ff0000", "red")).is_err());
        assert!(Profile::parse(&base("").replace("particle_count = 500", "particle_count = -3")).is_err());
        assert!(Profile::parse(&base("").replace("fps = 30", "fps = 30\nlerp_factor = 0.0")).is_err());
    }

    #[test]
    fn test_install_switch_and_reload() {
        let dir = std::env::temp_dir().join(format!("magictree-cfg-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut st = ConfigState::load_from(dir.clone()).unwrap();
        assert_eq!(st.active_name, "default");
        assert_eq!(st.list_profiles(), vec!["default".to_string()]);

        fs::write(st.profiles_dir.join("calm.toml"), base("[targets.closed]\nspeed = 1.0\n")).unwrap();
        st.set_active("calm").unwrap();
        assert_eq!(st.profile.target_table().get(Gesture::Closed).speed, 1.0);
        assert!(st.set_active("missing").is_err());

        // a broken edit keeps the last good profile
        fs::write(st.profiles_dir.join("calm.toml"), "not = [toml").unwrap();
        assert!(st.reload().is_err());
        assert_eq!(st.profile.meta.name.as_deref(), Some("test"));

        let again = ConfigState::load_from(dir.clone());
        assert!(again.is_err(), "active pointer should now name the broken profile");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_select_leaves_pointer_alone() {
        let dir = std::env::temp_dir().join(format!("magictree-sel-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut st = ConfigState::load_from(dir.clone()).unwrap();
        fs::write(st.profiles_dir.join("quick.toml"), base("")).unwrap();
        st.select("quick").unwrap();
        assert_eq!(st.active_name, "quick");
        assert_eq!(st.profile.animation.fps, 30);
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap().trim(), "default");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reloader_applies_changes_and_skips_bad_edits() {
        let dir = std::env::temp_dir().join(format!("magictree-reload-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let st = ConfigState::load_from(dir.clone()).unwrap();
        let default_path = st.profiles_dir.join("default.toml");
        let (tx, rx) = mpsc::channel();
        let mut reloader = ProfileReloader::from_channel(st, rx);

        assert!(reloader.poll().is_none());

        fs::write(&default_path, base("")).unwrap();
        tx.send(()).unwrap();
        tx.send(()).unwrap();
        let p = reloader.poll().unwrap();
        assert_eq!(p.animation.fps, 30);
        assert!(reloader.poll().is_none());

        fs::write(&default_path, "[meta").unwrap();
        tx.send(()).unwrap();
        assert!(reloader.poll().is_none());

        let _ = fs::remove_dir_all(&dir);
    }
}
