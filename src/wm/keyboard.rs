//! Keyboard Module
//!
//! Key-binding table, keysym/keycode translation and the actions a binding
//! can fire. Bindings are matched by keysym and modifier mask; Lock and
//! NumLock never take part in the comparison.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use x11rb::protocol::xproto::{Keycode, Keysym, ModMask};

/// Keysym constants from X11/keysymdef.h and XF86keysym.h
pub mod keysyms {
    use x11rb::protocol::xproto::Keysym;

    pub const XK_SPACE: Keysym = 0x0020;
    pub const XK_RETURN: Keysym = 0xFF0D;
    pub const XK_ESCAPE: Keysym = 0xFF1B;
    pub const XK_TAB: Keysym = 0xFF09;
    pub const XK_BACKSPACE: Keysym = 0xFF08;
    pub const XK_DELETE: Keysym = 0xFFFF;
    pub const XK_LEFT: Keysym = 0xFF51;
    pub const XK_UP: Keysym = 0xFF52;
    pub const XK_RIGHT: Keysym = 0xFF53;
    pub const XK_DOWN: Keysym = 0xFF54;
    pub const XK_F1: Keysym = 0xFFBE;
    pub const XF86XK_MON_BRIGHTNESS_UP: Keysym = 0x1008_FF02;
    pub const XF86XK_MON_BRIGHTNESS_DOWN: Keysym = 0x1008_FF03;
    pub const XF86XK_AUDIO_LOWER_VOLUME: Keysym = 0x1008_FF11;
    pub const XF86XK_AUDIO_MUTE: Keysym = 0x1008_FF12;
    pub const XF86XK_AUDIO_RAISE_VOLUME: Keysym = 0x1008_FF13;
}

/// Lock-style modifier combinations a grab has to be repeated for
pub fn lock_variants() -> [u16; 4] {
    let lock = u16::from(ModMask::LOCK);
    let num_lock = u16::from(ModMask::M2);
    [0, lock, num_lock, lock | num_lock]
}

/// Strip Lock, NumLock and pointer-button bits from an event state
pub fn clean_mask(state: u16) -> u16 {
    let relevant = ModMask::SHIFT | ModMask::CONTROL | ModMask::M1 | ModMask::M3 | ModMask::M4 | ModMask::M5;
    state & u16::from(relevant)
}

/// Action fired by a key binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Launch a helper program
    Spawn { argv: Vec<String> },
    /// Reload configuration and key grabs
    Reload,
    Quit,
    FocusNext,
    FocusPrev,
    ToggleFullscreen,
    ToggleFloating,
    /// Force-close the selected client
    KillClient,
    /// Relative change of the master area ratio
    SetMasterFactor { delta: f64 },
    /// Swap the first two clients of the active workspace
    SwapMaster,
    SwitchWorkspace { workspace: u8 },
    SendToWorkspace { workspace: u8 },
    ClearWorkspace { workspace: u8 },
    ShowWorkspace,
}

/// Resolved key binding
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBinding {
    pub modifiers: ModMask,
    pub keysym: Keysym,
    pub action: Action,
}

impl KeyBinding {
    pub fn matches(&self, keysym: Keysym, state: u16) -> bool {
        self.keysym == keysym && u16::from(self.modifiers) == clean_mask(state)
    }
}

/// Key binding as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBindingConfig {
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub key: String,
    pub action: Action,
}

impl KeyBindingConfig {
    fn new(modifiers: &[&str], key: &str, action: Action) -> Self {
        Self {
            modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            key: key.to_string(),
            action,
        }
    }

    /// Resolve modifier and key names
    pub fn resolve(&self) -> Result<KeyBinding> {
        let modifiers = parse_modifiers(&self.modifiers)?;
        let keysym = keysym_from_name(&self.key)
            .with_context(|| format!("Unknown key name {:?}", self.key))?;
        Ok(KeyBinding {
            modifiers,
            keysym,
            action: self.action.clone(),
        })
    }
}

/// Resolve a whole table, preserving order
pub fn resolve_bindings(table: &[KeyBindingConfig]) -> Result<Vec<KeyBinding>> {
    table.iter().map(KeyBindingConfig::resolve).collect()
}

/// Every binding whose modifiers and keysym match, in table order
pub fn matching_actions(bindings: &[KeyBinding], keysym: Keysym, state: u16) -> Vec<Action> {
    bindings
        .iter()
        .filter(|b| b.matches(keysym, state))
        .map(|b| b.action.clone())
        .collect()
}

/// Parse a single modifier name
pub fn parse_modifier(name: &str) -> Result<ModMask> {
    let mask = match name.to_ascii_lowercase().as_str() {
        "shift" => ModMask::SHIFT,
        "control" | "ctrl" => ModMask::CONTROL,
        "alt" | "mod1" => ModMask::M1,
        "mod2" => ModMask::M2,
        "mod3" => ModMask::M3,
        "super" | "mod4" | "logo" => ModMask::M4,
        "mod5" => ModMask::M5,
        other => bail!("Unknown modifier {:?}", other),
    };
    Ok(mask)
}

pub fn parse_modifiers(names: &[String]) -> Result<ModMask> {
    names
        .iter()
        .try_fold(ModMask::from(0u16), |acc, name| Ok(acc | parse_modifier(name)?))
}

/// Keysym for a key name: single ASCII characters map to themselves,
/// everything else goes through the name table.
pub fn keysym_from_name(name: &str) -> Option<Keysym> {
    use keysyms::*;

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.clone().next()) {
        if c.is_ascii_graphic() {
            return Some(c.to_ascii_lowercase() as Keysym);
        }
    }

    if let Some(n) = name.strip_prefix('F').and_then(|n| n.parse::<u32>().ok()) {
        if (1..=12).contains(&n) {
            return Some(XK_F1 + n - 1);
        }
    }

    let keysym = match name {
        "space" => XK_SPACE,
        "Return" => XK_RETURN,
        "Escape" => XK_ESCAPE,
        "Tab" => XK_TAB,
        "BackSpace" => XK_BACKSPACE,
        "Delete" => XK_DELETE,
        "Left" => XK_LEFT,
        "Up" => XK_UP,
        "Right" => XK_RIGHT,
        "Down" => XK_DOWN,
        "XF86AudioRaiseVolume" => XF86XK_AUDIO_RAISE_VOLUME,
        "XF86AudioLowerVolume" => XF86XK_AUDIO_LOWER_VOLUME,
        "XF86AudioMute" => XF86XK_AUDIO_MUTE,
        "XF86MonBrightnessUp" => XF86XK_MON_BRIGHTNESS_UP,
        "XF86MonBrightnessDown" => XF86XK_MON_BRIGHTNESS_DOWN,
        _ => return None,
    };
    Some(keysym)
}

/// Snapshot of the server's keyboard mapping
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    min_keycode: Keycode,
    keysyms_per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    pub fn new(min_keycode: Keycode, keysyms_per_keycode: u8, keysyms: Vec<Keysym>) -> Self {
        Self {
            min_keycode,
            keysyms_per_keycode: keysyms_per_keycode as usize,
            keysyms,
        }
    }

    /// Unshifted keysym of a keycode (column 0)
    pub fn keysym(&self, keycode: Keycode) -> Option<Keysym> {
        if self.keysyms_per_keycode == 0 || keycode < self.min_keycode {
            return None;
        }
        let idx = (keycode - self.min_keycode) as usize * self.keysyms_per_keycode;
        self.keysyms.get(idx).copied().filter(|&k| k != 0)
    }

    /// Every keycode producing `keysym` in any column
    pub fn keycodes(&self, keysym: Keysym) -> Vec<Keycode> {
        if self.keysyms_per_keycode == 0 {
            return Vec::new();
        }
        self.keysyms
            .chunks(self.keysyms_per_keycode)
            .enumerate()
            .filter(|(_, chunk)| chunk.contains(&keysym))
            .filter_map(|(i, _)| Keycode::try_from(i + self.min_keycode as usize).ok())
            .collect()
    }

    /// keysym -> keycodes lookup for a whole binding table
    pub fn grab_table(&self, bindings: &[KeyBinding]) -> HashMap<Keysym, Vec<Keycode>> {
        let mut table = HashMap::new();
        for binding in bindings {
            table
                .entry(binding.keysym)
                .or_insert_with(|| self.keycodes(binding.keysym));
        }
        debug!("Resolved {} distinct keysyms for grabbing", table.len());
        table
    }
}

/// Built-in key-binding table
pub fn default_bindings() -> Vec<KeyBindingConfig> {
    use Action::*;

    let spawn = |argv: &[&str]| Spawn {
        argv: argv.iter().map(|a| a.to_string()).collect(),
    };
    let m = ["super"];
    let sm = ["super", "shift"];
    let csm = ["super", "control"];

    let mut table = vec![
        // Launchers
        KeyBindingConfig::new(
            &m,
            "p",
            spawn(&[
                "rofi",
                "-theme",
                "~/.config/rofi/config.rasi",
                "-show",
                "drun",
                "-location",
                "0",
                "-xoffset",
                "0",
                "-yoffset",
                "0",
            ]),
        ),
        KeyBindingConfig::new(&m, "w", spawn(&["firefox"])),
        KeyBindingConfig::new(&sm, "w", spawn(&["~/.local/bin/wifi_chooser.sh"])),
        KeyBindingConfig::new(&m, "c", spawn(&["digital_clock"])),
        KeyBindingConfig::new(&m, "Return", spawn(&["alacritty"])),
        KeyBindingConfig::new(&sm, "s", spawn(&["~/.local/bin/powermenu.sh"])),
        KeyBindingConfig::new(&sm, "r", Reload),
        // Window control
        KeyBindingConfig::new(&m, "j", FocusNext),
        KeyBindingConfig::new(&m, "k", FocusPrev),
        KeyBindingConfig::new(&sm, "f", ToggleFullscreen),
        KeyBindingConfig::new(&sm, "c", KillClient),
        KeyBindingConfig::new(&sm, "q", Quit),
        // Layout control
        KeyBindingConfig::new(&m, "h", SetMasterFactor { delta: -0.05 }),
        KeyBindingConfig::new(&m, "l", SetMasterFactor { delta: 0.05 }),
        KeyBindingConfig::new(&m, "space", ToggleFloating),
        KeyBindingConfig::new(&sm, "Return", SwapMaster),
        // System controls
        KeyBindingConfig::new(
            &[],
            "XF86AudioRaiseVolume",
            spawn(&["pactl", "set-sink-volume", "@DEFAULT_SINK@", "+5%"]),
        ),
        KeyBindingConfig::new(
            &[],
            "XF86AudioLowerVolume",
            spawn(&["pactl", "set-sink-volume", "@DEFAULT_SINK@", "-5%"]),
        ),
        KeyBindingConfig::new(
            &[],
            "XF86AudioMute",
            spawn(&["pactl", "set-sink-mute", "@DEFAULT_SINK@", "toggle"]),
        ),
        KeyBindingConfig::new(
            &[],
            "XF86MonBrightnessUp",
            spawn(&["brightnessctl", "set", "+5%"]),
        ),
        KeyBindingConfig::new(
            &[],
            "XF86MonBrightnessDown",
            spawn(&["brightnessctl", "set", "5%-"]),
        ),
    ];

    // Workspace control
    for workspace in 1..=9u8 {
        let key = workspace.to_string();
        table.push(KeyBindingConfig::new(&sm, &key, SendToWorkspace { workspace }));
        table.push(KeyBindingConfig::new(&m, &key, SwitchWorkspace { workspace }));
        table.push(KeyBindingConfig::new(&csm, &key, ClearWorkspace { workspace }));
    }
    table.push(KeyBindingConfig::new(&m, "Escape", ShowWorkspace));

    table
}
