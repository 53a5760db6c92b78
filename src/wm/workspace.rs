//! Workspace Module
//!
//! Nine mutually exclusive workspaces. Workspace membership lives on each
//! client; this module tracks which one is active and moves clients between
//! them.

use anyhow::Result;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::IndicatorConfig;
use crate::wm::WindowManager;
use crate::wm::display::DisplayServer;
use crate::wm::error::log_rejection;

pub const WORKSPACE_COUNT: u8 = 9;

/// Workspace number, always in `1..=9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspaceId(u8);

impl WorkspaceId {
    pub const FIRST: WorkspaceId = WorkspaceId(1);

    pub fn new(n: i64) -> Option<Self> {
        (1..=WORKSPACE_COUNT as i64)
            .contains(&n)
            .then(|| WorkspaceId(n as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Active workspace and indicator settings
#[derive(Debug)]
pub struct WorkspaceManager {
    active: WorkspaceId,
    indicator: IndicatorConfig,
}

impl WorkspaceManager {
    pub fn new(indicator: IndicatorConfig) -> Self {
        Self {
            active: WorkspaceId::FIRST,
            indicator,
        }
    }

    pub fn active(&self) -> WorkspaceId {
        self.active
    }

    pub fn set_indicator(&mut self, indicator: IndicatorConfig) {
        self.indicator = indicator;
    }

    fn set_active(&mut self, workspace: WorkspaceId) {
        self.active = workspace;
    }

    /// `notify-send` invocation announcing `workspace`
    pub fn indicator_command(&self, workspace: WorkspaceId) -> Option<Vec<String>> {
        if !self.indicator.enabled {
            return None;
        }
        Some(vec![
            "notify-send".to_string(),
            "-t".to_string(),
            self.indicator.timeout_ms.to_string(),
            format!("Workspace {}", workspace),
        ])
    }
}

impl WindowManager {
    /// Hide the active workspace and show workspace `n`
    pub fn switch_workspace(&mut self, display: &impl DisplayServer, n: u8) -> Result<()> {
        let Some(target) = log_rejection(Self::workspace_arg(n), "switch workspace") else {
            return Ok(());
        };
        let old = self.workspaces.active();
        if target == old {
            return Ok(());
        }

        info!("Switching workspace {} -> {}", old, target);
        for client in self.registry.in_workspace(old) {
            display.unmap_window(client.window)?;
        }
        for client in self.registry.in_workspace(target) {
            display.map_window(client.window)?;
        }
        self.workspaces.set_active(target);
        self.registry.clear_selection();
        self.arrange(display)?;

        let head = self.registry.in_workspace(target).next().map(|c| c.window);
        self.focus_window(display, head)
    }

    /// Move the selection to workspace `n`, hiding it if `n` is not active
    pub fn send_to_workspace(&mut self, display: &impl DisplayServer, n: u8) -> Result<()> {
        let Some(window) = self.registry.selected() else {
            return Ok(());
        };
        let Some(target) = log_rejection(Self::workspace_arg(n), "send to workspace") else {
            return Ok(());
        };
        if self.registry.get(window).map(|c| c.workspace) == Some(target) {
            return Ok(());
        }
        if log_rejection(self.registry.check_room(target), "send to workspace").is_none() {
            return Ok(());
        }

        if let Some(client) = self.registry.get_mut(window) {
            client.workspace = target;
        }
        debug!("Sent window 0x{:x} to workspace {}", window, target);
        if target != self.workspaces.active() {
            display.unmap_window(window)?;
        }
        self.registry.clear_selection();
        self.arrange(display)
    }

    /// Force-close every client of workspace `n`. The registry is only
    /// changed by the destroy notifications that follow.
    pub fn clear_workspace(&mut self, display: &impl DisplayServer, n: u8) -> Result<()> {
        let Some(target) = log_rejection(Self::workspace_arg(n), "clear workspace") else {
            return Ok(());
        };
        let windows: Vec<_> = self.registry.in_workspace(target).map(|c| c.window).collect();
        info!("Clearing workspace {}: {} clients", target, windows.len());
        for window in windows {
            display.kill_client(window)?;
        }
        Ok(())
    }

    /// Forced close of the selection
    pub fn kill_client(&mut self, display: &impl DisplayServer) -> Result<()> {
        if let Some(window) = self.registry.selected() {
            debug!("Killing client 0x{:x}", window);
            display.kill_client(window)?;
        }
        Ok(())
    }

    /// Announce the active workspace through a desktop notification
    pub fn show_workspace_indicator(&mut self) {
        let active = self.active_workspace();
        let Some(argv) = self.workspaces.indicator_command(active) else {
            return;
        };
        if let Err(e) = self.spawner.spawn(&argv) {
            warn!("Workspace indicator unavailable: {}", e);
        }
    }
}
