//! Client Registry
//!
//! Ordered collection of managed windows. Order is meaningful: the first
//! tiled client of a workspace is its master, and next/previous focus walks
//! this order. The selection is held by window handle, so removing a client
//! can never leave a dangling selection behind.

use tracing::debug;
use x11rb::protocol::xproto::Window;

use crate::wm::client::Client;
use crate::wm::error::Rejection;
use crate::wm::workspace::WorkspaceId;

#[derive(Debug)]
pub struct ClientRegistry {
    clients: Vec<Client>,
    selection: Option<Window>,
    capacity: usize,
}

impl ClientRegistry {
    /// Create an empty registry holding at most `capacity` clients per workspace
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Vec::new(),
            selection: None,
            capacity,
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Prepend a new client and select it.
    pub fn insert(&mut self, window: Window, workspace: WorkspaceId) -> Result<&Client, Rejection> {
        if self.contains(window) {
            return Err(Rejection::AlreadyManaged(window));
        }
        self.check_room(workspace)?;

        debug!("Registering window 0x{:x} on workspace {}", window, workspace);
        self.clients.insert(0, Client::new(window, workspace));
        self.selection = Some(window);
        Ok(&self.clients[0])
    }

    /// Remove a client. Unknown handles are ignored.
    pub fn remove(&mut self, window: Window) -> Option<Client> {
        let index = self.position(window)?;
        let client = self.clients.remove(index);
        if self.selection == Some(window) {
            self.selection = self.clients.first().map(|c| c.window);
        }
        debug!("Unregistered window 0x{:x}", window);
        Some(client)
    }

    /// Fails when `workspace` already holds the maximum number of clients
    pub fn check_room(&self, workspace: WorkspaceId) -> Result<(), Rejection> {
        if self.count_in_workspace(workspace) >= self.capacity {
            Err(Rejection::WorkspaceFull {
                workspace: workspace.get(),
                max: self.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Fails when some workspace already holds more than `capacity` clients
    pub fn check_capacity(&self, capacity: usize) -> Result<(), Rejection> {
        let crowded = self
            .clients
            .iter()
            .map(|c| (c.workspace, self.count_in_workspace(c.workspace)))
            .find(|&(_, count)| count > capacity);
        match crowded {
            Some((workspace, count)) => Err(Rejection::OverCapacity {
                workspace: workspace.get(),
                count,
                max: capacity,
            }),
            None => Ok(()),
        }
    }

    pub fn count_in_workspace(&self, workspace: WorkspaceId) -> usize {
        self.in_workspace(workspace).count()
    }

    pub fn find_fullscreen_in_workspace(&self, workspace: WorkspaceId) -> Option<&Client> {
        self.in_workspace(workspace).find(|c| c.fullscreen)
    }

    /// Exchange the order positions of two clients
    pub fn swap_order(&mut self, a: Window, b: Window) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(i), Some(j)) if i != j => {
                self.clients.swap(i, j);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, window: Window) -> Option<&Client> {
        self.clients.iter().find(|c| c.window == window)
    }

    pub fn get_mut(&mut self, window: Window) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.window == window)
    }

    pub fn contains(&self, window: Window) -> bool {
        self.position(window).is_some()
    }

    pub fn position(&self, window: Window) -> Option<usize> {
        self.clients.iter().position(|c| c.window == window)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub fn in_workspace(&self, workspace: WorkspaceId) -> impl Iterator<Item = &Client> {
        self.clients.iter().filter(move |c| c.workspace == workspace)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Next client after `window` in registry order on the same workspace
    pub fn next_of(&self, window: Window) -> Option<Window> {
        let index = self.position(window)?;
        let workspace = self.clients[index].workspace;
        self.clients[index + 1..]
            .iter()
            .find(|c| c.workspace == workspace)
            .map(|c| c.window)
    }

    /// Previous client before `window` in registry order on the same workspace
    pub fn prev_of(&self, window: Window) -> Option<Window> {
        let index = self.position(window)?;
        let workspace = self.clients[index].workspace;
        self.clients[..index]
            .iter()
            .rev()
            .find(|c| c.workspace == workspace)
            .map(|c| c.window)
    }

    pub fn selected(&self) -> Option<Window> {
        self.selection
    }

    pub fn selected_client(&self) -> Option<&Client> {
        self.selection.and_then(|w| self.get(w))
    }

    /// Select a registered client. Unknown handles clear the selection.
    pub fn set_selection(&mut self, window: Window) {
        self.selection = self.contains(window).then_some(window);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Drain every client, leaving the registry empty
    pub fn drain(&mut self) -> Vec<Client> {
        self.selection = None;
        std::mem::take(&mut self.clients)
    }
}
