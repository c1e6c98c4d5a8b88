//! Sector authentication state
//!
//! Tracks which sectors have been opened in the current card session.

use std::collections::HashMap;

use super::command::MifareClassicKeyType;

/// Authentication state of one sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorAuth {
    Unauthenticated,
    Authenticated(MifareClassicKeyType),
}

/// Per-sector authentication for the current session
#[derive(Debug)]
pub struct AuthSession {
    sectors: HashMap<u32, MifareClassicKeyType>,
    /// Sector of the last successful authenticate or access
    current_sector: Option<u32>,
    /// Leaving a sector drops its authentication
    reauth_on_sector_switch: bool,
}

impl AuthSession {
    pub fn new(reauth_on_sector_switch: bool) -> Self {
        Self {
            sectors: HashMap::new(),
            current_sector: None,
            reauth_on_sector_switch,
        }
    }

    pub fn state(&self, sector: u32) -> SectorAuth {
        match self.sectors.get(&sector) {
            Some(key_type) => SectorAuth::Authenticated(*key_type),
            None => SectorAuth::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self, sector: u32) -> bool {
        self.sectors.contains_key(&sector)
    }

    /// Record a sector accepted by the card
    pub fn set_authenticated(&mut self, sector: u32, key_type: MifareClassicKeyType) {
        self.switch_to(sector);
        self.sectors.insert(sector, key_type);
    }

    /// Record a sector rejected by the card
    ///
    /// The attempt still counts as a switch to `sector`.
    pub fn set_rejected(&mut self, sector: u32) {
        self.switch_to(sector);
        self.sectors.remove(&sector);
    }

    /// Note an access to `sector` and report whether it is open
    pub fn enter_sector(&mut self, sector: u32) -> bool {
        self.switch_to(sector);
        self.is_authenticated(sector)
    }

    fn switch_to(&mut self, sector: u32) {
        if self.reauth_on_sector_switch {
            if let Some(previous) = self.current_sector {
                if previous != sector {
                    self.sectors.remove(&previous);
                }
            }
        }
        self.current_sector = Some(sector);
    }

    /// Clear everything (channel closed or card removed)
    pub fn clear_all(&mut self) {
        self.sectors.clear();
        self.current_sector = None;
    }

    pub fn reauth_on_sector_switch(&self) -> bool {
        self.reauth_on_sector_switch
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new(false)
    }
}
