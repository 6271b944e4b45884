//! Seed and key protection of the CAL_PAG, DAQ and PGM resources
//!
//! A protected resource starts out [LockState::Locked]. The master asks for a seed
//! with GET_SEED, computes the key with [compute_key] and its copy of the shared
//! secret, then sends it back with UNLOCK. Resources which are not protected (or all
//! of them, when security is disabled) report [LockState::Unlocked] at all times.

use bitflags::bitflags;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::{XcpError, XcpResult};

/// Length of a seed issued by the slave
pub const SEED_LENGTH: usize = 4;
/// Length of the key the master has to send back
pub const KEY_LENGTH: usize = 4;

bitflags! {
    /// XCP resource bits, as used by CONNECT, GET_STATUS, GET_SEED and UNLOCK
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ResourceMask: u8 {
        /// Calibration and paging
        const CAL_PAG = 0x01;
        /// Data acquisition
        const DAQ = 0x04;
        /// Data stimulation
        const STIM = 0x08;
        /// Flash programming
        const PGM = 0x10;
    }
}

/// A resource which can be protected by seed and key
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum Resource {
    /// Calibration and paging (DOWNLOAD)
    #[strum(to_string = "CAL_PAG")]
    CalPag,
    /// Data acquisition
    #[strum(to_string = "DAQ")]
    Daq,
    /// Flash programming
    #[strum(to_string = "PGM")]
    Pgm,
}

impl Resource {
    /// Maps a seed mode onto its resource. Mode 0 is CAL_PAG, 1 is DAQ and 3 is PGM
    pub fn from_seed_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::CalPag),
            1 => Some(Self::Daq),
            3 => Some(Self::Pgm),
            _ => None,
        }
    }

    /// Maps a resource mask with exactly one supported bit set onto its resource
    pub fn from_mask(mask: u8) -> Option<Self> {
        [Self::CalPag, Self::Daq, Self::Pgm]
            .into_iter()
            .find(|r| r.mask().bits() == mask)
    }

    /// Bit of this resource in a [ResourceMask]
    pub fn mask(self) -> ResourceMask {
        match self {
            Self::CalPag => ResourceMask::CAL_PAG,
            Self::Daq => ResourceMask::DAQ,
            Self::Pgm => ResourceMask::PGM,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::CalPag => 0,
            Self::Daq => 1,
            Self::Pgm => 2,
        }
    }
}

/// Lock state of a single resource
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockState {
    /// Resource is protected and no seed is outstanding
    Locked,
    /// A seed has been issued and the slave is waiting for the key
    SeedRequested,
    /// Resource can be used
    Unlocked,
}

/// Seed and key configuration
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecurityConfig {
    /// Master switch. When false every resource is unlocked
    pub enabled: bool,
    /// Resources which need an unlock before use
    pub protected: ResourceMask,
    /// Secret shared with the master's key algorithm
    pub secret: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            protected: ResourceMask::CAL_PAG | ResourceMask::DAQ | ResourceMask::PGM,
            secret: 0,
        }
    }
}

/// Computes the key for `seed` using `secret`.
///
/// Seed bytes are folded little endian into a 32bit word, mixed with the secret
/// and returned big endian.
pub fn compute_key(seed: &[u8], secret: u32) -> [u8; KEY_LENGTH] {
    let mut temp = seed
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc ^ ((*b as u32) << ((i % 4) * 8)));
    temp ^= secret;
    temp = temp.rotate_left(13) ^ 0xDEAD_BEEF;
    temp = temp.rotate_left(7) ^ secret;
    temp.to_be_bytes()
}

const RNG_INIT: u32 = 0x2545_F491;

/// Tracks the lock state of every protected resource
#[derive(Debug, Copy, Clone)]
pub struct SecurityGatekeeper {
    config: SecurityConfig,
    states: [LockState; 3],
    seeds: [[u8; SEED_LENGTH]; 3],
    pending: Option<Resource>,
    // Never reset, so seeds stay unique across sessions
    rng: u32,
}

impl SecurityGatekeeper {
    /// Creates a gatekeeper with every protected resource locked
    pub fn new(config: SecurityConfig) -> Self {
        let mut s = Self {
            config,
            states: [LockState::Locked; 3],
            seeds: [[0; SEED_LENGTH]; 3],
            pending: None,
            rng: RNG_INIT,
        };
        s.reset();
        s
    }

    /// Replaces the configuration and relocks
    pub fn init(&mut self, config: SecurityConfig) {
        self.config = config;
        self.reset();
    }

    /// Active configuration
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Relocks every resource which requires security and drops any outstanding seed
    pub fn reset(&mut self) {
        for resource in Resource::iter() {
            self.states[resource.index()] = if self.requires_unlock(resource) {
                LockState::Locked
            } else {
                LockState::Unlocked
            };
        }
        self.seeds = [[0; SEED_LENGTH]; 3];
        self.pending = None;
    }

    fn requires_unlock(&self, resource: Resource) -> bool {
        self.config.enabled && self.config.protected.contains(resource.mask())
    }

    /// Requests a seed by seed mode (0 CAL_PAG, 1 DAQ, 3 PGM).
    ///
    /// ## Returns
    /// The seed, which is empty if the resource is already unlocked.
    /// [XcpError::OutOfRange] for any other mode
    pub fn get_seed(&mut self, mode: u8) -> XcpResult<Vec<u8>> {
        let resource = Resource::from_seed_mode(mode).ok_or(XcpError::OutOfRange)?;
        Ok(self.request_seed(resource))
    }

    /// Requests a seed for `resource`. Returns an empty seed if it is already unlocked
    pub fn request_seed(&mut self, resource: Resource) -> Vec<u8> {
        if self.is_unlocked(resource) {
            log::debug!("{resource} already unlocked, returning empty seed");
            return Vec::new();
        }
        if let Some(previous) = self.pending.filter(|p| *p != resource) {
            log::debug!("Seed for {previous} abandoned");
            self.states[previous.index()] = LockState::Locked;
            self.seeds[previous.index()] = [0; SEED_LENGTH];
        }
        let seed = self.next_seed();
        self.seeds[resource.index()] = seed;
        self.states[resource.index()] = LockState::SeedRequested;
        self.pending = Some(resource);
        log::debug!("Issued seed {seed:02X?} for {resource}");
        seed.to_vec()
    }

    // xorshift32 visits every non zero state once per period, and the secret
    // mask is a bijection, so consecutive seeds never repeat
    fn next_seed(&mut self) -> [u8; SEED_LENGTH] {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        (x ^ self.config.secret).to_be_bytes()
    }

    /// Attempts to unlock the resource of the most recent seed.
    ///
    /// Fails without any state change if no seed is outstanding or the key has the wrong length.
    /// A wrong key leaves the resource waiting for another attempt
    pub fn unlock(&mut self, key: &[u8]) -> bool {
        let Some(resource) = self.pending else {
            log::warn!("UNLOCK without a preceding GET_SEED");
            return false;
        };
        if key.len() != KEY_LENGTH {
            log::warn!("UNLOCK key has length {}, expected {KEY_LENGTH}", key.len());
            return false;
        }
        let expected = compute_key(&self.seeds[resource.index()], self.config.secret);
        if key != expected.as_slice() {
            log::warn!("UNLOCK rejected, wrong key for {resource}");
            return false;
        }
        self.states[resource.index()] = LockState::Unlocked;
        self.pending = None;
        log::debug!("{resource} unlocked");
        true
    }

    /// Resource the outstanding seed was issued for
    pub fn pending(&self) -> Option<Resource> {
        self.pending
    }

    /// True if `resource` can be used
    pub fn is_unlocked(&self, resource: Resource) -> bool {
        self.status(resource) == LockState::Unlocked
    }

    /// Lock state of `resource`
    pub fn status(&self, resource: Resource) -> LockState {
        if self.requires_unlock(resource) {
            self.states[resource.index()]
        } else {
            LockState::Unlocked
        }
    }

    /// Fails with [XcpError::AccessLocked] if `resource` is not unlocked
    pub fn require(&self, resource: Resource) -> XcpResult<()> {
        if self.is_unlocked(resource) {
            Ok(())
        } else {
            log::warn!("Access to {resource} denied, resource is locked");
            Err(XcpError::AccessLocked(resource))
        }
    }

    /// Mask of resources which are currently locked
    pub fn locked_mask(&self) -> ResourceMask {
        Resource::iter()
            .filter(|r| !self.is_unlocked(*r))
            .fold(ResourceMask::empty(), |acc, r| acc | r.mask())
    }
}

impl Default for SecurityGatekeeper {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn locked(protected: ResourceMask, secret: u32) -> SecurityGatekeeper {
        SecurityGatekeeper::new(SecurityConfig {
            enabled: true,
            protected,
            secret,
        })
    }

    fn unlock_with_seed(gk: &mut SecurityGatekeeper, mode: u8) -> bool {
        let seed = gk.get_seed(mode).unwrap();
        let key = compute_key(&seed, gk.config().secret);
        gk.unlock(&key)
    }

    #[test]
    fn disabled_unlocks_everything() {
        let gk = SecurityGatekeeper::default();
        for r in Resource::iter() {
            assert!(gk.is_unlocked(r));
            assert_eq!(gk.status(r), LockState::Unlocked);
        }
        assert!(gk.locked_mask().is_empty());
    }

    #[test]
    fn enabled_starts_locked() {
        let gk = locked(ResourceMask::all(), 0x1234_5678);
        for r in Resource::iter() {
            assert!(!gk.is_unlocked(r));
        }
        assert_eq!(
            gk.locked_mask(),
            ResourceMask::CAL_PAG | ResourceMask::DAQ | ResourceMask::PGM
        );
        assert!(matches!(
            gk.require(Resource::Pgm),
            Err(XcpError::AccessLocked(Resource::Pgm))
        ));
    }

    #[test]
    fn seed_modes() {
        let mut gk = locked(ResourceMask::all(), 0x1234_5678);
        assert_eq!(gk.get_seed(0).unwrap().len(), SEED_LENGTH);
        assert_eq!(gk.get_seed(1).unwrap().len(), SEED_LENGTH);
        assert_eq!(gk.get_seed(3).unwrap().len(), SEED_LENGTH);
        assert!(matches!(gk.get_seed(2), Err(XcpError::OutOfRange)));
        assert!(matches!(gk.get_seed(7), Err(XcpError::OutOfRange)));
    }

    #[test]
    fn status_transitions() {
        let mut gk = locked(ResourceMask::CAL_PAG, 0xDEAD_BEEF);
        assert_eq!(gk.status(Resource::CalPag), LockState::Locked);
        let seed = gk.get_seed(0).unwrap();
        assert_eq!(gk.status(Resource::CalPag), LockState::SeedRequested);
        assert!(gk.unlock(&compute_key(&seed, 0xDEAD_BEEF)));
        assert_eq!(gk.status(Resource::CalPag), LockState::Unlocked);
        assert!(gk.get_seed(0).unwrap().is_empty());
    }

    #[test]
    fn wrong_key_and_length() {
        let mut gk = locked(ResourceMask::CAL_PAG, 0xDEAD_BEEF);
        assert!(!gk.unlock(&[0; KEY_LENGTH]));
        let seed = gk.get_seed(0).unwrap();
        let key = compute_key(&seed, 0xDEAD_BEEF);
        assert!(!gk.unlock(&key[..2]));
        assert_eq!(gk.status(Resource::CalPag), LockState::SeedRequested);
        let wrong = [key[0] ^ 0xFF, key[1], key[2], key[3]];
        assert!(!gk.unlock(&wrong));
        assert!(!gk.is_unlocked(Resource::CalPag));
        // The outstanding seed is still valid
        assert!(gk.unlock(&key));
    }

    #[test]
    fn resources_unlock_independently() {
        let mut gk = locked(ResourceMask::all(), 0xCAFE_BABE);
        assert!(unlock_with_seed(&mut gk, 0));
        assert!(gk.is_unlocked(Resource::CalPag));
        assert!(!gk.is_unlocked(Resource::Daq));
        assert!(!gk.is_unlocked(Resource::Pgm));
        assert!(unlock_with_seed(&mut gk, 1));
        assert!(gk.is_unlocked(Resource::Daq));
        assert!(!gk.is_unlocked(Resource::Pgm));
        assert_eq!(gk.locked_mask(), ResourceMask::PGM);
    }

    #[test]
    fn new_seed_abandons_previous_one() {
        let mut gk = locked(ResourceMask::all(), 0x1234_5678);
        let cal_seed = gk.get_seed(0).unwrap();
        gk.get_seed(3).unwrap();
        assert_eq!(gk.status(Resource::CalPag), LockState::Locked);
        assert_eq!(gk.status(Resource::Pgm), LockState::SeedRequested);
        assert_eq!(gk.pending(), Some(Resource::Pgm));
        assert!(!gk.unlock(&compute_key(&cal_seed, 0x1234_5678)));
        assert!(!gk.is_unlocked(Resource::CalPag));
        assert!(unlock_with_seed(&mut gk, 3));
    }

    #[test]
    fn gatekeeper_is_copied_by_value() {
        let mut gk = locked(ResourceMask::all(), 0x1234_5678);
        let snapshot = gk;
        assert!(unlock_with_seed(&mut gk, 1));
        assert!(gk.is_unlocked(Resource::Daq));
        assert!(!snapshot.is_unlocked(Resource::Daq));
    }

    #[test]
    fn only_protected_resources_lock() {
        let mut gk = locked(ResourceMask::PGM, 0x1234_5678);
        assert!(gk.is_unlocked(Resource::CalPag));
        assert!(gk.is_unlocked(Resource::Daq));
        assert!(!gk.is_unlocked(Resource::Pgm));
        assert!(unlock_with_seed(&mut gk, 3));
        assert!(gk.is_unlocked(Resource::Pgm));
    }

    #[test]
    fn reset_relocks_with_fresh_seed() {
        let mut gk = locked(ResourceMask::all(), 0xDEAD_BEEF);
        let before = gk.get_seed(0).unwrap();
        assert!(gk.unlock(&compute_key(&before, 0xDEAD_BEEF)));
        gk.reset();
        assert!(!gk.is_unlocked(Resource::CalPag));
        assert!(gk.pending().is_none());
        let after = gk.get_seed(0).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn seeds_do_not_repeat() {
        let mut gk = locked(ResourceMask::all(), 0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(gk.get_seed(1).unwrap()));
        }
    }

    #[test]
    fn key_is_deterministic() {
        let seed = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(compute_key(&seed, 0xDEAD_BEEF), compute_key(&seed, 0xDEAD_BEEF));
        assert_ne!(compute_key(&seed, 0xDEAD_BEEF), compute_key(&seed, 0xCAFE_BABE));
        assert_ne!(
            compute_key(&seed, 0xDEAD_BEEF),
            compute_key(&[0x12, 0x34, 0x56, 0x79], 0xDEAD_BEEF)
        );
    }

    #[test]
    fn key_known_value() {
        // seed folds to 0x00000001, ^ 0 = 1, rotl 13 = 0x2000 ^ 0xDEADBEEF = 0xDEAD9EEF,
        // rotl 7 = 0x56CF77EF
        assert_eq!(compute_key(&[1, 0, 0, 0], 0), [0x56, 0xCF, 0x77, 0xEF]);
    }

    #[test]
    fn resource_masks() {
        assert_eq!(Resource::from_mask(0x01), Some(Resource::CalPag));
        assert_eq!(Resource::from_mask(0x04), Some(Resource::Daq));
        assert_eq!(Resource::from_mask(0x10), Some(Resource::Pgm));
        assert_eq!(Resource::from_mask(0x08), None);
        assert_eq!(Resource::from_mask(0x05), None);
        assert_eq!(Resource::from_mask(0x02), None);
        assert_eq!(Resource::Pgm.to_string(), "PGM");
    }
}
