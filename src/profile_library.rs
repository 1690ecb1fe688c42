use core::fmt;
use heapless::{String, Vec};

use crate::log::*;
use crate::profile::{
    Profile, ProfileError, LEADED_TEXT, LEAD_FREE_TEXT, MAX_ENCODED_SIZE, MAX_NAME_LEN,
};

pub const MAX_PROFILES: usize = 16;
pub const PRESET_SLOTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryError {
    NotFound,
    LibraryFull,
    InvalidSlot,
    EmptySlot,
    Profile(ProfileError),
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryError::NotFound => write!(f, "Profile not found"),
            LibraryError::LibraryFull => write!(f, "Too many profiles"),
            LibraryError::InvalidSlot => write!(f, "Invalid preset slot"),
            LibraryError::EmptySlot => write!(f, "Preset slot is empty"),
            LibraryError::Profile(e) => write!(f, "{}", e),
        }
    }
}

impl LibraryError {
    pub fn to_str(&self) -> &'static str {
        match self {
            LibraryError::NotFound => "Profile not found",
            LibraryError::LibraryFull => "Too many profiles",
            LibraryError::InvalidSlot => "Invalid preset slot",
            LibraryError::EmptySlot => "Preset slot is empty",
            LibraryError::Profile(e) => e.to_str(),
        }
    }
}

#[cfg(feature = "rp2040")]
impl defmt::Format for LibraryError {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.to_str())
    }
}

impl From<ProfileError> for LibraryError {
    fn from(e: ProfileError) -> Self {
        LibraryError::Profile(e)
    }
}

struct StoredProfile {
    name: String<MAX_NAME_LEN>,
    image: Vec<u8, MAX_ENCODED_SIZE>,
}

/// Named profiles kept in their binary form, plus the keypad preset slots.
pub struct ProfileLibrary {
    profiles: Vec<StoredProfile, MAX_PROFILES>,
    presets: [Option<String<MAX_NAME_LEN>>; PRESET_SLOTS],
}

impl ProfileLibrary {
    pub fn new() -> Self {
        Self {
            profiles: Vec::new(),
            presets: Default::default(),
        }
    }

    /// A library holding the built-in profiles, with the first two preset
    /// slots pointing at them.
    pub fn with_builtin() -> Self {
        let mut library = Self::new();
        for (slot, (name, text)) in [("Lead Free", LEAD_FREE_TEXT), ("Leaded", LEADED_TEXT)]
            .into_iter()
            .enumerate()
        {
            match library.import_text(name, text) {
                Ok(()) => {
                    if let Err(e) = library.set_preset(slot, name) {
                        error!("Built-in preset {} rejected: {}", slot, e.to_str());
                    }
                }
                Err(e) => error!("Built-in profile {} rejected: {}", name, e.to_str()),
            }
        }
        library
    }

    /// Convert an authoring text profile into binary form and store it,
    /// replacing any profile with the same name. The text is not kept.
    pub fn import_text(&mut self, name: &str, text: &str) -> Result<(), LibraryError> {
        let profile = Profile::parse_text(name, text)?;
        self.insert(&profile)
    }

    pub fn insert(&mut self, profile: &Profile) -> Result<(), LibraryError> {
        let mut image = [0u8; MAX_ENCODED_SIZE];
        let len = profile.encode(&mut image)?;
        let stored = StoredProfile {
            name: profile.name.clone(),
            image: Vec::from_slice(&image[..len]).map_err(|_| ProfileError::TooManyDatapoints)?,
        };

        match self.position(&profile.name) {
            Some(index) => self.profiles[index] = stored,
            None => self
                .profiles
                .push(stored)
                .map_err(|_| LibraryError::LibraryFull)?,
        }
        info!("Stored profile: {}", profile.name.as_str());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.profiles.get(index).map(|p| p.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.profiles.iter().position(|p| p.name.as_str() == name)
    }

    /// Decode the stored binary image of `name`.
    pub fn load(&self, name: &str) -> Result<Profile, LibraryError> {
        let stored = self
            .profiles
            .iter()
            .find(|p| p.name.as_str() == name)
            .ok_or(LibraryError::NotFound)?;
        Ok(Profile::decode(name, &stored.image)?)
    }

    pub fn set_preset(&mut self, slot: usize, name: &str) -> Result<(), LibraryError> {
        if slot >= PRESET_SLOTS {
            return Err(LibraryError::InvalidSlot);
        }
        let index = self.position(name).ok_or(LibraryError::NotFound)?;
        self.presets[slot] = Some(self.profiles[index].name.clone());
        Ok(())
    }

    pub fn preset(&self, slot: usize) -> Option<&str> {
        self.presets.get(slot)?.as_ref().map(|name| name.as_str())
    }

    pub fn load_preset(&self, slot: usize) -> Result<Profile, LibraryError> {
        if slot >= PRESET_SLOTS {
            return Err(LibraryError::InvalidSlot);
        }
        let name = self.preset(slot).ok_or(LibraryError::EmptySlot)?;
        self.load(name)
    }
}

impl Default for ProfileLibrary {
    fn default() -> Self {
        Self::new()
    }
}
