//! The snapshot of the settings a build directory was last generated with.

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{options::BuildSettings, world::World};

/// The snapshot file name inside the build directory.
pub const SETTINGS_FILE_NAME: &str = "crbuild.settings";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access the settings snapshot")]
    Io(#[from] io::Error),

    #[error("failed to encode the settings snapshot")]
    Encode(#[from] postcard::Error),
}

/// File-backed storage of one [`BuildSettings`] snapshot.
///
/// The encoding is not stable across versions of this tool. If the stored
/// data can't be decoded, it is treated as missing, which only causes an
/// extra regeneration.
pub struct SettingsStore<'a> {
    world: &'a dyn World,
    path: PathBuf,
}

impl<'a> SettingsStore<'a> {
    pub fn new(world: &'a dyn World, build_dir: &Path) -> Self {
        Self {
            world,
            path: build_dir.join(SETTINGS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or `None` if it is missing or unreadable.
    pub fn load(&self) -> Option<BuildSettings> {
        if !self.world.exists(&self.path) {
            return None;
        }
        let data = match self.world.read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "can't read settings");
                return None;
            }
        };
        match postcard::from_bytes(&data) {
            Ok(settings) => Some(settings),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "discarding corrupt settings");
                None
            }
        }
    }

    pub fn store(&self, settings: &BuildSettings) -> Result<(), SettingsError> {
        let data = postcard::to_allocvec(settings)?;
        self.world.write(&self.path, &data)?;
        Ok(())
    }

    /// Delete the snapshot. A missing snapshot is not an error.
    pub fn remove(&self) -> io::Result<()> {
        if !self.world.exists(&self.path) {
            return Ok(());
        }
        self.world.remove_file(&self.path)
    }
}
