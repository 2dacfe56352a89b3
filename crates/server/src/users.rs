// Registered users
//
// A plain text file, one user name per line. The admin user is always
// registered and is never written to the file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use gridsync_protocol::ADMIN_USER;

#[derive(Debug)]
pub struct UserRegistry {
    path: PathBuf,
    users: FxHashSet<String>,
}

impl UserRegistry {
    /// Read the users file. A missing file means nobody but the admin.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut users = FxHashSet::default();
        users.insert(ADMIN_USER.to_string());

        match fs::read_to_string(&path) {
            Ok(contents) => {
                users.extend(
                    contents
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        log::debug!("Loaded {} users from {}", users.len(), path.display());
        Ok(Self { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_registered(&self, user: &str) -> bool {
        self.users.contains(user)
    }

    /// Add `user` and append it to the file.
    ///
    /// Returns `Ok(false)` if the user was already registered.
    pub fn register(&mut self, user: &str) -> io::Result<bool> {
        if self.is_registered(user) {
            return Ok(false);
        }
        if user.trim().is_empty() || user.contains(['\n', '\r']) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "user names are a single word"));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", user)?;

        self.users.insert(user.to_string());
        log::info!("Registered user {}", user);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_admin_always_registered() {
        let dir = tempdir().unwrap();
        let registry = UserRegistry::load(dir.path().join("users")).unwrap();
        assert!(registry.is_registered(ADMIN_USER));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users");
        fs::write(&path, "alice\n\n  bob \n").unwrap();

        let registry = UserRegistry::load(&path).unwrap();
        assert!(registry.is_registered("alice"));
        assert!(registry.is_registered("bob"));
        assert!(!registry.is_registered(""));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/users");
        let mut registry = UserRegistry::load(&path).unwrap();

        assert!(registry.register("carol").unwrap());
        assert!(!registry.register("carol").unwrap());
        assert!(!registry.register(ADMIN_USER).unwrap());
        assert!(registry.register("dave").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "carol\ndave\n");

        let reloaded = UserRegistry::load(&path).unwrap();
        assert!(reloaded.is_registered("carol"));
        assert!(reloaded.is_registered("dave"));
    }

    #[test]
    fn test_register_rejects_line_breaks() {
        let dir = tempdir().unwrap();
        let mut registry = UserRegistry::load(dir.path().join("users")).unwrap();
        assert!(registry.register("eve\nmallory").is_err());
        assert!(!registry.path().exists());
    }
}
