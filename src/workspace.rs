use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{trace, warn};

/// A private directory for one judge invocation, removed on drop.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    token: String,
}

impl Workspace {
    /// Creates `<parent>/arbiter-<token>` with a fresh 128-bit token.
    pub fn create(parent: &Path) -> io::Result<Self> {
        fs::create_dir_all(parent)?;

        loop {
            let token = format!("{:032x}", rand::random::<u128>());
            let root = parent.join(format!("arbiter-{}", token));
            match fs::create_dir(&root) {
                Ok(()) => {
                    trace!(path = %root.display(), "workspace created");
                    return Ok(Self { root, token });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.file(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Reads a file the sandboxed program produced; a missing file reads as empty.
    pub fn read_lossy(&self, name: &str) -> io::Result<String> {
        match fs::read(self.file(name)) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.root) {
            warn!(path = %self.root.display(), %err, "failed to remove workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_on_drop() {
        let parent = std::env::temp_dir().join("arbiter-workspace-test");
        let ws = Workspace::create(&parent).unwrap();
        let root = ws.path().to_path_buf();

        assert_eq!(ws.token().len(), 32);
        assert!(root.file_name().unwrap().to_string_lossy().starts_with("arbiter-"));

        let src = ws.write("solution.py", "print(1)\n").unwrap();
        assert_eq!(fs::read_to_string(src).unwrap(), "print(1)\n");
        assert_eq!(ws.read_lossy("run.stdout").unwrap(), "");

        drop(ws);
        assert!(!root.exists());
    }

    #[test]
    fn distinct_tokens() {
        let parent = std::env::temp_dir().join("arbiter-workspace-test");
        let a = Workspace::create(&parent).unwrap();
        let b = Workspace::create(&parent).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
