use super::FileSystem;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // child names
}

/// In-memory filesystem for pipeline and watcher tests.
///
/// Paths are stored exactly as given; tests use relative paths such as
/// `app/js/main.js` together with a root of `.`.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = normalize(path.as_ref());
        let mut files = self.entries();
        files.insert(path.clone(), MockEntry::File(content.into()));
        link_into_parent(&mut files, &path);
    }

    /// Create an empty directory (and its parents).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = normalize(path.as_ref());
        let mut files = self.entries();
        ensure_dir_entry(&mut files, &path);
    }

    /// Contents of a file as UTF-8, if present. Handy for assertions.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        let files = self.entries();
        match files.get(&normalize(path.as_ref())) {
            Some(MockEntry::File(content)) => String::from_utf8(content.clone()).ok(),
            _ => None,
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let stripped = path.strip_prefix("./").unwrap_or(path);
    if stripped.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        stripped.to_path_buf()
    }
}

fn parent_of(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        Some(PathBuf::from("."))
    } else {
        Some(parent.to_path_buf())
    }
}

fn link_into_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    let Some(parent) = parent_of(path) else {
        return;
    };
    if parent == path {
        return;
    }
    ensure_dir_entry(files, &parent);
    if let (Some(MockEntry::Dir(children)), Some(name)) = (
        files.get_mut(&parent),
        path.file_name().and_then(|n| n.to_str()),
    ) {
        if !children.iter().any(|c| c == name) {
            children.push(name.to_string());
        }
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    link_into_parent(files, path);
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match self.entries().get(&normalize(path)) {
            Some(MockEntry::File(content)) => Ok(content.clone()),
            Some(MockEntry::Dir(_)) => Err(anyhow!("{:?} is a directory", path)),
            None => Err(anyhow!("no such file: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.read(path)?)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.entries().contains_key(&normalize(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.entries().get(&normalize(path)), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.entries().get(&normalize(path)), Some(MockEntry::Dir(_)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        Ok(normalize(path))
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let dir = normalize(dir);
        let Some(MockEntry::Dir(children)) = self.entries().get(&dir).cloned() else {
            return Err(anyhow!("no such directory: {:?}", dir));
        };
        let mut entries: Vec<PathBuf> = children
            .iter()
            .map(|name| {
                if dir == Path::new(".") {
                    PathBuf::from(name)
                } else {
                    dir.join(name)
                }
            })
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let path = normalize(path);
        let mut files = self.entries();
        if !matches!(files.get(&path), Some(MockEntry::Dir(_))) {
            return Err(anyhow!("no such directory: {:?}", path));
        }
        files.retain(|p, _| !p.starts_with(&path));
        if let (Some(parent), Some(name)) = (
            parent_of(&path),
            path.file_name().and_then(|n| n.to_str()).map(str::to_string),
        ) {
            if let Some(MockEntry::Dir(children)) = files.get_mut(&parent) {
                children.retain(|c| *c != name);
            }
        }
        Ok(())
    }
}
