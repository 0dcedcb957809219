//! Sources of class bytes.
//!
//! The decompiler never touches the filesystem itself: referenced types are
//! fetched through a [`Loader`]. Loaders must be stateless or internally
//! synchronized to be shared across threads.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cache::LruCache;
use crate::error::{DecompileError, Result};

pub trait Loader {
    /// Whether `internal_name` (e.g. `java/lang/String`) can be loaded.
    fn can_load(&self, internal_name: &str) -> bool;

    /// The raw class file bytes for `internal_name`.
    fn load(&self, internal_name: &str) -> Result<Vec<u8>>;
}

impl<L: Loader + ?Sized> Loader for &L {
    fn can_load(&self, internal_name: &str) -> bool {
        (**self).can_load(internal_name)
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        (**self).load(internal_name)
    }
}

fn not_found(internal_name: &str) -> DecompileError {
    DecompileError::ClassNotFound {
        name: internal_name.to_string(),
    }
}

/// A loader that knows no classes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLoader;

impl Loader for NullLoader {
    fn can_load(&self, _: &str) -> bool {
        false
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        Err(not_found(internal_name))
    }
}

/// Class bytes held in memory, keyed by internal name.
#[derive(Clone, Debug, Default)]
pub struct MapLoader {
    classes: BTreeMap<String, Vec<u8>>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, internal_name: impl Into<String>, bytes: Vec<u8>) {
        self.classes.insert(internal_name.into(), bytes);
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl Loader for MapLoader {
    fn can_load(&self, internal_name: &str) -> bool {
        self.classes.contains_key(internal_name)
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        self.classes
            .get(internal_name)
            .cloned()
            .ok_or_else(|| not_found(internal_name))
    }
}

/// Loads `<root>/<internal name>.class` files from a classpath directory.
#[derive(Clone, Debug)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryLoader { root: root.into() }
    }

    fn path_of(&self, internal_name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in internal_name.split('/') {
            path.push(part);
        }
        path.set_extension("class");
        path
    }
}

impl Loader for DirectoryLoader {
    fn can_load(&self, internal_name: &str) -> bool {
        self.path_of(internal_name).is_file()
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(internal_name);
        if !path.is_file() {
            return Err(not_found(internal_name));
        }
        Ok(std::fs::read(path)?)
    }
}

/// The `.class` entries of a JAR (ZIP) archive, read into memory once.
#[derive(Clone, Debug, Default)]
pub struct JarLoader {
    entries: BTreeMap<String, Vec<u8>>,
}

impl JarLoader {
    /// Read a JAR from any reader.
    pub fn read<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut entries = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let Some(internal_name) = name.strip_suffix(".class") else {
                continue;
            };
            let internal_name = internal_name.to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            entries.insert(internal_name, data);
        }
        log::debug!("jar loaded: {} classes", entries.len());

        Ok(JarLoader { entries })
    }

    /// Read a JAR from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(Cursor::new(bytes))
    }

    /// Read a JAR from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::read(std::io::BufReader::new(file))
    }

    /// Internal names of every class in the archive, sorted.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Loader for JarLoader {
    fn can_load(&self, internal_name: &str) -> bool {
        self.entries.contains_key(internal_name)
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        self.entries
            .get(internal_name)
            .cloned()
            .ok_or_else(|| not_found(internal_name))
    }
}

/// Memoizes another loader's results in a bounded LRU cache.
#[derive(Debug)]
pub struct CachingLoader<L> {
    inner: L,
    cache: Mutex<LruCache<String, Vec<u8>>>,
}

impl<L: Loader> CachingLoader<L> {
    pub fn new(inner: L, capacity: usize) -> Self {
        CachingLoader {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L: Loader> Loader for CachingLoader<L> {
    fn can_load(&self, internal_name: &str) -> bool {
        if let Ok(cache) = self.cache.lock() {
            if cache.contains_key(internal_name) {
                return true;
            }
        }
        self.inner.can_load(internal_name)
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(bytes) = cache.get(internal_name) {
                return Ok(bytes.clone());
            }
        }
        let bytes = self.inner.load(internal_name)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(internal_name.to_string(), bytes.clone());
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_loader() {
        let mut loader = MapLoader::new();
        loader.insert("a/B", vec![1, 2, 3]);
        assert!(loader.can_load("a/B"));
        assert!(!loader.can_load("a/C"));
        assert_eq!(loader.load("a/B").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            loader.load("a/C"),
            Err(DecompileError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn test_directory_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("com/example")).unwrap();
        std::fs::write(dir.path().join("com/example/Foo.class"), [0xCA, 0xFE]).unwrap();
        let loader = DirectoryLoader::new(dir.path());
        assert!(loader.can_load("com/example/Foo"));
        assert_eq!(loader.load("com/example/Foo").unwrap(), vec![0xCA, 0xFE]);
        assert!(!loader.can_load("com/example/Bar"));
    }

    #[test]
    fn test_caching_loader_serves_from_cache() {
        let mut inner = MapLoader::new();
        inner.insert("x/Y", vec![9]);
        let loader = CachingLoader::new(inner, 4);
        assert_eq!(loader.load("x/Y").unwrap(), vec![9]);
        assert_eq!(loader.load("x/Y").unwrap(), vec![9]);
        assert!(loader.load("x/Z").is_err());
    }
}
