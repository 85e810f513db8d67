//! Test utilities for the inventory crate.
//!
//! Shared by unit tests (in `src/`) and integration tests (in `tests/`).
//! Compiled for `cfg(test)` and behind the `test-support` feature.

mod assets;
mod catalog;
mod clock;
mod login_attempts;

pub use assets::InMemoryAssetStore;
pub use catalog::InMemoryCatalogRepository;
pub use clock::MutableClock;
pub use login_attempts::InMemoryLoginAttempts;

pub mod cap_fs {
    //! Capability-scoped scratch directories for asset store tests.

    use std::io;
    use std::path::Path;

    use cap_std::{ambient_authority, fs::Dir};
    use tempfile::TempDir;

    /// A temporary directory opened as a `cap_std` [`Dir`].
    ///
    /// The directory is removed when this value drops.
    pub struct ScratchDir {
        temp: TempDir,
        dir: Dir,
    }

    impl ScratchDir {
        /// Create and open a fresh temporary directory.
        ///
        /// # Examples
        ///
        /// ```rust
        /// use inventory::test_support::cap_fs::ScratchDir;
        ///
        /// let scratch = ScratchDir::new()?;
        /// scratch.write("a.png", b"png")?;
        /// assert!(scratch.exists("a.png"));
        /// # Ok::<(), std::io::Error>(())
        /// ```
        pub fn new() -> io::Result<Self> {
            let temp = tempfile::tempdir()?;
            let dir = Dir::open_ambient_dir(temp.path(), ambient_authority())?;
            Ok(Self { temp, dir })
        }

        /// Host path of the directory.
        pub fn path(&self) -> &Path {
            self.temp.path()
        }

        /// A second handle on the same directory.
        pub fn open(&self) -> io::Result<Dir> {
            self.dir.try_clone()
        }

        pub fn write(&self, name: &str, contents: &[u8]) -> io::Result<()> {
            self.dir.write(name, contents)
        }

        pub fn exists(&self, name: &str) -> bool {
            self.dir.exists(name)
        }

        /// Sorted names of the regular files present.
        pub fn file_names(&self) -> io::Result<Vec<String>> {
            let mut names = Vec::new();
            for entry in self.dir.entries()? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
            names.sort();
            Ok(names)
        }
    }
}
