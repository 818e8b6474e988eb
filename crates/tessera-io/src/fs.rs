// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The filesystem interface consumed by the resource manager.
//!
//! Only two questions are ever asked of the filesystem: does the backing file
//! exist, and when was it last written. Putting them behind [`FileClock`] keeps
//! hot reload testable without depending on the timestamp resolution of the
//! host filesystem.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Answers existence and last-write-time queries for resource paths.
pub trait FileClock: Send + Sync + 'static {
    /// Returns the last write time of `path`, or `None` if it does not exist.
    ///
    /// Any other failure (permissions, I/O) is returned as an error.
    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>>;
}

/// A [`FileClock`] backed by the operating system's file metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileClock;

impl FileClock for OsFileClock {
    fn modified(&self, path: &Path) -> io::Result<Option<SystemTime>> {
        match std::fs::metadata(path) {
            Ok(metadata) => metadata.modified().map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    #[test]
    fn missing_file_has_no_time() {
        let dir = tempfile::tempdir().unwrap();
        let clock = OsFileClock;
        assert!(clock.modified(&dir.path().join("nope.txt")).unwrap().is_none());
    }

    #[test]
    fn reports_the_write_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();

        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();

        assert_eq!(OsFileClock.modified(&path).unwrap(), Some(stamp));
    }
}
