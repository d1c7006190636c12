//! Durable JSON documents (recording counters, archive catalog).
//!
//! Each document is loaded on first use and rewritten after every mutation
//! through a temp file in the same directory, so a crash leaves either the old
//! or the new document on disk.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Result;

pub mod catalog;
pub mod recordings;

pub struct JsonDoc<T> {
    path: PathBuf,
    cell: Mutex<Option<T>>,
}

impl<T> JsonDoc<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cell: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the loaded document.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let mut cell = self.cell.lock().unwrap_or_else(|p| p.into_inner());
        let doc = match cell.take() {
            Some(doc) => doc,
            None => load(&self.path)?,
        };
        let out = f(&doc);
        *cell = Some(doc);
        Ok(out)
    }

    /// Apply `f` to a copy of the document and persist it. The in-memory
    /// document only changes once the new version is on disk; an `Err` from
    /// `f` leaves both untouched.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let mut cell = self.cell.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = match cell.as_ref() {
            Some(doc) => doc.clone(),
            None => load(&self.path)?,
        };
        let out = f(&mut next)?;
        save(&self.path, &next)?;
        *cell = Some(next);
        Ok(out)
    }
}

fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match File::open(path) {
        Ok(f) => {
            if f.metadata()?.len() == 0 {
                return Ok(T::default());
            }
            Ok(serde_json::from_reader(BufReader::new(f))?)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no document yet, starting empty");
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}

fn save<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut w, doc)?;
        w.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
