use crate::error::Result;
use crate::repo::{OpenParams, TimelapseRepo};
use crate::repo_fs::FsTimelapseRepo;

pub enum Backend {
    Fs,
}

pub fn open_repo(backend: Backend, p: OpenParams) -> Result<Box<dyn TimelapseRepo>> {
    match backend {
        Backend::Fs => Ok(Box::new(FsTimelapseRepo::new(p)?)),
    }
}
