//! Single-worker communicator.

use crate::comm::Communicator;
use crate::error::{ObsError, Result};

/// A group of exactly one worker; every collective degenerates to a copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl SerialComm {
    /// Create a new single-worker communicator.
    pub fn new() -> Self {
        SerialComm
    }
}

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, _payload: Vec<u8>) -> Result<()> {
        Err(ObsError::collective(format!(
            "serial communicator has no peer {dest}"
        )))
    }

    fn recv(&self, source: usize) -> Result<Vec<u8>> {
        Err(ObsError::collective(format!(
            "serial communicator has no peer {source}"
        )))
    }
}
