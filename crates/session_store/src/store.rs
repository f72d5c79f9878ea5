use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::SessionStoreError;
use crate::paths::{session_dir_name, COUNTER_FILE};

/// One logging run: a numbered directory plus its interaction counter.
///
/// All mutation goes through [`Session::next_slot`](crate::Session::next_slot),
/// which takes `&mut self`, so a session has exactly one writer at a time.
#[derive(Debug)]
pub struct Session {
    pub(crate) number: u32,
    pub(crate) dir: PathBuf,
    pub(crate) interaction_counter: u32,
}

impl Session {
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of interaction slots allocated so far (also the last number issued).
    #[must_use]
    pub fn interaction_count(&self) -> u32 {
        self.interaction_counter
    }
}

pub struct SessionStore;

impl SessionStore {
    /// Allocates the next session number under `base_dir` and creates its directory.
    ///
    /// A missing or unreadable counter file counts as "no previous session".
    pub fn create_new(base_dir: &Path) -> Result<Session, SessionStoreError> {
        let counter_path = base_dir.join(COUNTER_FILE);
        let last = read_last_session(&counter_path);
        fs::create_dir_all(base_dir).map_err(|source| {
            SessionStoreError::io("creating session base directory", base_dir, source)
        })?;

        let (number, dir) = create_fresh_session_dir(base_dir, last.saturating_add(1))?;

        fs::write(&counter_path, number.to_string()).map_err(|source| {
            SessionStoreError::io("writing session counter", &counter_path, source)
        })?;

        info!(session = number, dir = %dir.display(), "session created");
        Ok(Session {
            number,
            dir,
            interaction_counter: 0,
        })
    }

    /// Returns the last session number recorded under `base_dir`, or 0.
    #[must_use]
    pub fn last_session(base_dir: &Path) -> u32 {
        read_last_session(&base_dir.join(COUNTER_FILE))
    }
}

/// Creates the first `session_NNN` at or after `first` that does not exist yet.
///
/// A counter that was reset or corrupted points at directories already in
/// use; those are stepped over rather than reused.
fn create_fresh_session_dir(
    base_dir: &Path,
    first: u32,
) -> Result<(u32, PathBuf), SessionStoreError> {
    let mut number = first;
    loop {
        let dir = base_dir.join(session_dir_name(number));
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((number, dir)),
            Err(error) if error.kind() == ErrorKind::AlreadyExists && number < u32::MAX => {
                debug!(dir = %dir.display(), "session directory already exists; skipping");
                number += 1;
            }
            Err(source) => {
                return Err(SessionStoreError::io(
                    "creating session directory",
                    &dir,
                    source,
                ))
            }
        }
    }
}

fn read_last_session(counter_path: &Path) -> u32 {
    let raw = match fs::read_to_string(counter_path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return 0,
        Err(error) => {
            warn!(path = %counter_path.display(), %error, "session counter unreadable; restarting at 0");
            return 0;
        }
    };

    match raw.trim().parse::<u32>() {
        Ok(last) => last,
        Err(error) => {
            warn!(
                path = %counter_path.display(),
                contents = raw.trim(),
                %error,
                "session counter corrupt; restarting at 0"
            );
            0
        }
    }
}
