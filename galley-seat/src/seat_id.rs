use galley_core::{CoreError, CoreResult, SeatId, SeatIdProvider};
use rand::Rng;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

#[derive(Debug, thiserror::Error)]
pub enum SeatIdError {
    #[error("Seat id file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Seat id persisted in a local file, so a restarted session keeps its
/// reservations.
#[derive(Debug, Clone)]
pub struct FileSeatIdProvider {
    seat_id: SeatId,
}

impl FileSeatIdProvider {
    /// Reads the id from `path`, or generates one and writes it there.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, SeatIdError> {
        let path = path.as_ref();
        let io_err = |source: io::Error| SeatIdError::Io {
            path: path.to_path_buf(),
            source,
        };

        match fs::read_to_string(path) {
            Ok(raw) => {
                let seat_id = SeatId::new(raw.trim())?;
                info!(seat = %seat_id, "Loaded seat id");
                Ok(Self { seat_id })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let seat_id = generate_seat_id()?;
                fs::write(path, seat_id.as_str()).map_err(io_err)?;
                info!(seat = %seat_id, path = %path.display(), "Generated new seat id");
                Ok(Self { seat_id })
            }
            Err(e) => Err(io_err(e)),
        }
    }
}

impl SeatIdProvider for FileSeatIdProvider {
    fn current_seat_id(&self) -> SeatId {
        self.seat_id.clone()
    }
}

/// `seat-` followed by nine base36 characters.
pub fn generate_seat_id() -> CoreResult<SeatId> {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    SeatId::new(format!("seat-{}", suffix))
}
