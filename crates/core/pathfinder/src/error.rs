use std::path::PathBuf;

/// A fatal startup error: bad configuration, missing or unparseable track file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not read the track file {path:?}: {source}")]
    TrackFileUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse the track file {path:?}: {source}")]
    TrackFileInvalid {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("The track file {path:?} defines no edge")]
    EmptyTrack { path: PathBuf },
}
