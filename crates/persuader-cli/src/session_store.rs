//! On-disk session persistence (spec §6): one JSON file per session under the
//! platform config dir, written after every call that touches a session. Session
//! already round-trips unknown fields (see `persuader_core::session::Session::extra`),
//! so a file written by a newer CLI version stays readable by an older one.

use std::path::PathBuf;

use persuader_core::Session;

pub fn sessions_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("persuader")
        .join("sessions")
}

pub fn persist(session: &Session) -> std::io::Result<()> {
    let dir = sessions_dir();
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{}.json", session.id));
    let serialized = serde_json::to_string_pretty(session).unwrap_or_default();
    std::fs::write(path, serialized)
}
