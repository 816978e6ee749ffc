//! Locating the regional bulletin inside a download.
//!
//! The upstream payload is normally a ZIP of per-region `.txt` bulletins.
//! The regional file is found by its name first (a file-name token equal to
//! the region code, e.g. `VIGI_TFFR_20250101.txt`), then by content.

use std::io::{Cursor, Read};

use tracing::debug;

use super::watcher::WatchError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Larger text entries make the whole archive unreadable.
pub const MAX_ENTRY_BYTES: u64 = 4 * 1024 * 1024;

/// Extract the bulletin text for `region_code` from a raw download.
///
/// A body that is not a ZIP archive is taken to be the bulletin itself.
pub fn extract_region_text(body: &[u8], region_code: &str) -> Result<String, WatchError> {
    if !body.starts_with(ZIP_MAGIC) {
        debug!(bytes = body.len(), "Bulletin payload is plain text");
        return Ok(decode_text(body.to_vec()));
    }

    let entries = read_text_entries(body)?;
    let code = region_code.to_ascii_lowercase();

    if let Some((name, text)) = entries.iter().find(|(name, _)| name_matches(name, &code)) {
        debug!(entry = %name, "Regional bulletin matched by file name");
        return Ok(text.clone());
    }

    if let Some((name, text)) = entries
        .iter()
        .find(|(_, text)| text.to_ascii_lowercase().contains(&code))
    {
        debug!(entry = %name, "Regional bulletin matched by content");
        return Ok(text.clone());
    }

    Err(WatchError::RegionNotFound(region_code.to_string()))
}

/// Read every `.txt` entry of the archive as `(name, text)`.
fn read_text_entries(body: &[u8]) -> Result<Vec<(String, String)>, WatchError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body))
        .map_err(|e| WatchError::Archive(e.to_string()))?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| WatchError::Archive(e.to_string()))?;
        if file.is_dir() || !file.name().to_ascii_lowercase().ends_with(".txt") {
            continue;
        }
        let name = file.name().to_string();
        if file.size() > MAX_ENTRY_BYTES {
            return Err(oversized(&name));
        }
        let mut bytes = Vec::new();
        // The declared size is not trusted; read one byte past the limit to detect a lie.
        file.take(MAX_ENTRY_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| WatchError::Archive(format!("{name}: {e}")))?;
        if bytes.len() as u64 > MAX_ENTRY_BYTES {
            return Err(oversized(&name));
        }
        entries.push((name, decode_text(bytes)));
    }
    Ok(entries)
}

fn oversized(name: &str) -> WatchError {
    WatchError::Archive(format!("{name}: entry exceeds {MAX_ENTRY_BYTES} bytes"))
}

/// Whether one of the file-name tokens equals the (lowercase) region code.
fn name_matches(name: &str, code: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let stem = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    stem.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token.eq_ignore_ascii_case(code))
}

/// UTF-8 with a Latin-1 fallback; bulletins come in either.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => e.into_bytes().iter().map(|&b| char::from(b)).collect(),
    };
    text.strip_prefix('\u{feff}')
        .map(ToString::to_string)
        .unwrap_or(text)
}
