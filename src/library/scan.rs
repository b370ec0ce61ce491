use std::path::Path;

use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::LibrarySettings;
use crate::error::{Error, Result};

use super::model::{TrackEntry, default_title};

fn is_audio_file(path: &Path, settings: &LibrarySettings) -> bool {
    let exts: Vec<String> = settings
        .extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| e == &ext)
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn tag_text(tag: &lofty::tag::Tag, key: ItemKey) -> Option<String> {
    tag.get_string(&key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read title, artist, genre, BPM, initial key and duration from the file's tags.
///
/// Unreadable or untagged files still produce an entry titled after the file stem.
fn read_entry(path: &Path) -> TrackEntry {
    let mut entry = TrackEntry {
        path: path.to_path_buf(),
        title: Some(default_title(path)),
        ..TrackEntry::default()
    };

    let tagged = match lofty::read_from_path(path) {
        Ok(t) => t,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no readable tags");
            return entry;
        }
    };

    entry.duration_secs = Some(tagged.properties().duration().as_secs_f64());

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        if let Some(v) = tag_text(tag, ItemKey::TrackTitle) {
            entry.title = Some(v);
        }
        entry.artist = tag_text(tag, ItemKey::TrackArtist);
        entry.genre = tag_text(tag, ItemKey::Genre);
        entry.key = tag_text(tag, ItemKey::InitialKey);
        entry.tempo = tag_text(tag, ItemKey::Bpm)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|t| t.is_finite() && *t > 0.0);
    }

    entry
}

/// Walk `dir` and describe every audio file, ordered the way the remote
/// browser lists them: by "artist - title", case-insensitively.
pub fn scan(dir: &Path, settings: &LibrarySettings) -> Result<Vec<TrackEntry>> {
    // An unreadable root is an I/O failure; unreadable children are skipped.
    std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut walker = WalkDir::new(dir).follow_links(settings.follow_links);
    if let Some(d) = settings.max_depth {
        walker = walker.max_depth(d);
    }

    let mut entries: Vec<(String, TrackEntry)> = Vec::new();
    for dirent in walker
        .into_iter()
        .filter_entry(|e| settings.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(std::result::Result::ok)
    {
        let path = dirent.path();
        if path.is_file()
            && (settings.include_hidden || !is_hidden(path))
            && is_audio_file(path, settings)
        {
            let entry = read_entry(path);
            let sort_key = sort_key(&entry);
            entries.push((sort_key, entry));
        }
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
    debug!(dir = %dir.display(), count = entries.len(), "scanned directory");
    Ok(entries.into_iter().map(|(_, e)| e).collect())
}

fn sort_key(entry: &TrackEntry) -> String {
    let title = entry.title.as_deref().unwrap_or_default();
    match entry.artist.as_deref() {
        Some(a) => format!("{a} - {title}").to_lowercase(),
        None => title.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn is_audio_file_matches_configured_extensions_case_insensitive() {
        let settings = LibrarySettings::default();
        assert!(is_audio_file(Path::new("/tmp/a.mp3"), &settings));
        assert!(is_audio_file(Path::new("/tmp/a.MP3"), &settings));
        assert!(is_audio_file(Path::new("/tmp/a.flac"), &settings));
        assert!(is_audio_file(Path::new("/tmp/a.aiff"), &settings));
        assert!(!is_audio_file(Path::new("/tmp/a.txt"), &settings));
        assert!(!is_audio_file(Path::new("/tmp/a"), &settings));
    }

    #[test]
    fn scan_filters_non_audio_and_sorts_case_insensitive() {
        let dir = tempdir().unwrap();

        fs::write(dir.path().join("b.MP3"), b"not a real mp3").unwrap();
        fs::write(dir.path().join("A.ogg"), b"not a real ogg").unwrap();
        fs::write(dir.path().join("c.txt"), b"ignore me").unwrap();

        let entries = scan(dir.path(), &LibrarySettings::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("A"));
        assert_eq!(entries[1].title.as_deref(), Some("b"));
        // Garbage files carry no tags, so no tempo or key.
        assert!(entries.iter().all(|e| e.tempo.is_none() && e.key.is_none()));
    }

    #[test]
    fn scan_skips_hidden_by_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".hidden.mp3"), b"not real").unwrap();
        fs::write(dir.path().join("visible.mp3"), b"not real").unwrap();

        let entries = scan(dir.path(), &LibrarySettings::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("visible"));

        let settings = LibrarySettings {
            include_hidden: true,
            ..LibrarySettings::default()
        };
        assert_eq!(scan(dir.path(), &settings).unwrap().len(), 2);
    }

    #[test]
    fn scan_respects_max_depth() {
        let dir = tempdir().unwrap();
        let d1 = dir.path().join("d1");
        let d2 = d1.join("d2");
        fs::create_dir_all(&d2).unwrap();
        fs::write(dir.path().join("root.mp3"), b"not real").unwrap();
        fs::write(d1.join("one.mp3"), b"not real").unwrap();
        fs::write(d2.join("two.mp3"), b"not real").unwrap();

        // WalkDir depth counts root as 0, children as 1, grandchildren as 2.
        let settings = LibrarySettings {
            max_depth: Some(2),
            ..LibrarySettings::default()
        };
        let names: Vec<String> = scan(dir.path(), &settings)
            .unwrap()
            .into_iter()
            .filter_map(|e| e.title)
            .collect();
        assert!(names.contains(&"root".to_string()));
        assert!(names.contains(&"one".to_string()));
        assert!(!names.contains(&"two".to_string()));
    }

    #[test]
    fn scan_of_missing_directory_is_io_failure() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan(&missing, &LibrarySettings::default()),
            Err(Error::Io { .. })
        ));
    }
}
