//! JSON metadata exports.
//!
//! Accepts either `{"tracks": [...]}` or a bare array of track objects.
//! Array order is the remote browser's list order.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

use super::model::TrackEntry;

#[derive(Deserialize)]
#[serde(untagged)]
enum ExportDocument {
    Wrapped { tracks: Vec<TrackEntry> },
    Bare(Vec<TrackEntry>),
}

pub fn parse_export(text: &str, source_name: &str) -> Result<Vec<TrackEntry>> {
    // Parse as a generic value first so syntax errors keep serde_json's line/column.
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::parse(source_name, e.to_string()))?;

    let doc: ExportDocument = serde_json::from_value(value).map_err(|e| {
        Error::parse(
            source_name,
            format!("expected a track array or {{\"tracks\": [...]}}: {e}"),
        )
    })?;

    Ok(match doc {
        ExportDocument::Wrapped { tracks } => tracks,
        ExportDocument::Bare(tracks) => tracks,
    })
}

pub fn read_export(path: &Path) -> Result<Vec<TrackEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_export(&text, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_and_bare_documents_with_aliases() {
        let wrapped = r#"{"tracks": [
            {"location": "/m/a.mp3", "name": "A", "bpm": 128, "initial_key": "8A"},
            {"path": "/m/b.mp3", "tempo": 132.5, "key": "Em", "length": 301}
        ]}"#;
        let entries = parse_export(wrapped, "w").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("A"));
        assert_eq!(entries[0].tempo, Some(128.0));
        assert_eq!(entries[1].key.as_deref(), Some("Em"));
        assert_eq!(entries[1].duration_secs, Some(301.0));

        let bare = r#"[{"path": "/m/c.mp3"}]"#;
        assert_eq!(parse_export(bare, "b").unwrap().len(), 1);
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        for text in [
            "{not json",
            r#"{"songs": []}"#,
            r#"[{"title": "no path"}]"#,
            r#"[{"path": "/m/a.mp3", "bpm": "fast"}]"#,
        ] {
            assert!(
                matches!(parse_export(text, "t"), Err(Error::Parse { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn unreadable_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_export(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
