use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;

/// Manifest for ffmpeg's concat demuxer.
///
/// The file lives exactly as long as this value; dropping it removes the
/// file whether the run that used it succeeded, failed or was cancelled.
#[derive(Debug)]
pub struct ConcatList {
    file: NamedTempFile,
}

impl ConcatList {
    /// Write one `file '<path>'` line per input, preserving order.
    ///
    /// The demuxer resolves relative entries against the list's own
    /// directory, so inputs are written as absolute paths.
    pub fn write(inputs: &[PathBuf]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("ffdeck-concat-")
            .suffix(".txt")
            .tempfile()?;

        for input in inputs {
            let input = std::path::absolute(input)?;
            writeln!(file, "{}", entry_line(&input))?;
        }
        file.flush()?;

        debug!("Wrote concat list with {} entries to {}", inputs.len(), file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Concat demuxer line for one input. Single quotes are closed, escaped and
/// reopened so the path survives the demuxer's quoting rules.
pub fn entry_line(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_per_input_in_order() {
        let inputs = vec![
            PathBuf::from("/clips/b.mp4"),
            PathBuf::from("/clips/a.mp4"),
            PathBuf::from("/clips/c.mp4"),
        ];
        let list = ConcatList::write(&inputs).unwrap();

        let content = std::fs::read_to_string(list.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file '/clips/b.mp4'",
                "file '/clips/a.mp4'",
                "file '/clips/c.mp4'",
            ]
        );
    }

    #[test]
    fn test_file_removed_on_drop() {
        let list = ConcatList::write(&[PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]).unwrap();
        let path = list.path().to_path_buf();
        assert!(path.exists());

        drop(list);
        assert!(!path.exists());
    }

    #[test]
    fn test_relative_inputs_written_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let list = ConcatList::write(&[PathBuf::from("a.mp4"), PathBuf::from("clips/b.mp4")]).unwrap();

        let content = std::fs::read_to_string(list.path()).unwrap();
        assert_eq!(
            content,
            format!(
                "{}\n{}\n",
                entry_line(&cwd.join("a.mp4")),
                entry_line(&cwd.join("clips").join("b.mp4"))
            )
        );
    }

    #[test]
    fn test_single_quote_is_escaped() {
        assert_eq!(
            entry_line(Path::new("/clips/it's.mp4")),
            r"file '/clips/it'\''s.mp4'"
        );
    }
}
