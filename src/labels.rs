use crate::error::LoadError;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::ops::Index;
use std::path::Path;
use tracing::debug;

/// Human-readable class names, index-aligned with the model outputs.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(labels: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(LoadError::EmptyLabels);
        }
        Ok(Self { labels })
    }

    /// Read one label per line.
    ///
    /// Interior lines are kept verbatim (even blank ones) so that line
    /// numbers stay equal to output indices; trailing blank lines are dropped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut labels = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            labels.push(line.trim_end_matches('\r').to_string());
        }
        while labels.last().is_some_and(|l| l.trim().is_empty()) {
            labels.pop();
        }
        Self::new(labels)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let labels = Self::from_reader(File::open(path)?)?;
        debug!(path = %path.display(), count = labels.len(), "Loaded labels");
        Ok(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

impl Index<usize> for LabelSet {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.labels[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_one_label_per_line() {
        let labels = LabelSet::from_reader("background\r\ntench\ngoldfish\n\n\n".as_bytes()).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(&labels[0], "background");
        assert_eq!(labels.get(1), Some("tench"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn test_interior_blank_lines_keep_indices() {
        let labels = LabelSet::from_reader("a\n\nc\n".as_bytes()).unwrap();
        assert_eq!(labels.iter().collect::<Vec<_>>(), vec!["a", "", "c"]);
    }

    #[test]
    fn test_empty_file_is_rejected() {
        let result = LabelSet::from_reader("\n\n".as_bytes());
        assert!(matches!(result, Err(LoadError::EmptyLabels)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cat\ndog\nfish").unwrap();
        let labels = LabelSet::from_file(file.path()).unwrap();
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let result = LabelSet::from_file("/nonexistent/labels.txt");
        assert!(matches!(result, Err(LoadError::Labels(_))));
    }
}
