//! Raw source discovery and archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use super::IngestError;

pub const PROJECT_EXTRACT_PREFIX: &str = "OpenCup_Progetti";
pub const LOCATION_FILE: &str = "OpenCup_Localizzazione.csv";
pub const SUBJECT_FILE: &str = "OpenCup_Soggetti.csv";
pub const MAPPING_FILE: &str = "cup_json.json";
pub const DETAIL_ARCHIVE_PREFIX: &str = "cig_json_";
pub const AWARD_ARCHIVE_PREFIX: &str = "aggiudicazioni_json_";
pub const AWARDEE_ARCHIVE_PREFIX: &str = "aggiudicatari_json_";

/// Where the raw sources live.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    /// Directory holding the OpenCUP CSV extracts.
    pub source_dir: PathBuf,
    /// Directory holding the procurement mapping and archives.
    pub cig_dir: PathBuf,
}

impl SourceLayout {
    /// `cig_dir` defaults to `<source_dir>/cup_json`.
    pub fn new(source_dir: impl Into<PathBuf>, cig_dir: Option<PathBuf>) -> Self {
        let source_dir = source_dir.into();
        let cig_dir = cig_dir.unwrap_or_else(|| source_dir.join("cup_json"));
        Self {
            source_dir,
            cig_dir,
        }
    }

    /// List the sources that are present. Missing directories yield no files.
    pub fn discover(&self) -> Result<Sources, IngestError> {
        Ok(Sources {
            project_extracts: list_matching(&self.source_dir, PROJECT_EXTRACT_PREFIX, ".csv")?,
            locations: existing(self.source_dir.join(LOCATION_FILE)),
            subjects: existing(self.source_dir.join(SUBJECT_FILE)),
            mapping: existing(self.cig_dir.join(MAPPING_FILE)),
            detail_archives: list_matching(&self.cig_dir, DETAIL_ARCHIVE_PREFIX, ".zip")?,
            award_archives: list_matching(&self.cig_dir, AWARD_ARCHIVE_PREFIX, ".zip")?,
            awardee_archives: list_matching(&self.cig_dir, AWARDEE_ARCHIVE_PREFIX, ".zip")?,
        })
    }
}

/// Raw sources found on disk. File lists are sorted by name.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub project_extracts: Vec<PathBuf>,
    pub locations: Option<PathBuf>,
    pub subjects: Option<PathBuf>,
    pub mapping: Option<PathBuf>,
    pub detail_archives: Vec<PathBuf>,
    pub award_archives: Vec<PathBuf>,
    pub awardee_archives: Vec<PathBuf>,
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

fn list_matching(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<PathBuf>, IngestError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && name.ends_with(suffix) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// JSON entries extracted from a set of archives.
///
/// The files live in a temporary directory removed when this value drops,
/// whichever way the caller exits.
pub struct ExtractedArchives {
    _dir: TempDir,
    files: Vec<PathBuf>,
}

impl ExtractedArchives {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Extract every `.json`/`.ndjson` entry of `archives`, in archive order.
pub fn extract_archives(archives: &[PathBuf]) -> Result<ExtractedArchives, IngestError> {
    let dir = tempfile::Builder::new().prefix("opencup_extract_").tempdir()?;
    let mut files = Vec::new();

    for (archive_idx, archive_path) in archives.iter().enumerate() {
        let mut archive = ZipArchive::new(File::open(archive_path)?)?;
        for entry_idx in 0..archive.len() {
            let mut entry = archive.by_index(entry_idx)?;
            let name = entry.name().to_string();
            if entry.is_dir() || name.starts_with("__MACOSX") || !is_json_entry(&name) {
                continue;
            }
            let target = dir
                .path()
                .join(format!("{archive_idx:04}_{entry_idx:04}_{}", sanitize(&name)));
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            files.push(target);
        }
        tracing::debug!(archive = %archive_path.display(), "extracted archive");
    }

    Ok(ExtractedArchives { _dir: dir, files })
}

fn is_json_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".json") || lower.ends_with(".ndjson")
}

/// Last path component with traversal and hidden-file markers removed.
fn sanitize(entry_name: &str) -> String {
    let file_name = entry_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_name)
        .replace("..", "_")
        .trim_start_matches('.')
        .to_string();
    if file_name.is_empty() {
        "entry.json".to_string()
    } else {
        file_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_discover_sorted_and_optional() {
        let dir = tempdir().unwrap();
        let cig = dir.path().join("cup_json");
        fs::create_dir(&cig).unwrap();
        fs::write(dir.path().join("OpenCup_Progetti_2.csv"), "").unwrap();
        fs::write(dir.path().join("OpenCup_Progetti_1.csv"), "").unwrap();
        fs::write(dir.path().join("OpenCup_Localizzazione.csv"), "").unwrap();
        fs::write(cig.join("cig_json_2023_02.zip"), "").unwrap();
        fs::write(cig.join("cig_json_2023_01.zip"), "").unwrap();
        fs::write(cig.join("readme.txt"), "").unwrap();

        let sources = SourceLayout::new(dir.path(), None).discover().unwrap();
        let names: Vec<_> = sources
            .project_extracts
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["OpenCup_Progetti_1.csv", "OpenCup_Progetti_2.csv"]);
        assert!(sources.locations.is_some());
        assert!(sources.subjects.is_none());
        assert!(sources.mapping.is_none());
        assert_eq!(sources.detail_archives.len(), 2);
        assert!(sources.detail_archives[0].ends_with("cig_json_2023_01.zip"));
        assert!(sources.award_archives.is_empty());
    }

    #[test]
    fn test_discover_missing_dirs_is_empty() {
        let dir = tempdir().unwrap();
        let layout = SourceLayout::new(dir.path().join("nope"), None);
        let sources = layout.discover().unwrap();
        assert!(sources.project_extracts.is_empty());
        assert!(sources.awardee_archives.is_empty());
    }

    #[test]
    fn test_extracted_files_removed_on_drop() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("cig_json_2023_01.zip");
        write_zip(
            &archive,
            &[
                ("data/../2023_01.json", "{\"cig\":\"G1\"}\n"),
                ("__MACOSX/._2023_01.json", "junk"),
                ("notes.txt", "skip"),
            ],
        );

        let extracted = extract_archives(&[archive]).unwrap();
        assert_eq!(extracted.files().len(), 1);
        let file = extracted.files()[0].clone();
        assert_eq!(fs::read_to_string(&file).unwrap(), "{\"cig\":\"G1\"}\n");
        drop(extracted);
        assert!(!file.exists());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a/b/c.json"), "c.json");
        assert_eq!(sanitize("..\\evil.json"), "evil.json");
        assert_eq!(sanitize(".hidden.json"), "hidden.json");
        assert_eq!(sanitize("dir/"), "entry.json");
    }
}
