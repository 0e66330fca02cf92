//! Output path resolution with versioned file names.
//!
//! In `new` mode an existing destination is never overwritten. Instead the
//! file is written as `<root title>_<N>.<ext>`, where the root title is the
//! intended file name without its extension and without any trailing `_<N>`
//! suffix, and `N` fills the lowest gap among the suffixes already present in
//! the directory (`T_1`, `T_3`, `T_4` yields `T_2`). A bare `T.<ext>` with no
//! numbered siblings yields `T_1`. When the existing file only shares the
//! title, the write goes to `T.<ext>` for the requested file type.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;

use crate::{error::EtlError, storage::FileType};

pub const MODE_NEW: &str = "new";

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<title>.+?)_(?P<number>\d+)$").expect("suffix pattern is valid")
    })
}

/// Decides the path a write should actually use.
pub fn resolve(intended: &Path, file_type: FileType, mode: &str) -> Result<PathBuf> {
    let directory = parent_directory(intended);
    if !directory.is_dir() {
        return Err(EtlError::NotADirectory(directory.to_path_buf()).into());
    }
    let entries = list_entries(directory)?;
    let file_name = intended
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if mode != MODE_NEW || !entries.contains(&file_name) {
        return Ok(intended.to_path_buf());
    }

    let title = root_title(&file_name);
    let extension = file_type.extension();
    match next_version_suffix(&entries, &title, extension) {
        Some(number) => {
            let resolved = directory.join(format!("{title}_{number}.{extension}"));
            debug!("'{file_name}' exists; resolved to {resolved:?}");
            Ok(resolved)
        }
        None => {
            let resolved = directory.join(format!("{title}.{extension}"));
            debug!("'{file_name}' exists under another extension; resolved to {resolved:?}");
            Ok(resolved)
        }
    }
}

fn parent_directory(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn list_entries(directory: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(directory).with_context(|| format!("Listing directory {directory:?}"))?
    {
        let entry = entry.with_context(|| format!("Listing directory {directory:?}"))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// `report_3.csv` → `report`; `report.xlsx` → `report`.
pub fn root_title(file_name: &str) -> String {
    let (stem, _) = split_name(file_name);
    split_suffix(stem).0.to_string()
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
        _ => (file_name, None),
    }
}

fn split_suffix(stem: &str) -> (&str, Option<u64>) {
    if let Some(captures) = suffix_pattern().captures(stem) {
        let number = captures["number"].parse::<u64>().ok();
        if let (Some(title), Some(number)) = (captures.name("title"), number) {
            return (title.as_str(), Some(number));
        }
    }
    (stem, None)
}

/// Picks the suffix for `title` among `entries` with the given extension.
///
/// `None` means no file with this root title exists at all.
pub fn next_version_suffix(entries: &[String], title: &str, extension: &str) -> Option<u64> {
    let mut numbers = BTreeSet::new();
    let mut matches = 0usize;
    for entry in entries {
        let (stem, entry_extension) = split_name(entry);
        if entry_extension != Some(extension) {
            continue;
        }
        let (entry_title, number) = split_suffix(stem);
        if entry_title != title {
            continue;
        }
        matches += 1;
        if let Some(number) = number {
            numbers.insert(number);
        }
    }
    if !numbers.is_empty() {
        first_missing_number(&numbers)
    } else if matches > 0 {
        Some(1)
    } else {
        None
    }
}

/// Smallest number above the minimum of `numbers` that is not in the set,
/// or one past the maximum when the run is contiguous.
pub fn first_missing_number(numbers: &BTreeSet<u64>) -> Option<u64> {
    let mut expected = *numbers.first()?;
    for &number in numbers {
        if number != expected {
            return Some(expected);
        }
        expected = number.saturating_add(1);
    }
    Some(expected)
}
