use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::types::Task;

/// Read a history file. A missing file is an empty history.
pub fn load_history(path: &Path) -> Result<Vec<Task>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let tasks = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(tasks)
}

/// Write `tasks` to `path`, creating parent directories as needed.
pub fn save_history(path: &Path, tasks: &[Task]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, tasks)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionResult, TaskStatus};

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_history(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn saved_history_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/history.json");

        let mut first = Task::new(1, "go to example.com");
        first.results.push(ActionResult::ok("Navigated to https://example.com"));
        first.complete();
        let mut second = Task::new(2, "click submit button");
        second.fail("Coordination fault: action executor is not running");

        save_history(&path, &[first.clone(), second.clone()]).unwrap();
        let loaded = load_history(&path).unwrap();

        assert_eq!(loaded, vec![first, second]);
        assert_eq!(loaded[1].status, TaskStatus::Failed);
    }

    #[test]
    fn history_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        save_history(&path, &[Task::new(7, "wait 1 second")]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"startTime\""));
        assert!(raw.contains("\"status\": \"processing\""));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();
        assert!(load_history(&path).is_err());
    }
}
