use anyhow::{bail, Context as _, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::sleep;

use crate::context::Context;

const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn show(ctx: &Context, id: Option<&str>, lines: usize, follow: bool) -> Result<()> {
    let dirs = [ctx.supervisor.supervisor.logs_path(), ctx.boot.boot.logs_path()];

    let Some(id) = id else {
        for dir in &dirs {
            list(dir);
        }
        return Ok(());
    };

    let files = matching_files(&dirs, id);
    if files.is_empty() {
        bail!("No log files found for {}", id);
    }

    for file in &files {
        println!("==> {} <==", file.display());
        let content = tokio::fs::read(file)
            .await
            .with_context(|| format!("Cannot read {}", file.display()))?;
        for line in tail(&String::from_utf8_lossy(&content), lines) {
            println!("{}", line);
        }
    }

    if follow {
        follow_files(&files).await?;
    }
    Ok(())
}

fn list(dir: &Path) {
    println!("{}:", dir.display());
    let mut entries: Vec<(String, u64)> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "log"))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some((entry.file_name().to_string_lossy().into_owned(), size))
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    entries.sort();

    if entries.is_empty() {
        println!("  (no log files)");
    }
    for (name, size) in entries {
        println!("  {:<40} {:>10} bytes", name, size);
    }
}

/// `<id>.log` and `<id>.err` in each directory, in that order.
fn matching_files(dirs: &[PathBuf], id: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for dir in dirs {
        for ext in ["log", "err"] {
            let path = dir.join(format!("{}.{}", id, ext));
            if path.is_file() && !files.contains(&path) {
                files.push(path);
            }
        }
    }
    files
}

fn tail(content: &str, lines: usize) -> Vec<&str> {
    let all: Vec<&str> = content.lines().collect();
    all[all.len().saturating_sub(lines)..].to_vec()
}

/// Print bytes appended to `files` until Ctrl+C.
async fn follow_files(files: &[PathBuf]) -> Result<()> {
    let mut offsets = Vec::with_capacity(files.len());
    for file in files {
        offsets.push(tokio::fs::metadata(file).await.map(|m| m.len()).unwrap_or(0));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = sleep(FOLLOW_POLL_INTERVAL) => {}
        }

        for (file, offset) in files.iter().zip(offsets.iter_mut()) {
            let len = match tokio::fs::metadata(file).await {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };
            if len < *offset {
                // Truncated or rotated.
                *offset = 0;
            }
            if len == *offset {
                continue;
            }

            let mut handle = tokio::fs::File::open(file).await?;
            handle.seek(std::io::SeekFrom::Start(*offset)).await?;
            let mut appended = Vec::new();
            handle.read_to_end(&mut appended).await?;
            *offset += appended.len() as u64;
            print!("{}", String::from_utf8_lossy(&appended));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc\n", 2), vec!["b", "c"]);
        assert_eq!(tail("a\nb\n", 10), vec!["a", "b"]);
        assert!(tail("", 5).is_empty());
    }

    #[test]
    fn test_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let components = dir.path().join("logs");
        let managers = dir.path().join("logs_managers");
        std::fs::create_dir_all(&components).unwrap();
        std::fs::create_dir_all(&managers).unwrap();
        std::fs::write(components.join("tempd.log"), "x").unwrap();
        std::fs::write(components.join("tempd.err"), "x").unwrap();
        std::fs::write(components.join("tempd_other.log"), "x").unwrap();
        std::fs::write(managers.join("daemon_manager.log"), "x").unwrap();

        let dirs = [components.clone(), managers.clone()];
        assert_eq!(
            matching_files(&dirs, "tempd"),
            vec![components.join("tempd.log"), components.join("tempd.err")]
        );
        assert_eq!(
            matching_files(&dirs, "daemon_manager"),
            vec![managers.join("daemon_manager.log")]
        );
        assert!(matching_files(&dirs, "nope").is_empty());
    }
}
