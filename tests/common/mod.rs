//! Common test utilities and helpers for labmirror tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Whether a usable git binary is on PATH
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Run git in `cwd` and panic with its stderr on failure
pub fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=labmirror", "-c", "user.email=labmirror@example.com"])
        .args(args)
        .current_dir(cwd)
        .env("LC_ALL", "C")
        .output()
        .expect("Failed to execute git");

    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A scratch area holding bare upstream repositories and a mirror root
pub struct Upstreams {
    pub temp_dir: TempDir,
}

impl Upstreams {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("upstream")).expect("Failed to create upstream dir");
        std::fs::create_dir_all(temp_dir.path().join("work")).expect("Failed to create work dir");
        Self { temp_dir }
    }

    pub fn mirror_root(&self) -> PathBuf {
        self.temp_dir.path().join("mirror")
    }

    /// Create a bare repository without commits and return its address
    pub fn empty_repository(&self, name: &str) -> String {
        let bare = self.temp_dir.path().join("upstream").join(format!("{}.git", name));
        git(self.temp_dir.path(), &["init", "--bare", "-q", bare.to_str().unwrap()]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        bare.to_string_lossy().into_owned()
    }

    /// Create a bare repository with one commit on `main` and return its address
    pub fn repository_with_commit(&self, name: &str) -> String {
        let address = self.empty_repository(name);
        let work = self.work_dir(name);
        git(self.temp_dir.path(), &["clone", "-q", &address, work.to_str().unwrap()]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        self.commit(name, "README.md", "initial\n");
        address
    }

    /// Commit a file change in the working clone and push it upstream
    pub fn commit(&self, name: &str, file: &str, content: &str) {
        let work = self.work_dir(name);
        std::fs::write(work.join(file), content).expect("Failed to write file");
        git(&work, &["add", file]);
        git(&work, &["commit", "-q", "-m", &format!("update {}", file)]);
        git(&work, &["push", "-q", "origin", "main"]);
    }

    fn work_dir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("work").join(name)
    }
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
