//! Command allow-list for the local-process backend.
//!
//! This is a coarse default-deny check on the first token of a command line,
//! not a sandbox: an allowed interpreter can still invoke whatever it likes.
//! Container-mode sessions rely on the container for isolation and skip the
//! gate entirely.

use crate::error::{Error, Result};
use std::path::Path;

/// Base executables allowed in local-process mode: language runtimes, package
/// managers, and basic file/VCS utilities.
const ALLOWED: &[&str] = &[
    // runtimes
    "node", "deno", "python", "python3", "ruby", "go", "rustc",
    // package managers / build tools
    "npm", "npx", "yarn", "pnpm", "bun", "pip", "pip3", "uv", "cargo", "bundle",
    // shells
    "sh", "bash", "env",
    // file utilities
    "ls", "cat", "echo", "pwd", "mkdir", "cp", "mv", "rm", "touch", "head",
    "tail", "wc", "grep", "sed", "find", "tar", "unzip",
    // vcs
    "git",
];

/// Pure predicate: does the command line start with an allowed executable?
/// A path prefix on the first token is stripped before matching, so
/// `/usr/bin/node` and `node` are treated the same.
pub fn is_allowed(command: &str) -> bool {
    let Some(first) = command.split_whitespace().next() else {
        return false;
    };
    let base = Path::new(first)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(first);
    ALLOWED.contains(&base)
}

/// Gate check used on the execution path; denial happens before any process
/// is spawned.
pub fn ensure_allowed(command: &str) -> Result<()> {
    if is_allowed(command) {
        Ok(())
    } else {
        let first = command.split_whitespace().next().unwrap_or("").to_string();
        Err(Error::CommandRejected(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_runtimes_and_package_managers() {
        assert!(is_allowed("node index.js"));
        assert!(is_allowed("npm install express"));
        assert!(is_allowed("python3 -m http.server"));
        assert!(is_allowed("cargo build --release"));
        assert!(is_allowed("git status"));
    }

    #[test]
    fn allows_path_prefixed_executables() {
        assert!(is_allowed("/usr/bin/node server.js"));
        assert!(is_allowed("./node_modules/.bin/node x.js"));
        assert!(is_allowed("/bin/sh run.sh"));
    }

    #[test]
    fn rejects_unlisted_executables() {
        assert!(!is_allowed("curl http://example.com"));
        assert!(!is_allowed("nc -l 4444"));
        assert!(!is_allowed("sudo rm -rf /"));
        assert!(!is_allowed("docker run alpine"));
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(!is_allowed(""));
        assert!(!is_allowed("   "));
    }

    #[test]
    fn rejection_is_pure() {
        // Same input, same answer, no state involved.
        for _ in 0..3 {
            assert!(!is_allowed("wget http://example.com"));
            assert!(is_allowed("echo hi"));
        }
    }

    #[test]
    fn ensure_allowed_names_the_offending_token() {
        let err = ensure_allowed("curl -s http://example.com").unwrap_err();
        assert!(err.to_string().contains("curl"));
    }
}
