//! Tests for the process launcher.

use super::command::{normalize_program, quote_argument, resolve_executable};
use super::*;
use crate::error::WithLockError;
use std::path::PathBuf;

fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn argument_with_space_is_quoted() {
    assert_eq!(quote_argument("hello world"), "\"hello world\"");
}

#[test]
fn argument_with_tab_is_quoted() {
    assert_eq!(quote_argument("a\tb"), "\"a\tb\"");
}

#[test]
fn argument_without_whitespace_is_unchanged() {
    assert_eq!(quote_argument("--verbose"), "--verbose");
    assert_eq!(quote_argument("C:\\path\\file.txt"), "C:\\path\\file.txt");
}

#[test]
fn embedded_quotes_are_not_escaped() {
    // Known limitation: quotes pass through as-is.
    assert_eq!(quote_argument("say \"hi\""), "\"say \"hi\"\"");
    assert_eq!(quote_argument("\"already\""), "\"already\"");
}

#[test]
fn command_line_quotes_each_element() {
    let spec = CommandSpec::new(
        PathBuf::from("/opt/my tools/build"),
        argv(&["--target", "two words", "x"]),
    );
    assert_eq!(
        spec.command_line(),
        "\"/opt/my tools/build\" --target \"two words\" x"
    );
}

#[test]
fn display_matches_command_line() {
    let spec = CommandSpec::new(PathBuf::from("/bin/echo"), argv(&["two words", "one"]));
    assert_eq!(spec.to_string(), "/bin/echo \"two words\" one");
}

#[test]
fn empty_argv_is_a_generic_error() {
    let err = CommandSpec::resolve(&[]).unwrap_err();
    assert!(matches!(err, WithLockError::Generic(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn unknown_program_fails_resolution_with_not_found() {
    let err = resolve_executable("withlockfile-no-such-program-4f2a").unwrap_err();
    assert!(matches!(
        err,
        WithLockError::Os {
            operation: "resolve executable",
            code: 2
        }
    ));
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// First executable `name` on PATH, searched by hand.
    fn search_path(name: &str) -> Option<PathBuf> {
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(name))
            .find(|candidate| {
                candidate
                    .metadata()
                    .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                    .unwrap_or(false)
            })
    }

    fn is_alive(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            // State follows the parenthesised command name; zombies are dead.
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !matches!(rest.trim_start().chars().next(), Some('Z' | 'X')))
                .unwrap_or(false),
            Err(_) if Path::new("/proc/self").exists() => false,
            Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok(),
        }
    }

    fn wait_until_dead(pid: i32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !is_alive(pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::resolve(&argv(&["sh", "-c", script])).unwrap()
    }

    #[test]
    fn normalize_is_a_no_op_without_exe_suffix() {
        assert_eq!(normalize_program("make"), "make");
        assert_eq!(normalize_program("tool.exe"), "tool.exe");
    }

    #[test]
    fn bare_name_resolves_like_path_search() {
        let expected = search_path("sh").expect("sh on PATH");
        assert_eq!(resolve_executable("sh").unwrap(), expected);
    }

    #[test]
    fn explicit_path_resolves_to_itself() {
        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("hello");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let resolved = resolve_executable(script.to_str().unwrap()).unwrap();
        assert_eq!(resolved, script);
        assert!(resolved.is_absolute());
    }

    #[test]
    fn launch_returns_child_exit_status() {
        assert_eq!(launch(&sh("exit 0")).unwrap(), 0);
        assert_eq!(launch(&sh("exit 7")).unwrap(), 7);
        assert_eq!(launch(&sh("exit 255")).unwrap(), 255);
    }

    #[test]
    fn child_killed_by_signal_reports_128_plus_signo() {
        assert_eq!(launch(&sh("kill -TERM $$")).unwrap(), 128 + 15);
    }

    #[test]
    fn child_is_spawned_into_the_group() {
        let group = ContainmentGroup::create().unwrap();
        let spec = CommandSpec::resolve(&argv(&["sleep", "5"])).unwrap();
        let mut child = platform::spawn_suspended(&spec, &group).unwrap();

        let pgid = nix::unistd::getpgid(Some(nix::unistd::Pid::from_raw(child.id() as i32)));
        let attached = group.attach(&child);

        let _ = child.kill();
        let _ = child.wait();
        assert_eq!(pgid.unwrap().as_raw(), group.id());
        assert_ne!(group.id(), nix::unistd::getpgrp().as_raw());
        assert!(attached.is_ok());
    }

    #[test]
    fn arguments_reach_child_intact() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("args");
        let script = format!("for a in \"$@\"; do echo \"[$a]\"; done > '{}'", out.display());
        let spec = CommandSpec::resolve(&argv(&[
            "sh", "-c", &script, "sh", "two words", "plain", "say \"hi\"",
        ]))
        .unwrap();

        assert_eq!(launch(&spec).unwrap(), 0);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "[two words]\n[plain]\n[say \"hi\"]\n"
        );
    }

    #[test]
    fn leftover_descendants_die_with_the_group() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("grandchild.pid");
        let spec = sh(&format!(
            "sleep 300 > /dev/null 2>&1 & echo $! > '{}'",
            pid_file.display()
        ));

        assert_eq!(launch(&spec).unwrap(), 0);

        let grandchild: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(wait_until_dead(grandchild), "grandchild {grandchild} survived");
    }

    #[test]
    fn attach_rejects_child_outside_the_group() {
        let group = ContainmentGroup::create().unwrap();
        let mut outsider = std::process::Command::new("sleep").arg("5").spawn().unwrap();

        let result = group.attach(&outsider);

        let _ = outsider.kill();
        let _ = outsider.wait();
        assert!(matches!(result, Err(WithLockError::Generic(_))));
    }
}
