//! Emulator process discovery.
//!
//! Agents can restart at any time; in-memory state is rebuilt by
//! re-discovering emulator processes through the OS. The UUID burned into
//! the qemu command line is authoritative; the pid annotation on the
//! record is observability only, and there is no pidfile.

use std::fs;

pub const EMULATOR: &str = "qemu-system-x86_64";

/// Find the live emulator process carrying `uuid` on its command line.
pub fn find_emulator_pid(uuid: &str) -> std::io::Result<Option<i32>> {
    if uuid.is_empty() {
        return Ok(None);
    }

    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i32>().ok())
        else {
            continue;
        };

        // The process may exit between readdir and read; skip it.
        let Ok(cmdline) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let cmdline = String::from_utf8_lossy(&cmdline);

        let mut args = cmdline.split('\0');
        let Some(argv0) = args.next() else {
            continue;
        };
        if !argv0.contains("qemu") {
            continue;
        }
        if args.any(|arg| arg == uuid) {
            return Ok(Some(pid));
        }
    }

    Ok(None)
}
