//! Resource-limiting wrapper around the snippet.
//!
//! The preamble runs inside the child before the snippet and sets CPU and
//! address-space limits through the interpreter's `resource` module. Any
//! failure there is swallowed: without OS support, the external timeout
//! is still enforced.

use std::time::Duration;

use crate::limits::ResourceLimits;

/// Number of lines the preamble adds in front of the snippet.
pub const PREAMBLE_LINES: usize = 13;

/// Wrap `code` in the resource-limiting preamble.
pub fn wrap(code: &str, limits: &ResourceLimits, timeout: Duration) -> String {
    let cpu = limits.cpu_seconds(timeout);
    let mem = limits.memory_bytes;
    format!(
        "try:\n\
         \x20   import resource as _rl\n\
         \x20   try:\n\
         \x20       _rl.setrlimit(_rl.RLIMIT_CPU, ({cpu}, {cpu}))\n\
         \x20   except Exception:\n\
         \x20       pass\n\
         \x20   try:\n\
         \x20       _rl.setrlimit(_rl.RLIMIT_AS, ({mem}, {mem}))\n\
         \x20   except Exception:\n\
         \x20       pass\n\
         \x20   del _rl\n\
         except Exception:\n\
         \x20   pass\n\
         {code}\n"
    )
}

/// Renumber snippet frames in a traceback so line 1 is the snippet's first line.
pub fn adjust_traceback(stderr: &str) -> String {
    const FRAME: &str = "File \"<string>\", line ";

    let mut out = String::with_capacity(stderr.len());
    let mut rest = stderr;
    while let Some(pos) = rest.find(FRAME) {
        let (head, tail) = rest.split_at(pos + FRAME.len());
        out.push_str(head);

        let digits = tail.chars().take_while(char::is_ascii_digit).count();
        match tail[..digits].parse::<usize>() {
            Ok(line) if line > PREAMBLE_LINES => {
                out.push_str(&(line - PREAMBLE_LINES).to_string());
            }
            _ => out.push_str(&tail[..digits]),
        }
        rest = &tail[digits..];
    }
    out.push_str(rest);
    out
}
