//! Subprocess helpers shared by the command-line backends
//!
//! Backends are configured with an argv template whose `{name}` placeholders
//! are substituted per call. Input goes in on stdin, output is read from
//! stdout, stderr is only traced.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

/// Substitute `{name}` placeholders in every argument
///
/// Returns the program and its arguments, or `None` for an empty template.
pub(crate) fn expand_argv(template: &[String], vars: &[(&str, &str)]) -> Option<(String, Vec<String>)> {
    let mut argv = template.iter().map(|arg| {
        vars.iter().fold(arg.clone(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
    });
    let program = argv.next()?;
    Some((program, argv.collect()))
}

/// Run a program, feed `input` on stdin and collect stdout
///
/// A non-zero exit status is an error carrying the trimmed stderr. The child
/// is always waited on, also when it exits before reading all of its input.
pub(crate) fn run_with_stdin(program: &str, args: &[String], input: &[u8]) -> Result<Vec<u8>, String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to run {program}: {e}"))?;

    // stdin is fed from its own thread while stdout and stderr drain below,
    // so a child that writes before it finishes reading cannot stall on a full pipe
    let (output, written) = thread::scope(|scope| {
        let writer = child.stdin.take().map(|mut stdin| {
            scope.spawn(move || match stdin.write_all(input) {
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(program, "backend closed stdin early");
                    Ok(())
                }
                other => other,
            })
        });

        let output = child.wait_with_output();
        let written = match writer.map(|handle| handle.join()) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(std::io::Error::new(ErrorKind::Other, "stdin writer panicked")),
            None => Ok(()),
        };
        (output, written)
    });

    let output = output.map_err(|e| format!("{program} execution failed: {e}"))?;

    if !output.stderr.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(program, stderr = %stderr.trim(), "backend stderr");
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{program} exited with code {code}: {}", stderr.trim()));
    }

    written.map_err(|e| format!("failed to write to {program} stdin: {e}"))?;

    Ok(output.stdout)
}
