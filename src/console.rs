//! Console prompts used at startup.

use std::io::{self, BufRead, Write};

/// Print `message`, then read one line from stdin without its line ending.
///
/// End of input yields an `UnexpectedEof` error.
pub fn prompt(message: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(message.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no input on stdin",
        ));
    }
    Ok(strip_line_ending(&line).to_string())
}

/// Remove a trailing `\n` or `\r\n`.
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
