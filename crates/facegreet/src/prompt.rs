//! Blocking user interaction: greetings, name requests and cautions.

use std::io::{self, BufRead, Write};
use std::path::Path;

/// How the session talks to the person in front of the camera.
///
/// Every call blocks until the user has acknowledged it.
pub trait Prompter {
    /// A known face was recognized. `known_crop` is the enrollment crop, if kept.
    fn greet(&mut self, name: &str, known_crop: &Path) -> io::Result<()>;

    /// Unknown face. Returns the entered name, or `None` to skip enrollment.
    fn ask_name(&mut self, crop: &Path) -> io::Result<Option<String>>;

    fn caution(&mut self, title: &str, text: &str) -> io::Result<()>;
}

/// Terminal implementation over any reader/writer pair.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Read one line; EOF reads as an empty line.
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn wait_for_enter(&mut self) -> io::Result<()> {
        write!(self.output, "[press Enter to continue] ")?;
        self.output.flush()?;
        self.read_line().map(|_| ())
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn greet(&mut self, name: &str, known_crop: &Path) -> io::Result<()> {
        writeln!(self.output, "== FaceComparison ==")?;
        writeln!(self.output, "These images are similar. I know you! You're {name}")?;
        if known_crop.exists() {
            writeln!(self.output, "(enrolled as {})", known_crop.display())?;
        }
        self.wait_for_enter()
    }

    fn ask_name(&mut self, crop: &Path) -> io::Result<Option<String>> {
        writeln!(self.output, "== FaceDetection ==")?;
        writeln!(self.output, "Face saved to {}", crop.display())?;
        writeln!(self.output, "I don't know you.")?;
        writeln!(self.output, "What's your name?")?;
        write!(self.output, "(to skip just leave blank field) > ")?;
        self.output.flush()?;

        let line = self.read_line()?;
        let name = line.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    fn caution(&mut self, title: &str, text: &str) -> io::Result<()> {
        writeln!(self.output, "== {title} ==")?;
        writeln!(self.output, "{text}")?;
        self.wait_for_enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> TerminalPrompter<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalPrompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn output(p: &TerminalPrompter<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8_lossy(&p.output).into_owned()
    }

    #[test]
    fn test_ask_name_returns_trimmed_name() {
        let mut p = prompter("  Alice \n");
        let name = p.ask_name(Path::new("/tmp/temp.png")).unwrap();
        assert_eq!(name.as_deref(), Some("Alice"));
        assert!(output(&p).contains("What's your name?"));
    }

    #[test]
    fn test_ask_name_blank_skips() {
        let mut p = prompter("\n");
        assert_eq!(p.ask_name(Path::new("x.png")).unwrap(), None);
    }

    #[test]
    fn test_ask_name_eof_skips() {
        let mut p = prompter("");
        assert_eq!(p.ask_name(Path::new("x.png")).unwrap(), None);
    }

    #[test]
    fn test_ask_name_handles_crlf() {
        let mut p = prompter("Bob\r\n");
        assert_eq!(p.ask_name(Path::new("x.png")).unwrap().as_deref(), Some("Bob"));
    }

    #[test]
    fn test_greet_blocks_for_one_line() {
        let mut p = prompter("\nCarol\n");
        p.greet("Dave", Path::new("/nonexistent/Dave_1.png")).unwrap();
        assert!(output(&p).contains("You're Dave"));
        // The next line is still unread.
        assert_eq!(p.ask_name(Path::new("x.png")).unwrap().as_deref(), Some("Carol"));
    }

    #[test]
    fn test_caution_prints_title_and_text() {
        let mut p = prompter("\n");
        p.caution("Caution!", "keep your face centred").unwrap();
        let out = output(&p);
        assert!(out.contains("Caution!"));
        assert!(out.contains("keep your face centred"));
    }
}
