//! Console implementation of the credential prompts.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{bail, Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use autocheckin_core::auth::{CredentialPrompter, CredentialRecord, CredentialUpdate};

/// What a keypress does to a masked input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    /// Character appended, echo one `*`
    Masked,
    /// Last character removed, erase one `*`
    Erased,
    Submit,
    Cancel,
    Ignore,
}

fn apply_key(buffer: &mut String, key: &KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Cancel,
        KeyCode::Esc => KeyAction::Cancel,
        KeyCode::Backspace => {
            if buffer.pop().is_some() {
                KeyAction::Erased
            } else {
                KeyAction::Ignore
            }
        }
        KeyCode::Char(c) if !c.is_control() => {
            buffer.push(c);
            KeyAction::Masked
        }
        _ => KeyAction::Ignore,
    }
}

/// Leaves raw mode when dropped, even on error.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode().context("Failed to enable raw terminal mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

pub struct ConsolePrompter;

impl ConsolePrompter {
    fn read_line(prompt: &str) -> Result<String> {
        print!("{}", prompt);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read from console")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read a secret, echoing `*` per character.
    fn read_secret(prompt: &str) -> Result<String> {
        if !io::stdin().is_terminal() {
            return Self::read_line(prompt);
        }

        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let mut secret = String::new();
        {
            let _raw = RawModeGuard::enable()?;
            loop {
                let Event::Key(key) = event::read()? else {
                    continue;
                };
                match apply_key(&mut secret, &key) {
                    KeyAction::Masked => write!(stdout, "*")?,
                    KeyAction::Erased => write!(stdout, "\x08 \x08")?,
                    KeyAction::Submit => break,
                    KeyAction::Cancel => {
                        write!(stdout, "\r\n")?;
                        bail!("Input cancelled");
                    }
                    KeyAction::Ignore => continue,
                }
                stdout.flush()?;
            }
        }
        writeln!(stdout)?;
        Ok(secret)
    }
}

impl CredentialPrompter for ConsolePrompter {
    fn prompt_new_credential(&self) -> Result<CredentialRecord> {
        println!("No stored credentials. Add one to continue.");
        let identity = Self::read_line("Enter username: ")?;
        let secret = Self::read_secret("Enter password: ")?;
        Ok(CredentialRecord::new(identity.trim(), secret))
    }

    fn confirm_update(&self, identity: &str, masked_secret: &str) -> Result<bool> {
        println!();
        println!("Login failed for user: {}", identity);
        println!("Stored username: {}", identity);
        println!("Stored password: {}", masked_secret);
        let answer = Self::read_line("Do you want to update credentials? (Y/N): ")?;
        Ok(is_yes(&answer))
    }

    fn prompt_update(&self, current: &CredentialRecord) -> Result<CredentialUpdate> {
        let identity = Self::read_line(&format!(
            "Enter new username (or press Enter to keep '{}'): ",
            current.identity
        ))?;
        let secret = Self::read_secret("Enter new password (leave blank to keep current): ")?;
        Ok(CredentialUpdate {
            identity: Some(identity.trim().to_string()),
            secret: Some(secret),
        })
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_masked_typing_and_backspace() {
        let mut buffer = String::new();
        assert_eq!(apply_key(&mut buffer, &press(KeyCode::Char('a'))), KeyAction::Masked);
        assert_eq!(apply_key(&mut buffer, &press(KeyCode::Char('b'))), KeyAction::Masked);
        assert_eq!(apply_key(&mut buffer, &press(KeyCode::Backspace)), KeyAction::Erased);
        assert_eq!(apply_key(&mut buffer, &press(KeyCode::Char('c'))), KeyAction::Masked);
        assert_eq!(apply_key(&mut buffer, &press(KeyCode::Enter)), KeyAction::Submit);
        assert_eq!(buffer, "ac");
    }

    #[test]
    fn test_backspace_on_empty_buffer_is_ignored() {
        let mut buffer = String::new();
        assert_eq!(apply_key(&mut buffer, &press(KeyCode::Backspace)), KeyAction::Ignore);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_ctrl_c_cancels() {
        let mut buffer = String::from("x");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(apply_key(&mut buffer, &ctrl_c), KeyAction::Cancel);
        assert_eq!(buffer, "x");
    }

    #[test]
    fn test_yes_answers() {
        assert!(is_yes("Y"));
        assert!(is_yes(" yes \n"));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }
}
