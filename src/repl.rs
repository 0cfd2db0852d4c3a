// Interactive line editor for the prompt, built on crossterm raw mode.
// Supports cursor movement, ^A/^E/^K, and single-line history recall.

use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{stdout, Write};

pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    previous_line: Option<String>,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            previous_line: None,
        }
    }

    /// Collect one line of input. Returns None when the user presses Esc or
    /// the terminal goes away.
    pub fn get_line(&mut self) -> Option<String> {
        self.buffer.clear();
        self.cursor = 0;

        enable_raw_mode().ok()?;
        print!("ok> ");
        stdout().flush().ok()?;

        let result = loop {
            if let Ok(Event::Key(key)) = event::read() {
                match key.code {
                    KeyCode::Char(c)
                        if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
                    {
                        self.buffer.insert(self.cursor, c);
                        self.cursor += 1;
                        print!("{}", c);
                        stdout().flush().ok()?;
                    }
                    KeyCode::Backspace => {
                        if self.cursor > 0 {
                            self.cursor -= 1;
                            self.buffer.remove(self.cursor);
                            print!("\x08 \x08");
                            stdout().flush().ok()?;
                        }
                    }
                    KeyCode::Left => {
                        if self.cursor > 0 {
                            self.cursor -= 1;
                            print!("\x1b[D");
                            stdout().flush().ok()?;
                        }
                    }
                    KeyCode::Right => {
                        if self.cursor < self.buffer.len() {
                            self.cursor += 1;
                            print!("\x1b[C");
                            stdout().flush().ok()?;
                        }
                    }
                    KeyCode::Up => {
                        if let Some(prev) = &self.previous_line {
                            print!("\r\x1b[K");
                            self.buffer = prev.chars().collect();
                            self.cursor = self.buffer.len();
                            print!("ok> {}", prev);
                            stdout().flush().ok()?;
                        }
                    }
                    KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        while self.cursor > 0 {
                            self.cursor -= 1;
                            print!("\x1b[D");
                        }
                        stdout().flush().ok()?;
                    }
                    KeyCode::Char('e') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        while self.cursor < self.buffer.len() {
                            self.cursor += 1;
                            print!("\x1b[C");
                        }
                        stdout().flush().ok()?;
                    }
                    KeyCode::Char('k') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        print!("\x1b[K");
                        self.buffer.truncate(self.cursor);
                        stdout().flush().ok()?;
                    }
                    KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        print!("\r\n");
                        stdout().flush().ok()?;
                        break None;
                    }
                    KeyCode::Enter => {
                        let line: String = self.buffer.iter().collect();
                        self.previous_line = Some(line.clone());
                        print!("\r\n");
                        stdout().flush().ok()?;
                        break Some(line);
                    }
                    KeyCode::Esc => {
                        print!("\r\n");
                        stdout().flush().ok()?;
                        break None;
                    }
                    _ => {}
                }
            }
        };

        disable_raw_mode().ok()?;
        result
    }
}
