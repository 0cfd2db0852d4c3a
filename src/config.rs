// system configuration and command line processing

use ::clap::{arg, Command};
use f83::ForthRuntime;
use std::fs;

use crate::repl::LineEditor;

pub const VERSION: &str = "0.1.0";

pub struct Config {
    pub source_file: Option<String>,
    pub eval_line: Option<String>,
    pub batch: bool,
    pub run: bool,
}

impl Config {
    pub fn new() -> Config {
        Config {
            source_file: None,
            eval_line: None,
            batch: false,
            run: true,
        }
    }

    /// process_args handles command line argument processing using the clap library
    ///
    pub fn process_args(&mut self) -> &Config {
        let arguments = Command::new("f83")
            .version(VERSION)
            .about("A Forth-83 style interpreter")
            .arg(arg!(-f --file <VALUE> "load a source file before the prompt").required(false))
            .arg(arg!(-e --eval <VALUE> "interpret one line of Forth").required(false))
            .arg(arg!(-b --batch "exit after --file and --eval are processed").required(false))
            .get_matches();

        let file = arguments.get_one::<String>("file");
        if let Some(file) = file {
            self.source_file = Some(file.clone());
        }

        let eval = arguments.get_one::<String>("eval");
        if let Some(eval) = eval {
            self.eval_line = Some(eval.clone());
        }

        let batch = arguments.get_one::<bool>("batch");
        if let Some(batch) = batch {
            self.batch = *batch;
        }
        self
    }

    /// run_forth drives the interpreter: an optional source file, an optional
    /// eval line, then the interactive prompt.
    ///
    pub fn run_forth(&mut self) {
        let mut forth = ForthRuntime::new();
        forth.cold_start();

        if let Some(path) = self.source_file.clone() {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    log::info!("loading {}", path);
                    for line in text.lines() {
                        forth.interpret(line);
                        if forth.should_exit() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    eprintln!("f83: {}: {}", path, e);
                    return;
                }
            }
        }

        if let Some(line) = self.eval_line.clone() {
            forth.interpret(&line);
        }

        if self.batch || forth.should_exit() {
            return;
        }

        let mut editor = LineEditor::new();
        loop {
            match editor.get_line() {
                Some(line) => {
                    forth.interpret(&line);
                    if forth.should_exit() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}
