//! ember: batch compiler and VM for a small functional language.

mod args;
mod diagnostics;
mod error;

use args::{ExecutionMode, USAGE, parse_args};
use ember_runtime::Value;
use ember_vm::Machine;
use error::{EXIT_SUCCESS, EXIT_USAGE_ERROR, report};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mode = match parse_args(&argv) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("ember: {}\n{USAGE}", e.message);
            return ExitCode::from(EXIT_USAGE_ERROR);
        }
    };

    match mode {
        ExecutionMode::PrintHelp => {
            println!("{USAGE}");
            ExitCode::from(EXIT_SUCCESS)
        }
        ExecutionMode::PrintVersion => {
            println!("ember {}", ember_core::VERSION);
            ExitCode::from(EXIT_SUCCESS)
        }
        ExecutionMode::Eval(source) => run_source(&source, "<eval>"),
        ExecutionMode::Script(path) => match read_script(&path) {
            Ok(source) => run_source(&source, &path.display().to_string()),
            Err(code) => code,
        },
        ExecutionMode::Disassemble(path) => match read_script(&path) {
            Ok(source) => disassemble_source(&source, &path.display().to_string()),
            Err(code) => code,
        },
        ExecutionMode::Section { name, path } => match read_script(&path) {
            Ok(source) => run_section(&source, &name, &path.display().to_string()),
            Err(code) => code,
        },
    }
}

fn read_script(path: &Path) -> Result<String, ExitCode> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("ember: cannot read {}: {e}", path.display());
        ExitCode::from(EXIT_USAGE_ERROR)
    })
}

fn run_source(source: &str, filename: &str) -> ExitCode {
    let unit = match ember_compiler::compile_source(source) {
        Ok(unit) => unit,
        Err(e) => return report(&e, Some(source), filename),
    };
    match Machine::new(unit).run() {
        Ok(Value::Nil) => ExitCode::from(EXIT_SUCCESS),
        Ok(value) => {
            println!("{value}");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => report(&e, Some(source), filename),
    }
}

fn disassemble_source(source: &str, filename: &str) -> ExitCode {
    match ember_compiler::compile_source(source) {
        Ok(unit) => {
            print!("{}", ember_compiler::bytecode::disassemble(&unit));
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => report(&e, Some(source), filename),
    }
}

fn run_section(source: &str, name: &str, filename: &str) -> ExitCode {
    let unit = match ember_compiler::compile_source(source) {
        Ok(unit) => unit,
        Err(e) => return report(&e, Some(source), filename),
    };
    let mut machine = Machine::new(unit);
    if let Err(e) = machine.run() {
        return report(&e, Some(source), filename);
    }
    match machine.run_section(name) {
        Ok(value) => {
            println!("{value}");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => report(&e, Some(source), filename),
    }
}
