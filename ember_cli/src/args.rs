//! Hand-rolled command-line argument parser.
//!
//! Deliberately dependency-free for fast startup; the surface is small:
//!
//! ```text
//! ember <script.mb>            run a script
//! ember -e "<source>"          evaluate a source string
//! ember -d <script.mb>         print the compiled unit's disassembly
//! ember -s <name> <script.mb>  run one section of a script
//! ember -V | --version
//! ember -h | --help
//! ```

use std::path::PathBuf;

/// What the CLI should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run a script file.
    Script(PathBuf),
    /// Evaluate a source string: `ember -e "1 + 2"`.
    Eval(String),
    /// Print the disassembly of a compiled script.
    Disassemble(PathBuf),
    /// Run one named section of a script.
    Section {
        /// Section name.
        name: String,
        /// Script path.
        path: PathBuf,
    },
    /// Print version and exit.
    PrintVersion,
    /// Print usage and exit.
    PrintHelp,
}

/// Argument parse failure, reported with usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgsError {
    /// What was wrong.
    pub message: String,
}

/// Usage text.
pub const USAGE: &str = "usage: ember [-e source | -d script | -s name script | script]\n\
    \n\
    -e <source>        evaluate a source string\n\
    -d <script>        print compiled bytecode\n\
    -s <name> <script> run a single section\n\
    -V, --version      print version\n\
    -h, --help         print this help";

/// Parse argv (excluding the program name).
pub fn parse_args(args: &[String]) -> Result<ExecutionMode, ArgsError> {
    let mut iter = args.iter();
    let Some(first) = iter.next() else {
        return Err(ArgsError {
            message: "no script given".to_string(),
        });
    };

    match first.as_str() {
        "-h" | "--help" => Ok(ExecutionMode::PrintHelp),
        "-V" | "--version" => Ok(ExecutionMode::PrintVersion),
        "-e" => {
            let source = iter.next().ok_or_else(|| ArgsError {
                message: "-e requires a source argument".to_string(),
            })?;
            Ok(ExecutionMode::Eval(source.clone()))
        }
        "-d" => {
            let path = iter.next().ok_or_else(|| ArgsError {
                message: "-d requires a script argument".to_string(),
            })?;
            Ok(ExecutionMode::Disassemble(PathBuf::from(path)))
        }
        "-s" => {
            let name = iter.next().ok_or_else(|| ArgsError {
                message: "-s requires a section name".to_string(),
            })?;
            let path = iter.next().ok_or_else(|| ArgsError {
                message: "-s requires a script argument".to_string(),
            })?;
            Ok(ExecutionMode::Section {
                name: name.clone(),
                path: PathBuf::from(path),
            })
        }
        flag if flag.starts_with('-') => Err(ArgsError {
            message: format!("unknown flag `{flag}`"),
        }),
        path => Ok(ExecutionMode::Script(PathBuf::from(path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_script_mode() {
        assert_eq!(
            parse_args(&args(&["solution.mb"])).unwrap(),
            ExecutionMode::Script(PathBuf::from("solution.mb"))
        );
    }

    #[test]
    fn test_eval_mode() {
        assert_eq!(
            parse_args(&args(&["-e", "1 + 2"])).unwrap(),
            ExecutionMode::Eval("1 + 2".to_string())
        );
    }

    #[test]
    fn test_section_mode() {
        assert_eq!(
            parse_args(&args(&["-s", "part_one", "day1.mb"])).unwrap(),
            ExecutionMode::Section {
                name: "part_one".to_string(),
                path: PathBuf::from("day1.mb"),
            }
        );
    }

    #[test]
    fn test_missing_and_unknown_arguments() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["-e"])).is_err());
        assert!(parse_args(&args(&["--nope"])).is_err());
    }
}
