//! Command-line front end for the UM-32 interpreter.
//!
//! Opens the program or restore file, wires the console streams, validates
//! the backup folder and runs the machine to completion.
//!
//! # Usage
//! ```text
//! um32 --program <file> [OPTIONS]
//! um32 --restore <file> [OPTIONS]
//! ```

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::process;

use um32::machine::vm::Machine;

const USAGE: &str = "\
UM-32 Universal Machine

USAGE:
    {program} --program <file> [OPTIONS]
    {program} --restore <file> [OPTIONS]

OPTIONS:
    -p, --program <file>    Program file to load (big-endian platters)
    -r, --restore <file>    Snapshot file to restore instead of a program
    -o, --output <file>     Tee console output to this file as well as stdout
    -b, --backup <dir>      Folder for periodic snapshots (must exist)
    -h, --help              Print this help message

EXAMPLES:
    # Run a program
    {program} --program codex.um

    # Run with periodic snapshots, then pick up where a crash left off
    {program} --program codex.um --backup ./backups
    {program} --restore ./backups/backup.dat --backup ./backups
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}

/// Writes every byte to both sinks.
struct TeeWriter<A: Write, B: Write>(A, B);

impl<A: Write, B: Write> Write for TeeWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_all(buf)?;
        self.1.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()?;
        self.1.flush()
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut program_file: Option<&str> = None;
    let mut restore_file: Option<&str> = None;
    let mut output_file: Option<&str> = None;
    let mut backup_folder: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            "-p" | "--program" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--program requires an argument");
                    process::exit(1);
                }
                program_file = Some(&args[i]);
                i += 1;
            }
            "-r" | "--restore" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--restore requires an argument");
                    process::exit(1);
                }
                restore_file = Some(&args[i]);
                i += 1;
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--output requires an argument");
                    process::exit(1);
                }
                output_file = Some(&args[i]);
                i += 1;
            }
            "-b" | "--backup" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("--backup requires an argument");
                    process::exit(1);
                }
                backup_folder = Some(&args[i]);
                i += 1;
            }
            other => {
                eprintln!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    if program_file.is_none() == restore_file.is_none() {
        // Exactly one of the two load sources must be given.
        print_usage(&args[0]);
        process::exit(1);
    }

    let backup_folder: Option<PathBuf> = match backup_folder {
        None => None,
        Some(folder) => {
            let metadata = match std::fs::metadata(folder) {
                Ok(metadata) => metadata,
                Err(err) => {
                    eprintln!("error checking backup folder: {}", err);
                    process::exit(2);
                }
            };
            if !metadata.is_dir() {
                eprintln!("backup folder doesn't appear to be a folder: {}", folder);
                process::exit(2);
            }
            match std::fs::canonicalize(folder) {
                Ok(path) => Some(path),
                Err(err) => {
                    eprintln!("error resolving backup folder path: {}", err);
                    process::exit(2);
                }
            }
        }
    };

    let output: Box<dyn Write + Send> = match output_file {
        None => Box::new(io::stdout()),
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(TeeWriter(io::stdout(), file)),
            Err(err) => {
                eprintln!("error opening output file: {}", err);
                process::exit(2);
            }
        },
    };

    let mut machine = Machine::new(io::stdin(), output, io::stderr(), backup_folder);

    if let Some(path) = program_file {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("error opening program file: {}", err);
                process::exit(2);
            }
        };
        if let Err(err) = machine.load_program(BufReader::new(file)) {
            eprintln!("error loading program: {}", err);
            process::exit(3);
        }
    } else if let Some(path) = restore_file {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("error opening restore file: {}", err);
                process::exit(2);
            }
        };
        if let Err(err) = machine.load_from_backup(BufReader::new(file)) {
            eprintln!("error loading from backup: {}", err);
            process::exit(3);
        }
    }

    if let Err(err) = machine.run().wait().await {
        eprintln!("{}", err);
        process::exit(4);
    }
}
