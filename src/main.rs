//! Runner: loads a `.class` file, invokes one `public static` niladic
//! method on it, and prints the result.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use loader::class_file::ClassFile;

use classvm::VM;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the .class file to run
    #[arg(value_name = "CLASS")]
    class_file: PathBuf,

    /// Name of the public static niladic method to invoke
    #[arg(value_name = "METHOD")]
    method: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = File::open(&args.class_file)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    let class = ClassFile::from_bytes(&contents)?;
    let mut vm = VM::new();
    match vm.call_public_static_niladic(&class, &args.method)? {
        Some(value) => println!("{value}"),
        None => println!("void"),
    }
    Ok(())
}
