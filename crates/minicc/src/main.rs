use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use minic_compiler::{compile_file, parse, CompileError, Lexer, ParseError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "minicc")]
#[command(about = "Compile a small C subset to x86-64 NASM assembly")]
struct Cli {
    /// Source file to compile
    input: PathBuf,
    /// Where to write the assembly
    #[arg(short, long, default_value = "out.s")]
    output: PathBuf,
    /// Print the token stream before compiling
    #[arg(long)]
    dump_tokens: bool,
    /// Print the type-annotated syntax tree before compiling
    #[arg(long)]
    dump_ast: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn dump(cli: &Cli) -> Result<(), CompileError> {
    let src = fs::read_to_string(&cli.input).map_err(|source| CompileError::Io { path: cli.input.clone(), source })?;
    debug!(input = %cli.input.display(), tokens = cli.dump_tokens, ast = cli.dump_ast, "dumping");
    if cli.dump_tokens {
        for tok in Lexer::new(&src).tokenize().map_err(ParseError::from)? {
            println!("{:>7}  {:?}", tok.pos.to_string(), tok.kind);
        }
    }
    if cli.dump_ast {
        println!("{:#?}", parse(&src)?);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    if cli.dump_tokens || cli.dump_ast {
        dump(cli)?;
    }
    compile_file(&cli.input, &cli.output)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", cli.input.display());
            ExitCode::FAILURE
        }
    }
}
