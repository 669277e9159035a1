pub mod token;
pub mod error;
pub mod lexer;
pub mod types;
pub mod symtab;
pub mod ast;
pub mod parser;
pub mod regalloc;
pub mod emit;
pub mod codegen;

use std::fs;
use std::path::Path;

use tracing::info;

pub use token::{Token, TokenKind, Position};
pub use error::{CodegenError, CodegenResult, CompileError, CompileResult, LexError, ParseError, ParseResult};
pub use lexer::{Lexer, TokenStream};
pub use parser::Parser;
pub use ast::Program;
pub use types::Type;
pub use symtab::{Symbol, SymbolId, SymbolTable};
pub use codegen::generate;

/// Parses and type-checks a source string.
pub fn parse(src: &str) -> ParseResult<Program> { Parser::new(src).parse_program() }

/// Compiles a source string to assembly text.
pub fn compile(src: &str) -> CompileResult<String> {
    let program = parse(src)?;
    Ok(generate(&program)?)
}

/// Compiles `input` and writes the assembly to `output`. Nothing is written on failure.
pub fn compile_file(input: &Path, output: &Path) -> CompileResult<()> {
    let src = fs::read_to_string(input).map_err(|source| CompileError::Io { path: input.to_path_buf(), source })?;
    let asm = compile(&src)?;
    fs::write(output, asm).map_err(|source| CompileError::Io { path: output.to_path_buf(), source })?;
    info!(input = %input.display(), output = %output.display(), "wrote assembly");
    Ok(())
}
