pub mod analyzer;
pub mod codegen;
pub mod context;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod tac;

use analyzer::check_module;
use context::Context;
use error::CompileResult;
use lexer::Scanner;
use parser::Parser;
use tac::lower_module;

/// Run the whole pipeline on one source text and return the generated
/// assembly. The first diagnostic aborts the compilation.
pub fn compile(source: &str) -> CompileResult<String> {
    let mut ctx = Context::new();

    let tokens = Scanner::tokenize(source);
    log::debug!("scanned {} tokens", tokens.len());

    let module = Parser::new(tokens, &mut ctx).parse()?;
    log::debug!(
        "parsed module '{}' with {} subroutine(s)",
        module.name,
        module.subroutines.len()
    );

    check_module(&ctx, &module)?;

    let scopes = lower_module(&mut ctx, &module);
    if log::log_enabled!(log::Level::Trace) {
        for scope in &scopes {
            log::trace!("scope {}:", ctx.symbols.scope(scope.scope).name);
            for instr in &scope.instrs {
                log::trace!("  {}", instr.render(&ctx));
            }
        }
    }

    Ok(codegen::emit(&mut ctx, &module, &scopes))
}
