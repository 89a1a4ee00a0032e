use std::fs;
use std::io::Write;

use ry_parser::{parse, Lexer};
use ry_vm::{color, report, Compiler, InterpretResult, Vm};

fn print_usage() {
    eprintln!("ry - the Ry scripting language");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  ry                 Start interactive REPL");
    eprintln!("  ry run <file.ry>   Execute a script file");
    eprintln!("  ry -v, --version   Show version information");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        run_repl();
        return;
    }

    match args[1].as_str() {
        "run" if args.len() == 3 => std::process::exit(run_file(&args[2])),
        "-v" | "--version" => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
}

fn run_file(path: &str) -> i32 {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Could not open file: {path}");
            return 1;
        }
    };
    let mut vm = Vm::new();
    match interpret(&mut vm, &source) {
        InterpretResult::Ok => 0,
        _ => 1,
    }
}

/// Drives a source submission through the whole pipeline. Any stage that
/// reports errors short-circuits the stages after it.
fn interpret(vm: &mut Vm, source: &str) -> InterpretResult {
    let (tokens, lex_errors) = Lexer::new(source).scan_tokens();
    if !lex_errors.is_empty() {
        for error in &lex_errors {
            eprintln!("{}", report(error.line, error.column, &error.message, source));
        }
        return InterpretResult::CompileError;
    }

    let statements = match parse(tokens) {
        Ok(statements) => statements,
        Err(errors) => {
            for error in &errors {
                eprintln!("{}", report(error.line, error.column, &error.message, source));
            }
            return InterpretResult::CompileError;
        }
    };

    let function = match Compiler::new().compile(&statements) {
        Ok(function) => function,
        Err(errors) => {
            for error in &errors {
                eprintln!("{}", report(error.line, error.column, &error.message, source));
            }
            return InterpretResult::CompileError;
        }
    };

    let result = vm.interpret(function, source);
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
    result
}

/// Net brace/paren depth change of one line, ignoring string contents.
fn indent_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for ch in line.chars() {
        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '#' => break,
            '{' | '(' => delta += 1,
            '}' | ')' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn run_repl() {
    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(editor) => editor,
        Err(_) => {
            eprintln!("failed to start line editor");
            return;
        }
    };

    println!("{}Ry (Ry's for You) REPL - Bytecode Edition{}", color::BOLD, color::RESET);

    let mut vm = Vm::new();
    let mut buffer = String::new();
    let mut indent_level: i32 = 0;

    loop {
        let prompt = if buffer.is_empty() {
            format!("{}ry> {}", color::BLUE, color::RESET)
        } else {
            format!("{} ", ".".repeat(indent_level.max(0) as usize * 4))
        };

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(_) => break,
        };

        if line == "quit" {
            break;
        }
        if line == "clear" {
            print!("\x1b[2J\x1b[H");
            let _ = std::io::stdout().flush();
            buffer.clear();
            indent_level = 0;
            continue;
        }
        if line == "!!" {
            buffer.clear();
            indent_level = 0;
            println!("Buffer cleared.");
            continue;
        }
        if line.is_empty() && buffer.is_empty() {
            continue;
        }

        let _ = editor.add_history_entry(&line);
        indent_level += indent_delta(&line);
        buffer.push_str(&line);
        buffer.push('\n');

        if indent_level <= 0 && !buffer.trim().is_empty() {
            interpret(&mut vm, &buffer);
            buffer.clear();
            indent_level = 0;
        } else if indent_level < 0 {
            indent_level = 0;
        }
    }
}
