use std::{env, fs, path::Path};

use anyhow::{Context, Result, bail};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pl0gen::bytecode::{
    Compiler, ProgramImage,
    disasm::{print_image, print_stats},
};
use pl0gen::lang::{
    node::{ArithOp, Block, Condition, Expr, Ident, ProcDecl, RelOp, Stmt, VarDecl},
    program::Program,
    resolve::resolve_program,
};
use pl0gen::runtime::{VmBc, VmConfig};

fn main() {
    let args: Vec<String> = env::args().collect();

    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let has = |flag: &str| args.iter().any(|a| a == flag);

    if has("--help") || has("-h") {
        print_usage();
        return Ok(());
    }

    init_logging(has("--verbose"));

    let output = flag_value(args, "-o")?;
    let max_steps = flag_value(args, "--max-steps")?
        .map(|v| v.parse::<u64>().with_context(|| format!("invalid --max-steps '{}'", v)))
        .transpose()?;
    let config = VmConfig {
        max_steps,
        ..VmConfig::default()
    };

    if let Some(path) = flag_value(args, "--exec")? {
        let bytes = fs::read(path).with_context(|| format!("failed to read '{}'", path))?;
        let image = ProgramImage::from_bytes(&bytes).with_context(|| format!("'{}' is not a program image", path))?;
        return execute(&image, config);
    }

    if let Some(path) = flag_value(args, "--write-demo")? {
        let bytes = demo_program()?.to_bytes().context("failed to encode demo program")?;
        fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path))?;
        println!("wrote demo program to {}", path);
        return Ok(());
    }

    // first non-flag argument that is not a flag value is the filename
    let filename = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, a)| !a.starts_with('-') && !takes_value(&args[i - 1]))
        .map(|(_, a)| a.as_str());

    let program = match filename {
        Some(filename) => load_program(filename, has("--resolve"))?,
        None if has("--demo") || args.len() == 1 => {
            println!("demo mode");
            demo_program()?
        }
        None => {
            print_usage();
            bail!("no program given");
        }
    };

    let image = Compiler::new()
        .compile_program(&program)
        .context("compilation failed")?;

    if has("--listing") {
        print_image(&image);
    }
    if has("--stats") {
        print_stats(&image);
    }

    if let Some(path) = output {
        fs::write(path, image.to_bytes()).with_context(|| format!("failed to write '{}'", path))?;
        debug!(path, "image written");
    }

    if has("--run") || filename.is_none() {
        execute(&image, config)?;
    }

    Ok(())
}

fn takes_value(flag: &str) -> bool {
    matches!(flag, "-o" | "--max-steps" | "--exec" | "--write-demo")
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => match args.get(i + 1) {
            Some(value) => Ok(Some(value.as_str())),
            None => bail!("{} needs a value", flag),
        },
        None => Ok(None),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "pl0gen=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_program(filename: &str, resolve: bool) -> Result<Program> {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("ast") {
        bail!("expected a .ast file, got {}", filename);
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read '{}'", filename))?;
    let mut program = Program::from_bytes(&bytes).with_context(|| format!("'{}' is not a PL/0 syntax tree", filename))?;

    if resolve {
        resolve_program(&mut program).context("name resolution failed")?;
    }
    Ok(program)
}

fn execute(image: &ProgramImage, config: VmConfig) -> Result<()> {
    let mut vm = VmBc::with_config(config);
    let code = vm.run_stdio(image).context("execution failed")?;
    debug!(code, steps = vm.steps(), "finished");
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn print_usage() {
    println!("PL0GEN - code generator for PL/0 programs");
    println!();
    println!("Usage:");
    println!("  pl0gen                         Compile and run the demo program");
    println!("  pl0gen <file.ast> [options]    Compile a checked syntax tree");
    println!("  pl0gen --exec <file.bof>       Run a program image");
    println!("  pl0gen --write-demo <file.ast> Save the demo program's syntax tree");
    println!();
    println!("Options:");
    println!("  -o <file.bof>      Write the program image");
    println!("  --resolve          Resolve names before compiling");
    println!("  --listing          Print the disassembled image");
    println!("  --stats            Print instruction statistics");
    println!("  --run              Run the compiled image");
    println!("  --max-steps <n>    Stop execution after n instructions");
    println!("  --verbose          Debug logging (RUST_LOG overrides)");
    println!("  --help, -h         Show this help");
}

/// Prints the first ten factorials, computed by a recursive procedure.
fn demo_program() -> Result<Program> {
    let id = |name: &str| Expr::Ident(Ident::unresolved(name));
    let assign = |name: &str, expr: Expr| Stmt::Assign {
        target: Ident::unresolved(name),
        expr,
    };

    let fact = ProcDecl {
        name: Ident::unresolved("fact"),
        params: vec![Ident::unresolved("n")],
        block: Block {
            stmts: vec![Stmt::If {
                cond: Condition::rel(RelOp::Le, id("n"), Expr::number(1)),
                then_stmts: vec![assign("r", Expr::number(1))],
                else_stmts: vec![
                    Stmt::Call {
                        callee: Ident::unresolved("fact"),
                        args: vec![Expr::binary(ArithOp::Sub, id("n"), Expr::number(1))],
                    },
                    assign("r", Expr::binary(ArithOp::Mul, id("r"), id("n"))),
                ],
            }],
            ..Block::default()
        },
    };

    let mut program = Program::new(Block {
        var_decls: vec![VarDecl {
            names: vec![Ident::unresolved("i"), Ident::unresolved("r")],
        }],
        proc_decls: vec![fact],
        stmts: vec![Stmt::While {
            cond: Condition::rel(RelOp::Lt, id("i"), Expr::number(10)),
            body: vec![
                assign("i", Expr::binary(ArithOp::Add, id("i"), Expr::number(1))),
                Stmt::Call {
                    callee: Ident::unresolved("fact"),
                    args: vec![id("i")],
                },
                Stmt::Print { expr: id("r") },
            ],
        }],
        ..Block::default()
    });

    resolve_program(&mut program).context("demo program failed to resolve")?;
    Ok(program)
}
