//! CLI demonstrating a custom pipeline grafted onto the default one

use anyhow::Context;
use clap::Parser;
use pass_pipeline::eval::evaluate;
use pass_pipeline::ir::{BinOp, FunctionBuilder, FunctionIr, IrError, Literal};
use pass_pipeline::optimization::{IncrementConstants, IrProcessing};
use pass_pipeline::{
    Compilation, Compiler, CompilerOptions, CompilerState, DefaultPassBuilder, Pipeline,
    PipelineError,
};

#[derive(Parser, Debug)]
#[command(
    name = "passc",
    about = "Compile `foo(x) = x + 10 + 20.2` through the pass pipeline and evaluate it"
)]
struct Args {
    /// Value passed as `x` (integer or float)
    #[arg(default_value = "100", value_parser = parse_literal)]
    x: Literal,

    /// Graft `increment_numeric_constants` after `ir_processing`
    #[arg(long, action = clap::ArgAction::SetTrue)]
    custom: bool,

    /// Print the IR before and after compilation
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dump_ir: bool,

    /// Skip re-verifying the IR after mutating passes
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_verify: bool,
}

fn parse_literal(raw: &str) -> Result<Literal, String> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Literal::Int(i));
    }
    raw.parse::<f64>()
        .map(Literal::Float)
        .map_err(|_| format!("`{raw}` is neither an integer nor a float"))
}

fn foo() -> Result<FunctionIr, IrError> {
    let mut b = FunctionBuilder::new("foo", &["x"]);
    let x = b.assign_arg("x", 0)?;
    let a = b.assign_const("a", 10i64)?;
    let bb = b.assign_const("b", 20.2)?;
    let partial = b.binop("$0", BinOp::Add, &x, &a)?;
    let c = b.binop("c", BinOp::Add, &partial, &bb)?;
    b.ret(&c)?;
    b.finish()
}

fn custom_pipelines(state: &CompilerState) -> Result<Vec<Pipeline>, PipelineError> {
    let mut pm = DefaultPassBuilder::define_default_pipeline(state)?;
    pm.add_pass_after(IncrementConstants, IrProcessing::NAME)?;
    pm.finalize();
    Ok(vec![pm])
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let options = CompilerOptions::new()
        .with_verify_each_pass(!args.no_verify)
        .with_dump_ir(args.dump_ir);

    let func = foo().context("building foo")?;
    if args.dump_ir {
        println!("{func}");
    }

    let compilation: Compilation = if args.custom {
        Compiler::with_pipelines(custom_pipelines)
            .with_options(options)
            .compile(func)?
    } else {
        Compiler::new().with_options(options).compile(func)?
    };

    if args.dump_ir {
        println!("{}", compilation.func_ir);
    }
    for diagnostic in &compilation.diagnostics {
        println!("{diagnostic}");
    }
    for record in &compilation.report.passes {
        println!(
            "{:<32} changed={:<5} {:?}",
            record.name, record.changed, record.elapsed
        );
    }
    println!(
        "changed={} total={:?}",
        compilation.changed,
        compilation.report.total_time()
    );

    let result = evaluate(&compilation.func_ir, &[args.x.clone()])?;
    println!("foo({}) = {result}", args.x);

    Ok(())
}
